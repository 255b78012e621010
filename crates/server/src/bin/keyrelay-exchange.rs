//! Exchange service: trades client assertions for session tokens.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use keyrelay_authn::{ServiceKeyPair, SessionValidator, TokenExchanger};
use keyrelay_keydir::{CachedKeyDirectory, HttpKeyDirectory, KeyDirectory};
use keyrelay_server::{ExchangeServerConfig, ExchangeState, exchange_service, telemetry};
use tower_http::trace::TraceLayer;

#[derive(Debug, Parser)]
#[command(version, about = "Assertion to session token exchange service")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "KEYRELAY_EXCHANGE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the listen address.
    #[arg(long, env = "KEYRELAY_EXCHANGE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Overrides the key directory base URL.
    #[arg(long, env = "KEYRELAY_KEYDIR_URL")]
    keydir_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("info")?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExchangeServerConfig::load(path)?,
        None => ExchangeServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(url) = args.keydir_url {
        config.keydir_url = url;
    }

    let keys = Arc::new(
        ServiceKeyPair::load(&config.service_private_key, &config.service_public_key)
            .context("failed to load service key pair")?,
    );

    let remote = HttpKeyDirectory::with_timeout(&config.keydir_url, config.policy.lookup_timeout())
        .context("failed to build key directory client")?;
    let directory: Arc<dyn KeyDirectory> = match config.key_cache {
        Some(cache) => {
            tracing::info!(ttl = ?cache.ttl, capacity = cache.capacity, "key cache enabled");
            Arc::new(CachedKeyDirectory::with_capacity(Arc::new(remote), cache.ttl, cache.capacity))
        },
        None => Arc::new(remote),
    };

    let exchanger = TokenExchanger::builder()
        .directory(directory)
        .keys(Arc::clone(&keys))
        .policy(config.policy.clone())
        .build();
    let validator = SessionValidator::new(keys, &config.policy);

    let metrics = exchanger.metrics().clone();
    let app = exchange_service::router(ExchangeState::new(exchanger, validator))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(
        listen = %config.listen,
        keydir_url = %config.keydir_url,
        grace_delay = ?config.policy.grace_delay(),
        validity_window = ?config.policy.validity_window(),
        "exchange service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await
        .context("exchange server failed")?;

    let snapshot = metrics.snapshot();
    tracing::info!(
        issued = snapshot.issued,
        rejected = snapshot.total_rejected(),
        rejection_rate = snapshot.rejection_rate(),
        avg_lookup_latency_us = snapshot.avg_lookup_latency_us(),
        "exchange service stopped"
    );
    Ok(())
}
