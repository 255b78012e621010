//! Key directory service: serves `<identity>.key.pub` files over `GET /getkey`.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use keyrelay_keydir::FileKeyDirectory;
use keyrelay_server::{KeyDirectoryServerConfig, keydir_service, telemetry};
use tower_http::trace::TraceLayer;

#[derive(Debug, Parser)]
#[command(version, about = "Identity to public key directory service")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "KEYRELAY_KEYDIR_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the listen address.
    #[arg(long, env = "KEYRELAY_KEYDIR_LISTEN")]
    listen: Option<SocketAddr>,

    /// Overrides the directory holding `<identity>.key.pub` files.
    #[arg(long, env = "KEYRELAY_KEY_DIR")]
    key_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("info")?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => KeyDirectoryServerConfig::load(path)?,
        None => KeyDirectoryServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(key_dir) = args.key_dir {
        config.key_dir = key_dir;
    }

    let directory = Arc::new(FileKeyDirectory::new(config.key_dir.clone()));
    let app = keydir_service::router(directory).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(listen = %config.listen, key_dir = %config.key_dir.display(), "key directory listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await
        .context("key directory server failed")?;

    Ok(())
}
