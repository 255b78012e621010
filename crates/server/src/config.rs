//! TOML configuration for the two services.
//!
//! ```toml
//! # keyrelay-exchange.toml
//! listen = "0.0.0.0:5025"
//! keydir_url = "http://localhost:5010"
//! service_private_key = "service.key"
//! service_public_key = "service.key.pub"
//!
//! [policy]
//! grace_delay = "10s"
//! validity_window = "30s"
//! clock_skew = "0s"
//! assertion_algorithm = "RS256"
//! lookup_timeout = "5s"
//!
//! [key_cache]
//! ttl = "5m"
//! capacity = 10000
//! ```

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use keyrelay_authn::{AuthError, SessionPolicy};
use keyrelay_keydir::cached::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use serde::Deserialize;
use thiserror::Error;

/// Default port of the key directory service.
pub const DEFAULT_KEYDIR_PORT: u16 = 5010;

/// Default port of the exchange service.
pub const DEFAULT_EXCHANGE_PORT: u16 = 5025;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// The session policy violates its constraints.
    #[error("invalid session policy: {0}")]
    Policy(#[source] AuthError),
}

/// Settings of the key directory service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyDirectoryServerConfig {
    /// Address to bind.
    #[serde(default = "default_keydir_listen")]
    pub listen: SocketAddr,

    /// Directory holding `<identity>.key.pub` files.
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
}

impl Default for KeyDirectoryServerConfig {
    fn default() -> Self {
        Self { listen: default_keydir_listen(), key_dir: default_key_dir() }
    }
}

impl KeyDirectoryServerConfig {
    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        parse_file(path)
    }
}

/// Settings of the exchange service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeServerConfig {
    /// Address to bind.
    #[serde(default = "default_exchange_listen")]
    pub listen: SocketAddr,

    /// Base URL of the key directory service.
    #[serde(default = "default_keydir_url")]
    pub keydir_url: String,

    /// PEM private key that signs session tokens.
    #[serde(default = "default_private_key")]
    pub service_private_key: PathBuf,

    /// PEM public key matching `service_private_key`.
    #[serde(default = "default_public_key")]
    pub service_public_key: PathBuf,

    /// Session window and assertion policy.
    #[serde(default)]
    pub policy: SessionPolicy,

    /// Enables the key lookup cache when present.
    #[serde(default)]
    pub key_cache: Option<KeyCacheConfig>,
}

impl Default for ExchangeServerConfig {
    fn default() -> Self {
        Self {
            listen: default_exchange_listen(),
            keydir_url: default_keydir_url(),
            service_private_key: default_private_key(),
            service_public_key: default_public_key(),
            policy: SessionPolicy::default(),
            key_cache: None,
        }
    }
}

impl ExchangeServerConfig {
    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or the
    /// policy is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the embedded session policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Policy`] if the policy constraints do not hold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate().map_err(ConfigError::Policy)
    }
}

/// Key lookup cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyCacheConfig {
    /// How long a fetched key is trusted without asking the directory again.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub ttl: Duration,

    /// Maximum number of cached identities.
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

fn default_keydir_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_KEYDIR_PORT))
}

fn default_exchange_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_EXCHANGE_PORT))
}

fn default_key_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_keydir_url() -> String {
    format!("http://localhost:{DEFAULT_KEYDIR_PORT}")
}

fn default_private_key() -> PathBuf {
    PathBuf::from("service.key")
}

fn default_public_key() -> PathBuf {
    PathBuf::from("service.key.pub")
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_cache_capacity() -> u64 {
    DEFAULT_CACHE_CAPACITY
}
