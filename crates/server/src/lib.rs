//! HTTP services of keyrelay.
//!
//! - [`keydir_service`]: `GET /getkey`, serving public keys from a [`KeyDirectory`](keyrelay_keydir::KeyDirectory)
//! - [`exchange_service`]: `POST /login` (assertion in, session token out) and
//!   `POST /` (session-gated payload)
//!
//! The binaries `keyrelay-keydir` and `keyrelay-exchange` wire these routers to
//! their TOML [`config`] and serve them with graceful shutdown.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod exchange_service;
pub mod facts;
pub mod keydir_service;
pub mod telemetry;

pub use config::{ConfigError, ExchangeServerConfig, KeyCacheConfig, KeyDirectoryServerConfig};
pub use error::ApiError;
pub use exchange_service::ExchangeState;
