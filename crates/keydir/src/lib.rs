//! Identity to public key directory for keyrelay.
//!
//! A key directory answers one question: which public key verifies
//! assertions signed by a given identity? This crate provides:
//!
//! - [`Identity`]: a validated principal name, safe to map onto file names and URLs
//! - [`KeyRecord`]: parsed PEM public key material of a known [`KeyAlgorithm`]
//! - [`KeyDirectory`]: the async lookup trait, with [`MemoryKeyDirectory`],
//!   [`FileKeyDirectory`] and [`HttpKeyDirectory`] backends
//! - [`CachedKeyDirectory`]: an optional single-flight TTL cache over any backend
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use keyrelay_keydir::{CachedKeyDirectory, HttpKeyDirectory, Identity, KeyDirectory};
//!
//! # async fn example() -> Result<(), keyrelay_keydir::DirectoryError> {
//! let remote = Arc::new(HttpKeyDirectory::new("http://localhost:5010")?);
//! let directory = CachedKeyDirectory::new(remote, Duration::from_secs(60));
//!
//! let record = directory.lookup(&Identity::parse("server1")?).await?;
//! println!("{} key for {}", record.algorithm(), record.identity());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cached;
pub mod directory;
pub mod error;
pub mod file;
pub mod http;
pub mod identity;
pub mod record;

pub use cached::CachedKeyDirectory;
pub use directory::{KeyDirectory, MemoryKeyDirectory};
pub use error::{DirectoryError, DirectoryResult};
pub use file::FileKeyDirectory;
pub use http::HttpKeyDirectory;
pub use identity::{Identity, MAX_IDENTITY_LEN};
pub use record::{KeyAlgorithm, KeyRecord};
