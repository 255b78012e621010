//! # keyrelay authentication
//!
//! Turns a client's self-signed assertion into a short-lived session token
//! signed by the service.
//!
//! This crate provides:
//! - **Assertion verification**: issuer extraction, algorithm pinning, signature
//!   and time checks against a [`KeyRecord`](keyrelay_keydir::KeyRecord)
//! - **Session tokens**: issuance on a delayed window `[t + grace, t + validity]`
//!   and validation against the service key
//! - **Exchange**: the [`TokenExchanger`] pipeline with stage-tagged rejections
//!
//! ## Security
//!
//! - Only asymmetric algorithms (RS256, EdDSA) are accepted
//! - `none` and the HMAC family are rejected before any key lookup
//! - The header algorithm must equal the configured one; it never selects the key
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use keyrelay_authn::{ServiceKeyPair, SessionPolicy, TokenExchanger};
//! use keyrelay_keydir::HttpKeyDirectory;
//!
//! # async fn example(assertion: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = Arc::new(ServiceKeyPair::load("service.key".as_ref(), "service.key.pub".as_ref())?);
//! let exchanger = TokenExchanger::builder()
//!     .directory(Arc::new(HttpKeyDirectory::new("http://localhost:5010")?))
//!     .keys(keys)
//!     .policy(SessionPolicy::default())
//!     .build();
//!
//! let session = exchanger.exchange(assertion).await?;
//! println!("valid from {} until {}", session.not_before, session.expires_at);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Client assertion decoding and verification.
pub mod assertion;
/// Time sources.
pub mod clock;
/// Session policy.
pub mod config;
/// Authentication error types.
pub mod error;
/// The assertion-to-session exchange.
pub mod exchange;
/// The service signing key pair.
pub mod keypair;
/// Exchange outcome counters.
pub mod metrics;
/// Session token issuance and validation.
pub mod session;
/// Test fixtures and helpers.
#[cfg(feature = "testutil")]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Algorithm validation.
pub mod validation;

pub use assertion::{AssertionVerifier, UnverifiedAssertion, VerifiedClaims, decode_unverified};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionPolicy;
pub use error::{AuthError, ErrorKind, Result};
pub use exchange::{ExchangeError, ExchangeStage, TokenExchanger};
pub use keypair::ServiceKeyPair;
pub use metrics::{ExchangeMetrics, ExchangeMetricsSnapshot};
pub use session::{IssuedSession, SessionClaims, SessionIssuer, SessionValidator};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, SigningAlgorithm, validate_algorithm};
