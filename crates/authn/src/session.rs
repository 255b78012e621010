//! Session tokens: issuance and validation with the service key pair.
//!
//! A session token is a compact JWS with exactly two claims:
//!
//! ```json
//! { "nbf": 1700000010, "exp": 1700000030 }
//! ```
//!
//! It is valid iff the signature verifies with the service public key and
//! `nbf <= now <= exp` (both inclusive, widened by the configured skew).

use std::{collections::HashSet, sync::Arc, time::Duration};

use fail::fail_point;
use jsonwebtoken::{Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, SystemClock, duration_secs},
    config::SessionPolicy,
    error::{AuthError, Result},
    keypair::ServiceKeyPair,
    validation::peek_algorithm,
};

/// The payload of a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionClaims {
    /// Start of validity, seconds since epoch.
    pub nbf: i64,
    /// End of validity, seconds since epoch.
    pub exp: i64,
}

impl SessionClaims {
    /// Returns `true` if `now` lies in `[nbf - skew, exp + skew]`.
    #[must_use]
    pub fn is_valid_at(&self, now: i64, skew_secs: i64) -> bool {
        self.check_window(now, skew_secs).is_ok()
    }

    fn check_window(&self, now: i64, skew_secs: i64) -> Result<()> {
        if now < self.nbf.saturating_sub(skew_secs) {
            return Err(AuthError::token_not_yet_valid());
        }
        if now > self.exp.saturating_add(skew_secs) {
            return Err(AuthError::token_expired());
        }
        Ok(())
    }
}

/// Wire form used for validation, so absent claims surface as `MissingClaim`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PresentedClaims {
    nbf: Option<i64>,
    exp: Option<i64>,
}

/// A freshly signed session token and its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    /// The compact JWS.
    pub token: String,
    /// First second of validity.
    pub not_before: i64,
    /// Last second of validity.
    pub expires_at: i64,
}

/// Signs session tokens.
#[derive(Debug, Clone)]
pub struct SessionIssuer {
    keys: Arc<ServiceKeyPair>,
    grace_delay: Duration,
    validity_window: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    /// Creates an issuer using the policy's window and the system clock.
    #[must_use]
    pub fn new(keys: Arc<ServiceKeyPair>, policy: &SessionPolicy) -> Self {
        Self {
            keys,
            grace_delay: policy.grace_delay(),
            validity_window: policy.validity_window(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issues a token valid on `[now + grace_delay, now + validity_window]`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningFailed`] if the service key cannot sign.
    #[tracing::instrument(skip(self))]
    pub fn issue(&self) -> Result<IssuedSession> {
        let now = self.clock.now();
        let claims = SessionClaims {
            nbf: now.saturating_add(duration_secs(self.grace_delay)),
            exp: now.saturating_add(duration_secs(self.validity_window)),
        };

        fail_point!("session-before-sign", |_| {
            Err(AuthError::signing_failed("injected failure before signing"))
        });

        let header = Header::new(self.keys.algorithm().to_jwt());
        let token = encode(&header, &claims, self.keys.encoding_key())
            .map_err(|e| AuthError::signing_failed(e.to_string()))?;

        Ok(IssuedSession { token, not_before: claims.nbf, expires_at: claims.exp })
    }
}

/// Checks session tokens presented on protected calls.
#[derive(Debug, Clone)]
pub struct SessionValidator {
    keys: Arc<ServiceKeyPair>,
    clock_skew: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionValidator {
    /// Creates a validator using the policy's skew and the system clock.
    #[must_use]
    pub fn new(keys: Arc<ServiceKeyPair>, policy: &SessionPolicy) -> Self {
        Self { keys, clock_skew: policy.clock_skew(), clock: Arc::new(SystemClock) }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates `token` at the clock's current time.
    ///
    /// # Errors
    ///
    /// See [`validate_at`](Self::validate_at).
    pub fn validate(&self, token: &str) -> Result<()> {
        self.validate_at(token, self.clock.now())
    }

    /// Validates `token` as of `now` (seconds since epoch).
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnsupportedAlgorithm`] / [`AuthError::AlgorithmMismatch`] if the
    ///   header does not name the service key's algorithm
    /// - [`AuthError::InvalidSignature`] if the signature does not verify
    /// - [`AuthError::MissingClaim`] if `nbf` or `exp` is absent
    /// - [`AuthError::TokenNotYetValid`] / [`AuthError::TokenExpired`] outside the window
    /// - [`AuthError::InvalidTokenFormat`] for undecodable tokens
    #[tracing::instrument(skip(self, token))]
    pub fn validate_at(&self, token: &str, now: i64) -> Result<()> {
        let alg = peek_algorithm(token)?;
        self.keys.algorithm().ensure_header(&alg)?;

        let mut validation = Validation::new(self.keys.algorithm().to_jwt());
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let presented =
            decode::<PresentedClaims>(token, self.keys.decoding_key(), &validation)?.claims;
        let claims = SessionClaims {
            nbf: presented.nbf.ok_or_else(|| AuthError::missing_claim("nbf"))?,
            exp: presented.exp.ok_or_else(|| AuthError::missing_claim("exp"))?,
        };

        claims.check_window(now, duration_secs(self.clock_skew))
    }
}
