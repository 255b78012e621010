//! Assertion-to-session-token exchange.
//!
//! ```text
//! ReceivedAssertion ──parse alg + iss──▶ IdentityExtracted
//!        │                                      │ KeyDirectory::lookup (bounded)
//!        │                                      ▼
//!        │                                 KeyResolved ──verify──▶ SignatureVerified
//!        │                                      │                        │ sign
//!        ▼                                      ▼                        ▼
//!    Rejected { stage, error } ◀────────────────┴──────────────── TokenIssued
//! ```
//!
//! The stage on a rejection is the last state reached before the failure.
//! Each exchange performs at most one key directory lookup.

use std::{fmt, sync::Arc, time::Duration};

use fail::fail_point;
use keyrelay_keydir::{DirectoryError, Identity, KeyDirectory};
use thiserror::Error;

use crate::{
    assertion::{AssertionVerifier, decode_unverified},
    clock::{Clock, SystemClock},
    config::SessionPolicy,
    error::{AuthError, ErrorKind},
    keypair::ServiceKeyPair,
    metrics::ExchangeMetrics,
    session::{IssuedSession, SessionIssuer},
    validation::SigningAlgorithm,
};

/// States of one exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeStage {
    /// The raw assertion has arrived; nothing parsed yet.
    ReceivedAssertion,
    /// The claimed issuer has been read from the unverified payload.
    IdentityExtracted,
    /// The issuer's key record has been fetched.
    KeyResolved,
    /// The assertion verified against the issuer's key.
    SignatureVerified,
    /// A session token was signed.
    TokenIssued,
}

impl ExchangeStage {
    /// Stable snake_case label for structured logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReceivedAssertion => "received_assertion",
            Self::IdentityExtracted => "identity_extracted",
            Self::KeyResolved => "key_resolved",
            Self::SignatureVerified => "signature_verified",
            Self::TokenIssued => "token_issued",
        }
    }
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected exchange.
#[derive(Debug, Error)]
#[error("exchange rejected after {stage}: {error}")]
pub struct ExchangeError {
    /// Last state reached.
    pub stage: ExchangeStage,
    /// The failure.
    #[source]
    pub error: AuthError,
}

impl ExchangeError {
    /// Classification of the underlying error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Turns verified client assertions into session tokens.
#[derive(Clone)]
pub struct TokenExchanger {
    directory: Arc<dyn KeyDirectory>,
    verifier: AssertionVerifier,
    issuer: SessionIssuer,
    assertion_algorithm: SigningAlgorithm,
    lookup_timeout: Duration,
    metrics: ExchangeMetrics,
}

#[bon::bon]
impl TokenExchanger {
    /// Wires an exchanger from its collaborators.
    ///
    /// `policy` defaults to [`SessionPolicy::default`], `clock` to the system
    /// clock and `metrics` to fresh counters.
    #[builder]
    pub fn new(
        directory: Arc<dyn KeyDirectory>,
        keys: Arc<ServiceKeyPair>,
        #[builder(default)] policy: SessionPolicy,
        #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)] clock: Arc<dyn Clock>,
        #[builder(default)] metrics: ExchangeMetrics,
    ) -> Self {
        let verifier = AssertionVerifier::new(policy.assertion_algorithm())
            .with_clock_skew(policy.clock_skew())
            .with_clock(Arc::clone(&clock));
        let issuer = SessionIssuer::new(keys, &policy).with_clock(clock);

        Self {
            directory,
            verifier,
            issuer,
            assertion_algorithm: policy.assertion_algorithm(),
            lookup_timeout: policy.lookup_timeout(),
            metrics,
        }
    }

    /// Outcome counters of this exchanger and its clones.
    #[must_use]
    pub fn metrics(&self) -> &ExchangeMetrics {
        &self.metrics
    }

    /// Verifies `assertion` and issues a session token for its signer.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] naming the last stage reached. Its
    /// [`kind`](ExchangeError::kind) tells authentication failures
    /// (`NotFound`, `SignatureError`, `Expired`, `NotYetValid`) from client
    /// errors (`Malformed` / `MissingParameter` before lookup) and operational
    /// ones (`Unavailable`, `Malformed` key material, `Internal`).
    #[tracing::instrument(skip_all, fields(identity = tracing::field::Empty))]
    pub async fn exchange(&self, assertion: &str) -> Result<IssuedSession, ExchangeError> {
        let mut stage = ExchangeStage::ReceivedAssertion;

        let unverified = decode_unverified(assertion).map_err(|e| self.reject(stage, e))?;
        self.assertion_algorithm
            .ensure_header(unverified.algorithm())
            .map_err(|e| self.reject(stage, e))?;
        stage = ExchangeStage::IdentityExtracted;

        let identity =
            Identity::parse(unverified.issuer()).map_err(|e| self.reject(stage, e.into()))?;
        tracing::Span::current().record("identity", identity.as_str());

        let record = self.lookup(&identity).await.map_err(|e| self.reject(stage, e.into()))?;
        stage = ExchangeStage::KeyResolved;

        self.verifier.verify(assertion, &record).map_err(|e| self.reject(stage, e))?;
        stage = ExchangeStage::SignatureVerified;

        let session = self.issuer.issue().map_err(|e| self.reject(stage, e))?;

        self.metrics.record_issued();
        tracing::info!(
            identity = %identity,
            stage = %ExchangeStage::TokenIssued,
            not_before = session.not_before,
            expires_at = session.expires_at,
            "issued session token"
        );
        Ok(session)
    }

    async fn lookup(
        &self,
        identity: &Identity,
    ) -> Result<keyrelay_keydir::KeyRecord, DirectoryError> {
        fail_point!("exchange-before-lookup", |_| {
            Err(DirectoryError::unavailable("injected failure before key lookup"))
        });

        let start = tokio::time::Instant::now();
        let result =
            match tokio::time::timeout(self.lookup_timeout, self.directory.lookup(identity)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(DirectoryError::timeout()),
            };
        self.metrics.record_lookup(start.elapsed());
        result
    }

    fn reject(&self, stage: ExchangeStage, error: AuthError) -> ExchangeError {
        let kind = error.kind();
        self.metrics.record_rejected(kind);
        if kind.is_operational() {
            tracing::warn!(stage = %stage, kind = %kind, error = %error, "exchange failed");
        } else {
            tracing::info!(stage = %stage, kind = %kind, error = %error, "exchange rejected");
        }
        ExchangeError { stage, error }
    }
}

impl fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchanger")
            .field("assertion_algorithm", &self.assertion_algorithm)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, Header};
    use keyrelay_keydir::{DirectoryResult, KeyRecord, MemoryKeyDirectory};
    use serde_json::json;

    use super::*;
    use crate::{clock::ManualClock, session::SessionValidator};

    const ALICE_KEY: &str = include_str!("../../../testdata/keys/alice.key");
    const ALICE_PUB: &str = include_str!("../../../testdata/keys/alice.key.pub");
    const MALLORY_KEY: &str = include_str!("../../../testdata/keys/mallory.key");
    const SERVICE_KEY: &str = include_str!("../../../testdata/keys/service.key");
    const SERVICE_PUB: &str = include_str!("../../../testdata/keys/service.key.pub");

    const T0: i64 = 1_700_000_000;

    /// Counts lookups and can stall or fail them.
    #[derive(Debug)]
    struct ScriptedDirectory {
        inner: MemoryKeyDirectory,
        calls: AtomicUsize,
        stall: Option<Duration>,
        outage: bool,
    }

    impl ScriptedDirectory {
        fn with_alice() -> Self {
            let inner = MemoryKeyDirectory::new();
            inner.register("alice", ALICE_PUB).unwrap();
            Self { inner, calls: AtomicUsize::new(0), stall: None, outage: false }
        }
    }

    #[async_trait]
    impl KeyDirectory for ScriptedDirectory {
        async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.outage {
                return Err(DirectoryError::unavailable("connection refused"));
            }
            self.inner.lookup(identity).await
        }
    }

    fn keys() -> Arc<ServiceKeyPair> {
        Arc::new(ServiceKeyPair::from_pem(SERVICE_KEY, SERVICE_PUB).unwrap())
    }

    fn exchanger(directory: Arc<ScriptedDirectory>, policy: SessionPolicy) -> TokenExchanger {
        TokenExchanger::builder()
            .directory(directory)
            .keys(keys())
            .policy(policy)
            .clock(Arc::new(ManualClock::new(T0)))
            .build()
    }

    fn sign(private_pem: &str, claims: &serde_json::Value) -> String {
        let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
        jsonwebtoken::encode(&Header::new(jsonwebtoken::Algorithm::RS256), claims, &key).unwrap()
    }

    #[tokio::test]
    async fn test_issues_token_for_registered_signer() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(Arc::clone(&directory), SessionPolicy::default());

        let session = exchanger.exchange(&sign(ALICE_KEY, &json!({"iss": "alice"}))).await.unwrap();

        assert_eq!(session.not_before, T0 + 10);
        assert_eq!(session.expires_at, T0 + 30);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);

        let snapshot = exchanger.metrics().snapshot();
        assert_eq!(snapshot.issued, 1);
        assert_eq!(snapshot.lookup_count, 1);
        assert_eq!(snapshot.total_rejected(), 0);

        let validator = SessionValidator::new(keys(), &SessionPolicy::default());
        assert!(validator.validate_at(&session.token, T0 + 10).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_issuer_rejected_after_lookup() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(Arc::clone(&directory), SessionPolicy::default());

        let err = exchanger.exchange(&sign(ALICE_KEY, &json!({"iss": "bob"}))).await.unwrap_err();

        assert_eq!(err.stage, ExchangeStage::IdentityExtracted);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(exchanger.metrics().snapshot().rejected_not_found, 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_after_key_resolved() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(directory, SessionPolicy::default());

        let err =
            exchanger.exchange(&sign(MALLORY_KEY, &json!({"iss": "alice"}))).await.unwrap_err();

        assert_eq!(err.stage, ExchangeStage::KeyResolved);
        assert_eq!(err.kind(), ErrorKind::SignatureError);
    }

    #[tokio::test]
    async fn test_missing_issuer_rejected_without_lookup() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(Arc::clone(&directory), SessionPolicy::default());

        let err = exchanger.exchange(&sign(ALICE_KEY, &json!({"sub": "alice"}))).await.unwrap_err();

        assert_eq!(err.stage, ExchangeStage::ReceivedAssertion);
        assert_eq!(err.kind(), ErrorKind::MissingParameter);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_identity_rejected_without_lookup() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(Arc::clone(&directory), SessionPolicy::default());

        let err = exchanger
            .exchange(&sign(ALICE_KEY, &json!({"iss": "../alice"})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_outage_is_operational() {
        let directory =
            Arc::new(ScriptedDirectory { outage: true, ..ScriptedDirectory::with_alice() });
        let exchanger = exchanger(directory, SessionPolicy::default());

        let err = exchanger.exchange(&sign(ALICE_KEY, &json!({"iss": "alice"}))).await.unwrap_err();

        assert_eq!(err.stage, ExchangeStage::IdentityExtracted);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.kind().is_operational());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out() {
        let directory = Arc::new(ScriptedDirectory {
            stall: Some(Duration::from_secs(60)),
            ..ScriptedDirectory::with_alice()
        });
        let policy = SessionPolicy::builder().lookup_timeout(Duration::from_secs(2)).build().unwrap();
        let exchanger = exchanger(directory, policy);

        let err = exchanger.exchange(&sign(ALICE_KEY, &json!({"iss": "alice"}))).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn test_expired_assertion_rejected() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(directory, SessionPolicy::default());

        let err = exchanger
            .exchange(&sign(ALICE_KEY, &json!({"iss": "alice", "exp": T0 - 60})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let directory = Arc::new(ScriptedDirectory::with_alice());
        let exchanger = exchanger(directory, SessionPolicy::default());

        let err = exchanger.exchange("definitely not a jwt").await.unwrap_err();

        assert_eq!(err.stage, ExchangeStage::ReceivedAssertion);
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(ExchangeStage::KeyResolved.to_string(), "key_resolved");
        let err = ExchangeError {
            stage: ExchangeStage::SignatureVerified,
            error: AuthError::signing_failed("boom"),
        };
        assert_eq!(err.to_string(), "exchange rejected after signature_verified: Signing failed: boom");
    }
}
