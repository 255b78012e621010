//! Session policy: token window and assertion algorithm.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AuthError, Result},
    validation::SigningAlgorithm,
};

/// Default delay between issuance and the start of a session token's window.
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(10);

/// Default time from issuance to session token expiry.
pub const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(30);

/// Default tolerance applied to time checks (strict).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::ZERO;

/// Default bound on a single key directory lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing and algorithm policy for the exchange.
///
/// A session token issued at `t` is valid on `[t + grace_delay, t + validity_window]`.
/// Both bounds are whole seconds, so the policy requires
/// `1s <= grace_delay < validity_window` and `clock_skew < grace_delay` at
/// second granularity.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use keyrelay_authn::SessionPolicy;
///
/// let policy = SessionPolicy::builder()
///     .grace_delay(Duration::from_secs(5))
///     .validity_window(Duration::from_secs(60))
///     .build()?;
/// assert_eq!(policy.validity_window(), Duration::from_secs(60));
///
/// assert!(SessionPolicy::builder().grace_delay(Duration::ZERO).build().is_err());
/// # Ok::<(), keyrelay_authn::AuthError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionPolicy {
    #[serde(with = "humantime_serde", default = "default_grace_delay")]
    grace_delay: Duration,

    #[serde(with = "humantime_serde", default = "default_validity_window")]
    validity_window: Duration,

    #[serde(with = "humantime_serde", default = "default_clock_skew")]
    clock_skew: Duration,

    #[serde(default)]
    assertion_algorithm: SigningAlgorithm,

    #[serde(with = "humantime_serde", default = "default_lookup_timeout")]
    lookup_timeout: Duration,
}

fn default_grace_delay() -> Duration {
    DEFAULT_GRACE_DELAY
}

fn default_validity_window() -> Duration {
    DEFAULT_VALIDITY_WINDOW
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

fn default_lookup_timeout() -> Duration {
    DEFAULT_LOOKUP_TIMEOUT
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            grace_delay: DEFAULT_GRACE_DELAY,
            validity_window: DEFAULT_VALIDITY_WINDOW,
            clock_skew: DEFAULT_CLOCK_SKEW,
            assertion_algorithm: SigningAlgorithm::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

#[bon::bon]
impl SessionPolicy {
    /// Creates a validated policy.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if the window constraints
    /// do not hold (see [`validate`](Self::validate)).
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_GRACE_DELAY)] grace_delay: Duration,
        #[builder(default = DEFAULT_VALIDITY_WINDOW)] validity_window: Duration,
        #[builder(default = DEFAULT_CLOCK_SKEW)] clock_skew: Duration,
        #[builder(default)] assertion_algorithm: SigningAlgorithm,
        #[builder(default = DEFAULT_LOOKUP_TIMEOUT)] lookup_timeout: Duration,
    ) -> Result<Self> {
        let policy =
            Self { grace_delay, validity_window, clock_skew, assertion_algorithm, lookup_timeout };
        policy.validate()?;
        Ok(policy)
    }

    /// Re-checks the constraints, for policies obtained through deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if:
    /// - `grace_delay` is shorter than one second
    /// - `validity_window` is not longer than `grace_delay` in whole seconds
    /// - `clock_skew` is not shorter than `grace_delay` in whole seconds, which
    ///   would make a token valid at the moment it is issued
    /// - `lookup_timeout` is zero
    pub fn validate(&self) -> Result<()> {
        if self.grace_delay.as_secs() == 0 {
            return Err(AuthError::invalid_configuration(
                "grace_delay must be at least one second",
            ));
        }
        if self.validity_window.as_secs() <= self.grace_delay.as_secs() {
            return Err(AuthError::invalid_configuration(format!(
                "validity_window ({}s) must exceed grace_delay ({}s)",
                self.validity_window.as_secs(),
                self.grace_delay.as_secs()
            )));
        }
        if self.clock_skew.as_secs() >= self.grace_delay.as_secs() {
            return Err(AuthError::invalid_configuration(format!(
                "clock_skew ({}s) must be shorter than grace_delay ({}s)",
                self.clock_skew.as_secs(),
                self.grace_delay.as_secs()
            )));
        }
        if self.lookup_timeout.is_zero() {
            return Err(AuthError::invalid_configuration("lookup_timeout must be non-zero"));
        }
        Ok(())
    }

    /// Delay from issuance to the start of validity.
    #[must_use]
    pub fn grace_delay(&self) -> Duration {
        self.grace_delay
    }

    /// Time from issuance to expiry.
    #[must_use]
    pub fn validity_window(&self) -> Duration {
        self.validity_window
    }

    /// Tolerance for clock drift between issuer and validator.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// The only algorithm accepted on incoming assertions.
    #[must_use]
    pub fn assertion_algorithm(&self) -> SigningAlgorithm {
        self.assertion_algorithm
    }

    /// Upper bound on one key directory lookup.
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }
}
