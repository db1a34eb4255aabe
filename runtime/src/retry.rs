//! Backoff policy for re-establishing live subscriptions.
//!
//! A subscription is retried for as long as it is wanted, so the policy has
//! no attempt limit by default; only the delay between attempts is bounded.
//!
//! # Example
//!
//! ```rust
//! use shared_todos_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .jitter(false)
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
//! assert!(policy.should_retry(1_000));
//! ```

use rand::Rng;
use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: unlimited
/// - `initial_delay`: 250ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: on
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (`None` retries forever)
    pub max_retries: Option<usize>,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Scale each delay by a random factor in `0.5..=1.0`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter.
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        if capped_secs.is_finite() && capped_secs >= 0.0 {
            Duration::from_secs_f64(capped_secs)
        } else {
            self.max_delay
        }
    }

    /// Delay to actually wait before retry number `attempt`.
    ///
    /// Applies jitter when enabled, spreading reconnects of many clients
    /// after a shared outage.
    #[must_use]
    pub fn backoff(&self, attempt: usize) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    /// Check if we should retry based on attempt number
    #[must_use]
    pub fn should_retry(&self, attempt: usize) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl RetryPolicyBuilder {
    /// Limit the number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}
