//! # Rate Limiter Configuration
//!
//! Two kinds of settings live here:
//!
//! - [`RateLimitPolicy`]: the shape of one token bucket (burst capacity and
//!   continuous refill rate).
//! - [`RegistryConfig`]: how a registry of buckets is housekept (idle
//!   threshold and sweep interval).
//!
//! ## Token Bucket Parameters
//!
//! ```text
//!     Policy "default":
//!
//!     ┌──────────────────────────────┐
//!     │   Capacity: 20               │ ← Burst limit
//!     │   ┌─────────────────────┐    │
//!     │   │ 🪙 🪙 🪙 🪙 🪙 ...  │    │ ← Current tokens (fractional)
//!     │   └─────────────────────┘    │
//!     │                              │
//!     │   Refill: 10.0 tokens/s      │ ← Continuous, not per tick
//!     └──────────────────────────────┘
//! ```
//!
//! The refill is real-valued: after 150ms a 10/s bucket has gained 1.5
//! tokens. There is no fixed window, so no burst-at-boundary artifact.

use std::time::Duration;

use crate::error::ConfigError;

/// Default policy sustained rate (requests per second).
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;

/// Default policy burst capacity.
pub const DEFAULT_BURST: u32 = 20;

/// Auth policy sustained rate (requests per second).
pub const AUTH_REQUESTS_PER_SECOND: f64 = 2.0;

/// Auth policy burst capacity.
pub const AUTH_BURST: u32 = 5;

/// Entries idle for longer than this are evicted (one hour).
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// How often the background sweeper runs (one minute).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shape of a token bucket: how big a burst is tolerated and how fast
/// capacity comes back.
///
/// ## Examples
///
/// ```rust
/// use warden::RateLimitPolicy;
///
/// // 10 req/s sustained, bursts of 20
/// let general = RateLimitPolicy::default_policy();
///
/// // 2 req/s sustained, bursts of 5, for login/register
/// let auth = RateLimitPolicy::auth();
///
/// // Custom
/// let policy = RateLimitPolicy::new(3, 1.0);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Maximum tokens the bucket can hold. A fresh bucket starts full, so
    /// this many back-to-back requests are always admitted.
    pub capacity: u32,

    /// Tokens regained per second of elapsed time.
    pub refill_per_second: f64,
}

impl RateLimitPolicy {
    /// Creates a policy with the given burst capacity and refill rate.
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// General-traffic policy: 10 requests/second, burst 20.
    pub fn default_policy() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_REQUESTS_PER_SECOND)
    }

    /// Authentication-endpoint policy: 2 requests/second, burst 5.
    ///
    /// Deliberately strict to blunt credential stuffing and brute force.
    pub fn auth() -> Self {
        Self::new(AUTH_BURST, AUTH_REQUESTS_PER_SECOND)
    }

    /// Checks that the policy describes a usable bucket.
    ///
    /// # Errors
    ///
    /// - `capacity` is 0
    /// - `refill_per_second` is not a finite number greater than 0
    ///
    /// ```rust
    /// use warden::RateLimitPolicy;
    ///
    /// assert!(RateLimitPolicy::new(0, 1.0).validate().is_err());
    /// assert!(RateLimitPolicy::new(5, 0.0).validate().is_err());
    /// assert!(RateLimitPolicy::new(5, f64::NAN).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid(
                "capacity",
                "capacity must be at least 1",
            ));
        }

        if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
            return Err(ConfigError::invalid(
                "refill_per_second",
                format!(
                    "refill rate must be a finite number greater than 0, got {}",
                    self.refill_per_second
                ),
            ));
        }

        Ok(())
    }

    /// Time for an empty bucket to regain one token.
    pub fn token_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refill_per_second)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// Housekeeping settings for a bucket registry.
///
/// ```text
///     t=0        t=1m       t=2m   ...   t=61m
///     │ request  │ sweep    │ sweep       │ sweep
///     ▼          ▼          ▼             ▼
///     [entry]    keep       keep          evict (idle > 1h)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Entries whose last access is older than this are removed.
    pub idle_threshold: Duration,

    /// Period of the background sweep.
    pub sweep_interval: Duration,
}

impl RegistryConfig {
    /// Creates registry settings.
    pub fn new(idle_threshold: Duration, sweep_interval: Duration) -> Self {
        Self {
            idle_threshold,
            sweep_interval,
        }
    }

    /// Checks that both durations are non-zero and that the idle threshold
    /// fits in `u64` milliseconds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_threshold.is_zero() {
            return Err(ConfigError::invalid(
                "idle_threshold",
                "idle threshold must be greater than 0",
            ));
        }
        if u64::try_from(self.idle_threshold.as_millis()).is_err() {
            return Err(ConfigError::invalid(
                "idle_threshold",
                "idle threshold is too large",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::invalid(
                "sweep_interval",
                "sweep interval must be greater than 0",
            ));
        }
        Ok(())
    }

    pub(crate) fn idle_threshold_ms(&self) -> u64 {
        u64::try_from(self.idle_threshold.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for RegistryConfig {
    /// One hour idle threshold, swept every minute.
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_THRESHOLD, DEFAULT_SWEEP_INTERVAL)
    }
}
