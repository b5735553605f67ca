//! # Admission Results and Registry Statistics
//!
//! [`Decision`] is what a single admission check returns; it carries
//! everything the transport layer needs to fill in throttling headers.
//! [`RegistryStats`] is a point-in-time snapshot of a registry, for logs and
//! health checks.
//!
//! ```text
//!     Decision (denied):
//!     ┌─────────────────────────────────────┐
//!     │  allowed:      false                │
//!     │  limit:        2 req/s              │ ─► X-RateLimit-Limit
//!     │  remaining:    0   (hint)           │ ─► X-RateLimit-Remaining
//!     │  reset_after:  500ms                │ ─► X-RateLimit-Reset / Retry-After
//!     └─────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use crate::error::RateLimitExceeded;

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Sustained limit of the policy, in requests per second.
    pub limit: f64,

    /// Burst capacity of the policy.
    pub capacity: u32,

    /// Whole tokens left after this check.
    ///
    /// This is a **hint**: concurrent requests from the same client may
    /// consume tokens between this check and the caller reading the value,
    /// and refill may add some. Do not rely on it as an exact quota.
    pub remaining: u32,

    /// How long until the next token becomes available. Zero when the
    /// bucket still holds a whole token.
    pub reset_after: Duration,
}

impl Decision {
    /// Converts a denial into an error, for `?`-style short-circuiting.
    ///
    /// ```rust
    /// use warden::{RateLimitPolicy, RateLimiter};
    ///
    /// let limiter = RateLimiter::new("auth", RateLimitPolicy::new(1, 1.0)).unwrap();
    /// assert!(limiter.check("10.0.0.1").into_result().is_ok());
    /// assert!(limiter.check("10.0.0.1").into_result().is_err());
    /// ```
    pub fn into_result(self) -> Result<Decision, RateLimitExceeded> {
        if self.allowed {
            Ok(self)
        } else {
            Err(RateLimitExceeded { decision: self })
        }
    }

    /// Absolute time (UNIX seconds) at which the next token is available,
    /// rounded up to the whole second.
    pub fn reset_at_unix_secs(&self, now_ms: u64) -> u64 {
        let reset_ms = now_ms.saturating_add(self.reset_after.as_millis() as u64);
        reset_ms.div_ceil(1000)
    }

    /// Seconds a client should wait before retrying, rounded up, at least 1
    /// for a denial.
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed {
            return 0;
        }
        (self.reset_after.as_millis() as u64).div_ceil(1000).max(1)
    }
}

/// Snapshot of a bucket registry.
///
/// ## Metrics Explained
///
/// - **active_keys**: clients currently tracked
/// - **total_created**: lifetime count of buckets created
/// - **total_evicted**: lifetime count of buckets removed for idleness
/// - **total_allowed** / **total_denied**: lifetime admission outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of keys currently holding a bucket.
    pub active_keys: usize,

    /// Total number of buckets created since startup.
    pub total_created: u64,

    /// Total number of buckets evicted or cleared since startup.
    pub total_evicted: u64,

    /// Total admitted requests.
    pub total_allowed: u64,

    /// Total denied requests.
    pub total_denied: u64,
}

impl RegistryStats {
    /// Fraction of checks that were admitted (1.0 when nothing was checked).
    pub fn admission_rate(&self) -> f64 {
        let total = self.total_allowed + self.total_denied;
        if total == 0 {
            1.0
        } else {
            self.total_allowed as f64 / total as f64
        }
    }

    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Bucket Registry Stats:\n\
             ├─ Keys:\n\
             │  ├─ Active: {}\n\
             │  ├─ Created: {}\n\
             │  └─ Evicted: {}\n\
             └─ Admission:\n\
                ├─ Allowed: {}\n\
                ├─ Denied: {}\n\
                └─ Admission Rate: {:.2}%",
            self.active_keys,
            self.total_created,
            self.total_evicted,
            self.total_allowed,
            self.total_denied,
            self.admission_rate() * 100.0
        )
    }
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
