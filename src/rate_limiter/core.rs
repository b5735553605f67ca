//! # Token Bucket
//!
//! The single-key primitive behind every admission decision.
//!
//! ```text
//!     How the bucket evolves (capacity 3, refill 1/s):
//!
//!     t=0.0s  [🪙🪙🪙]  3.0   ── acquire ✅ ✅ ✅
//!     t=0.0s  [      ]  0.0   ── acquire ❌ (tokens untouched)
//!     t=0.5s  [◐     ]  0.5   ── acquire ❌
//!     t=1.0s  [🪙    ]  1.0   ── acquire ✅
//! ```
//!
//! Each call first refills by `elapsed × rate` (capped at capacity), then
//! takes one whole token if at least one is available.
//!
//! A bucket has no interior synchronization. The registry owns every bucket
//! and only touches it while holding the lock for that key, which is what
//! makes consumption for one key linearizable.

use std::time::Duration;

use super::config::RateLimitPolicy;

/// Continuous (real-valued) token bucket.
///
/// ## Example
///
/// ```rust
/// use warden::{RateLimitPolicy, TokenBucket};
///
/// let mut bucket = TokenBucket::new(RateLimitPolicy::new(3, 1.0), 0);
///
/// assert!(bucket.try_acquire(0));
/// assert!(bucket.try_acquire(0));
/// assert!(bucket.try_acquire(0));
/// assert!(!bucket.try_acquire(0));
///
/// // One second later a full token has been regained
/// assert!(bucket.try_acquire(1_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    /// Maximum tokens the bucket can hold (burst capacity)
    capacity: u32,

    /// Tokens regained per second
    refill_per_second: f64,

    /// Current tokens, always within `0.0..=capacity`
    tokens: f64,

    /// Time of the last refill, epoch milliseconds
    last_refill_ms: u64,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// The policy is expected to be valid (see [`RateLimitPolicy::validate`]);
    /// registries validate once at construction rather than per bucket.
    pub fn new(policy: RateLimitPolicy, now_ms: u64) -> Self {
        Self {
            capacity: policy.capacity,
            refill_per_second: policy.refill_per_second,
            tokens: policy.capacity as f64,
            last_refill_ms: now_ms,
        }
    }

    /// Refills for the time elapsed since the last call, then tries to take
    /// one token.
    ///
    /// Returns `true` if a token was taken. On `false` the token count is
    /// left exactly as the refill made it.
    #[inline]
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        self.refill(now_ms);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Adds `elapsed × rate` tokens, capped at capacity.
    ///
    /// A `now_ms` earlier than the last refill (a clock stepping backwards)
    /// adds nothing and does not move the refill mark back.
    #[inline]
    pub fn refill(&mut self, now_ms: u64) {
        if now_ms <= self.last_refill_ms {
            return;
        }

        let elapsed_secs = (now_ms - self.last_refill_ms) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_secs * self.refill_per_second)
            .min(self.capacity as f64);
        self.last_refill_ms = now_ms;
    }

    /// Current (fractional) token count as of the last refill.
    #[inline]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Whole tokens available as of the last refill.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    /// Burst capacity.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Refill rate in tokens per second.
    #[inline]
    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Time of the last refill, epoch milliseconds.
    #[inline]
    pub fn last_refill_ms(&self) -> u64 {
        self.last_refill_ms
    }

    /// How long until at least one whole token is available.
    ///
    /// Zero if a token is available now. Rounded up to the millisecond so
    /// that waiting exactly this long always suffices.
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }

        let missing = 1.0 - self.tokens;
        let millis = (missing / self.refill_per_second * 1000.0).ceil();
        Duration::from_millis(millis as u64)
    }
}
