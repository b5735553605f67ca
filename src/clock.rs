//! # Time Sources
//!
//! Every time-dependent decision in this crate (bucket refill, idle eviction,
//! token issuance and expiry) reads the time through the [`Clock`] trait
//! instead of calling the system clock directly.
//!
//! ```text
//!     Clock implementations:
//!
//!     SystemClock ──► wall clock, advanced monotonically (production)
//!     ManualClock ──► shared counter moved by hand (tests, simulations)
//! ```
//!
//! All clocks report **milliseconds since the UNIX epoch**. Millisecond
//! precision is enough for both refill math and token expiry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch milliseconds captured once, then advanced with a
// monotonic Instant so that a system clock jump never moves time backwards.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

/// A source of the current time.
///
/// Implementations must be cheap to call and safe to share across threads;
/// the registry and the token service call `now_ms` on every request.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Production clock: wall time that never runs backwards.
///
/// # Example
///
/// ```rust
/// use warden::{Clock, SystemClock};
///
/// let now = SystemClock.now_ms();
/// assert!(now > 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        let (start, base_ms) = START_TIME_BASE.get_or_init(|| {
            let epoch_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            (Instant::now(), epoch_ms)
        });
        base_ms.saturating_add(start.elapsed().as_millis() as u64)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// registry or token service and keep another to advance time.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use warden::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// let shared = clock.clone();
///
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(shared.now_ms(), 1_250);
/// ```
#[derive(Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now_ms())
    }

    /// Moves time forward by `by` (truncated to whole milliseconds).
    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(by_ms, Ordering::AcqRel);
    }

    /// Jumps to an absolute time.
    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now_ms", &self.now_ms())
            .finish()
    }
}
