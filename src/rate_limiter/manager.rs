//! # Bucket Registry
//!
//! Maps client keys (usually the resolved source address) to their token
//! buckets, creating buckets lazily and evicting idle ones.
//!
//! ## Architecture
//!
//! ```text
//!     Client Requests:
//!     192.168.1.1 ──┐
//!     192.168.1.2 ──┤
//!     10.0.0.1 ─────┼──► BucketRegistry ──► per-key TokenBucket
//!     10.0.0.2 ─────┘         │
//!                             ▼
//!                       ┌──────────────┐
//!                       │  DashMap     │   sharded, one RwLock per shard
//!                       │  key → Entry │   Entry = bucket + last_seen
//!                       └──────▲───────┘
//!                              │ retain(idle ≤ threshold)
//!                       ┌──────┴───────┐
//!                       │   Sweeper    │   background thread, every minute
//!                       └──────────────┘
//! ```
//!
//! ## Consistency
//!
//! Refill, consume and the `last_seen` update for a key all happen while the
//! write lock of that key's shard is held. The sweeper removes entries
//! through the same shard locks. So:
//!
//! 1. Checks for one key are linearizable: each sees every earlier check.
//! 2. A check racing with eviction either runs before it (and refreshes
//!    `last_seen`, so the entry survives) or after it (and creates a fresh
//!    full bucket). It never observes a half-removed entry.

use super::{
    config::{RateLimitPolicy, RegistryConfig},
    core::TokenBucket,
    metrics::{Decision, RegistryStats},
};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use dashmap::DashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, info};

/// One tracked client.
#[derive(Debug, Clone)]
struct Entry {
    bucket: TokenBucket,
    last_seen_ms: u64,
}

impl Entry {
    fn new(policy: RateLimitPolicy, now_ms: u64) -> Self {
        Self {
            bucket: TokenBucket::new(policy, now_ms),
            last_seen_ms: now_ms,
        }
    }

    #[inline]
    fn is_idle(&self, now_ms: u64, idle_threshold_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > idle_threshold_ms
    }
}

/// Concurrent registry of token buckets, one per client key, all shaped by
/// the same policy.
///
/// Cloning is cheap and clones share state, so the registry can be handed
/// to request handlers and to its own sweeper thread.
///
/// ## Usage
///
/// ```rust
/// use warden::{BucketRegistry, RateLimitPolicy};
///
/// let registry = BucketRegistry::new(RateLimitPolicy::new(2, 1.0)).unwrap();
///
/// assert!(registry.check("192.168.1.1").allowed);
/// assert!(registry.check("192.168.1.1").allowed);
/// assert!(!registry.check("192.168.1.1").allowed);
///
/// // Other clients are unaffected
/// assert!(registry.check("192.168.1.2").allowed);
/// ```
///
/// ## With Automatic Eviction
///
/// ```rust
/// use warden::{BucketRegistry, RateLimitPolicy};
///
/// let registry = BucketRegistry::new(RateLimitPolicy::default_policy()).unwrap();
/// let sweeper = registry.start_sweeper().unwrap();
///
/// // ... serve requests ...
///
/// sweeper.stop();
/// ```
#[derive(Clone)]
pub struct BucketRegistry {
    /// Key → entry. DashMap shards the map so unrelated keys rarely contend.
    entries: Arc<DashMap<String, Entry, ahash::RandomState>>,

    /// Shape of every bucket in this registry.
    policy: RateLimitPolicy,

    /// Idle threshold and sweep interval.
    config: RegistryConfig,

    /// Time source for `check` and the sweeper.
    clock: Arc<dyn Clock>,

    /// Total number of buckets created since startup.
    total_created: Arc<AtomicU64>,

    /// Total number of buckets evicted or cleared since startup.
    total_evicted: Arc<AtomicU64>,

    /// Total admitted checks.
    total_allowed: Arc<AtomicU64>,

    /// Total denied checks.
    total_denied: Arc<AtomicU64>,
}

impl BucketRegistry {
    /// Creates a registry with the default housekeeping settings (one hour
    /// idle threshold, one minute sweep) and the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid.
    pub fn new(policy: RateLimitPolicy) -> Result<Self, ConfigError> {
        Self::with_settings(policy, RegistryConfig::default(), Arc::new(SystemClock))
    }

    /// Creates a registry with explicit housekeeping settings and clock.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use warden::{BucketRegistry, ManualClock, RateLimitPolicy, RegistryConfig};
    ///
    /// let clock = ManualClock::new(0);
    /// let registry = BucketRegistry::with_settings(
    ///     RateLimitPolicy::auth(),
    ///     RegistryConfig::new(Duration::from_secs(300), Duration::from_secs(10)),
    ///     Arc::new(clock.clone()),
    /// )
    /// .unwrap();
    /// ```
    pub fn with_settings(
        policy: RateLimitPolicy,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        config.validate()?;

        let num_shards = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .saturating_mul(4)
            .next_power_of_two()
            .clamp(4, 64);

        Ok(Self {
            entries: Arc::new(DashMap::with_hasher_and_shard_amount(
                ahash::RandomState::new(),
                num_shards,
            )),
            policy,
            config,
            clock,
            total_created: Arc::new(AtomicU64::new(0)),
            total_evicted: Arc::new(AtomicU64::new(0)),
            total_allowed: Arc::new(AtomicU64::new(0)),
            total_denied: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Admission check for `key` at the registry clock's current time.
    #[inline]
    pub fn check(&self, key: &str) -> Decision {
        self.try_acquire(key, self.clock.now_ms())
    }

    /// Admission check for `key` at time `now_ms`.
    ///
    /// Creates a full bucket if the key is new (or its entry has been idle
    /// past the threshold and not yet swept), refills it for the elapsed
    /// time, and takes one token if available. Refreshes the entry's
    /// `last_seen` either way.
    pub fn try_acquire(&self, key: &str, now_ms: u64) -> Decision {
        let idle_ms = self.config.idle_threshold_ms();

        // Fast path: existing key, no allocation
        let decision = if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_idle(now_ms, idle_ms) {
                // Stale but not yet swept: behave as if it had been evicted
                debug!(key, "Replacing idle rate limit bucket");
                *entry = Entry::new(self.policy, now_ms);
                self.total_evicted.fetch_add(1, Ordering::Relaxed);
                self.total_created.fetch_add(1, Ordering::Relaxed);
            }
            self.admit(&mut entry, now_ms)
        } else {
            let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| {
                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Created rate limit bucket");
                Entry::new(self.policy, now_ms)
            });
            self.admit(&mut entry, now_ms)
        };

        if decision.allowed {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_denied.fetch_add(1, Ordering::Relaxed);
            debug!(
                key,
                retry_after_ms = decision.reset_after.as_millis() as u64,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Refill-then-consume on an entry whose shard lock the caller holds.
    #[inline]
    fn admit(&self, entry: &mut Entry, now_ms: u64) -> Decision {
        entry.last_seen_ms = entry.last_seen_ms.max(now_ms);
        let allowed = entry.bucket.try_acquire(now_ms);

        Decision {
            allowed,
            limit: self.policy.refill_per_second,
            capacity: self.policy.capacity,
            remaining: entry.bucket.remaining(),
            reset_after: entry.bucket.time_until_available(),
        }
    }

    /// Removes every entry idle for longer than the threshold as of
    /// `now_ms`. Returns the number of entries removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let idle_ms = self.config.idle_threshold_ms();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_idle(now_ms, idle_ms) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.total_evicted.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(
                removed,
                remaining = self.entries.len(),
                "Evicted idle rate limit buckets"
            );
        }

        removed
    }

    /// [`sweep`](Self::sweep) at the registry clock's current time.
    pub fn sweep_now(&self) -> usize {
        self.sweep(self.clock.now_ms())
    }

    /// Starts the background sweeper.
    ///
    /// The sweeper runs [`sweep_now`](Self::sweep_now) every
    /// `sweep_interval` until the returned handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn start_sweeper(&self) -> io::Result<SweeperHandle> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let registry = self.clone();
        let interval = self.config.sweep_interval;

        let handle = thread::Builder::new()
            .name("warden-sweeper".to_string())
            .spawn(move || {
                info!(
                    interval_ms = interval.as_millis() as u64,
                    idle_threshold_ms = registry.config.idle_threshold_ms(),
                    "Started rate limit sweeper"
                );

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Rate limit sweeper stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            registry.sweep_now();
                        }
                    }
                }
            })?;

        Ok(SweeperHandle {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        self.total_evicted.fetch_add(count as u64, Ordering::Relaxed);
        info!(count, "Cleared all rate limit buckets");
    }

    /// Number of keys currently tracked.
    #[inline]
    pub fn active_keys(&self) -> usize {
        self.entries.len()
    }

    /// Whether `key` currently has a bucket.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Last access time of `key`, if tracked.
    pub fn last_seen_ms(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.last_seen_ms)
    }

    /// The policy shaping every bucket in this registry.
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Housekeeping settings.
    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Current time according to the registry clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_keys: self.active_keys(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            total_allowed: self.total_allowed.load(Ordering::Relaxed),
            total_denied: self.total_denied.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BucketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRegistry")
            .field("policy", &self.policy)
            .field("config", &self.config)
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

/// Handle to a running sweeper thread.
///
/// Dropping the handle stops the sweeper and waits for it to exit.
#[derive(Debug)]
pub struct SweeperHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Whether the sweeper thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // A send error means the thread already exited
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn registry_with_clock(
        policy: RateLimitPolicy,
        config: RegistryConfig,
    ) -> (BucketRegistry, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let registry =
            BucketRegistry::with_settings(policy, config, Arc::new(clock.clone())).unwrap();
        (registry, clock)
    }

    #[test]
    fn test_basic_key_limiting() {
        let (registry, _clock) =
            registry_with_clock(RateLimitPolicy::new(5, 1.0), RegistryConfig::default());

        // Each key gets its own bucket
        for _ in 0..5 {
            assert!(registry.check("192.168.1.1").allowed);
            assert!(registry.check("192.168.1.2").allowed);
        }

        assert!(!registry.check("192.168.1.1").allowed);
        assert!(!registry.check("192.168.1.2").allowed);
        assert_eq!(registry.active_keys(), 2);
    }

    #[test]
    fn test_decision_metadata() {
        let (registry, clock) =
            registry_with_clock(RateLimitPolicy::new(3, 2.0), RegistryConfig::default());

        let first = registry.check("a");
        assert!(first.allowed);
        assert_eq!(first.limit, 2.0);
        assert_eq!(first.capacity, 3);
        assert_eq!(first.remaining, 2);
        assert_eq!(first.reset_after, Duration::ZERO);

        registry.check("a");
        let third = registry.check("a");
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_after, Duration::from_millis(500));

        let denied = registry.check("a");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        clock.advance(Duration::from_millis(500));
        assert!(registry.check("a").allowed);
    }

    #[test]
    fn test_sweep_removes_only_idle_entries() {
        let (registry, clock) = registry_with_clock(
            RateLimitPolicy::default_policy(),
            RegistryConfig::new(Duration::from_secs(60), Duration::from_secs(1)),
        );

        for i in 0..10 {
            registry.check(&format!("10.0.0.{i}"));
        }
        clock.advance(Duration::from_secs(45));

        // Keep the first five alive
        for i in 0..5 {
            registry.check(&format!("10.0.0.{i}"));
        }
        clock.advance(Duration::from_secs(30));

        assert_eq!(registry.sweep_now(), 5);
        assert_eq!(registry.active_keys(), 5);
        for i in 0..5 {
            assert!(registry.contains_key(&format!("10.0.0.{i}")));
        }

        let stats = registry.stats();
        assert_eq!(stats.total_created, 10);
        assert_eq!(stats.total_evicted, 5);
    }

    #[test]
    fn test_sweep_boundary_is_strict() {
        let (registry, clock) = registry_with_clock(
            RateLimitPolicy::default_policy(),
            RegistryConfig::new(Duration::from_secs(60), Duration::from_secs(1)),
        );

        registry.check("k");
        clock.advance(Duration::from_secs(60));
        assert_eq!(registry.sweep_now(), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(registry.sweep_now(), 1);
    }

    #[test]
    fn test_evicted_key_starts_with_full_bucket() {
        let (registry, clock) = registry_with_clock(
            RateLimitPolicy::new(3, 0.001),
            RegistryConfig::new(Duration::from_secs(60), Duration::from_secs(1)),
        );

        for _ in 0..3 {
            assert!(registry.check("k").allowed);
        }
        assert!(!registry.check("k").allowed);

        clock.advance(Duration::from_secs(61));
        assert_eq!(registry.sweep_now(), 1);
        assert!(!registry.contains_key("k"));

        for _ in 0..3 {
            assert!(registry.check("k").allowed);
        }
        assert!(!registry.check("k").allowed);
    }

    #[test]
    fn test_idle_entry_replaced_before_sweep() {
        let (registry, clock) = registry_with_clock(
            RateLimitPolicy::new(2, 0.0001),
            RegistryConfig::new(Duration::from_secs(60), Duration::from_secs(1)),
        );

        assert!(registry.check("k").allowed);
        assert!(registry.check("k").allowed);
        assert!(!registry.check("k").allowed);

        // No sweep has run; the access itself notices the idle entry
        clock.advance(Duration::from_secs(120));
        let decision = registry.check("k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);

        let stats = registry.stats();
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_evicted, 1);
        assert_eq!(stats.active_keys, 1);
    }

    #[test]
    fn test_last_seen_refreshed_on_denial() {
        let (registry, clock) =
            registry_with_clock(RateLimitPolicy::new(1, 0.001), RegistryConfig::default());

        registry.check("k");
        clock.advance(Duration::from_secs(10));
        assert!(!registry.check("k").allowed);
        assert_eq!(registry.last_seen_ms("k"), Some(clock.now_ms()));
    }

    #[test]
    fn test_clear() {
        let (registry, _clock) =
            registry_with_clock(RateLimitPolicy::default_policy(), RegistryConfig::default());

        for i in 0..10 {
            registry.check(&format!("172.16.0.{i}"));
        }
        assert_eq!(registry.active_keys(), 10);

        registry.clear();

        assert_eq!(registry.active_keys(), 0);
        assert_eq!(registry.stats().total_evicted, 10);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(BucketRegistry::new(RateLimitPolicy::new(0, 1.0)).is_err());
        assert!(BucketRegistry::new(RateLimitPolicy::new(1, -1.0)).is_err());
        assert!(BucketRegistry::with_settings(
            RateLimitPolicy::default_policy(),
            RegistryConfig::new(Duration::ZERO, Duration::from_secs(1)),
            Arc::new(SystemClock),
        )
        .is_err());
    }

    #[test]
    fn test_concurrent_same_key_is_linearizable() {
        // Frozen clock and a negligible refill: exactly `capacity` admissions
        let (registry, _clock) =
            registry_with_clock(RateLimitPolicy::new(100, 0.0001), RegistryConfig::default());
        let mut handles = vec![];

        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                (0..50).filter(|_| registry.check("shared").allowed).count()
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);

        let stats = registry.stats();
        assert_eq!(stats.total_allowed, 100);
        assert_eq!(stats.total_denied, 300);
        assert_eq!(stats.total_created, 1);
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let (registry, _clock) =
            registry_with_clock(RateLimitPolicy::new(20, 0.0001), RegistryConfig::default());
        let mut handles = vec![];

        for thread_id in 0..10 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                let key = format!("10.0.0.{thread_id}");
                (0..50).filter(|_| registry.check(&key).allowed).count()
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 20);
        }
        assert_eq!(registry.active_keys(), 10);
    }

    #[test]
    fn test_concurrent_sweep_and_access() {
        let (registry, clock) = registry_with_clock(
            RateLimitPolicy::new(1_000, 1.0),
            RegistryConfig::new(Duration::from_millis(5), Duration::from_millis(1)),
        );

        let sweeper = {
            let registry = registry.clone();
            let clock = clock.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    clock.advance(Duration::from_millis(3));
                    registry.sweep_now();
                }
            })
        };

        let workers: Vec<_> = (0..4)
            .map(|id| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("client-{}", (id * 7 + i) % 16);
                        let decision = registry.check(&key);
                        assert!(decision.remaining <= 1_000);
                    }
                })
            })
            .collect();

        sweeper.join().unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.total_allowed + stats.total_denied, 2_000);
        assert_eq!(
            stats.total_created - stats.total_evicted,
            stats.active_keys as u64
        );
    }

    #[test]
    fn test_sweeper_thread_evicts_and_stops() {
        let clock = ManualClock::new(0);
        let registry = BucketRegistry::with_settings(
            RateLimitPolicy::default_policy(),
            RegistryConfig::new(Duration::from_millis(50), Duration::from_millis(10)),
            Arc::new(clock.clone()),
        )
        .unwrap();

        for i in 0..5 {
            registry.check(&format!("10.10.10.{i}"));
        }

        let sweeper = registry.start_sweeper().unwrap();
        assert!(sweeper.is_running());

        clock.advance(Duration::from_millis(100));

        let mut waited = 0;
        while registry.active_keys() > 0 && waited < 2_000 {
            thread::sleep(Duration::from_millis(10));
            waited += 10;
        }
        assert_eq!(registry.active_keys(), 0);

        sweeper.stop();
    }

    #[test]
    fn test_sweeper_stops_on_drop() {
        let registry = BucketRegistry::with_settings(
            RateLimitPolicy::default_policy(),
            RegistryConfig::new(Duration::from_secs(60), Duration::from_secs(3600)),
            Arc::new(SystemClock),
        )
        .unwrap();

        let sweeper = registry.start_sweeper().unwrap();
        // Must not block for the hour-long interval
        drop(sweeper);
    }
}
