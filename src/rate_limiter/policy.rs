//! # Named Rate Limiters
//!
//! A [`RateLimiter`] is a named policy bound to its own [`BucketRegistry`].
//! [`Limiters`] bundles the two limiters a service runs:
//!
//! ```text
//!     incoming request (client 203.0.113.7)
//!            │
//!            ├──► Limiters.default ──► registry A  (10/s, burst 20)  every route
//!            │
//!            └──► Limiters.auth ─────► registry B  (2/s, burst 5)    login/register
//!
//!     Registries never share entries: exhausting B for a client leaves its
//!     budget in A untouched.
//! ```

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use super::{
    config::{RateLimitPolicy, RegistryConfig},
    manager::{BucketRegistry, SweeperHandle},
    metrics::{Decision, RegistryStats},
};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;

/// A named admission policy with its own registry of client buckets.
///
/// ```rust
/// use warden::{RateLimitPolicy, RateLimiter};
///
/// let limiter = RateLimiter::new("auth", RateLimitPolicy::auth()).unwrap();
///
/// let decision = limiter.check("203.0.113.7");
/// assert!(decision.allowed);
/// assert_eq!(decision.limit, 2.0);
/// assert_eq!(decision.remaining, 4);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: Arc<str>,
    registry: BucketRegistry,
}

impl RateLimiter {
    /// Creates a limiter with default housekeeping and the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid.
    pub fn new(name: impl Into<String>, policy: RateLimitPolicy) -> Result<Self, ConfigError> {
        Ok(Self::with_registry(name, BucketRegistry::new(policy)?))
    }

    /// Creates a limiter with explicit housekeeping settings and clock.
    pub fn with_settings(
        name: impl Into<String>,
        policy: RateLimitPolicy,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let registry = BucketRegistry::with_settings(policy, config, clock)?;
        Ok(Self::with_registry(name, registry))
    }

    /// Wraps an existing registry.
    pub fn with_registry(name: impl Into<String>, registry: BucketRegistry) -> Self {
        Self {
            name: Arc::from(name.into()),
            registry,
        }
    }

    /// Admission check for a client key.
    ///
    /// A denial is a normal outcome, not an error; use
    /// [`Decision::into_result`] to turn it into one.
    #[inline]
    pub fn check(&self, key: &str) -> Decision {
        self.registry.check(key)
    }

    /// Admission check keyed by a client address.
    pub fn check_addr(&self, addr: IpAddr) -> Decision {
        self.registry.check(&addr.to_string())
    }

    /// Name of the policy, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> RateLimitPolicy {
        self.registry.policy()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    /// Starts the background sweeper for this limiter's registry.
    pub fn start_sweeper(&self) -> io::Result<SweeperHandle> {
        self.registry.start_sweeper()
    }

    /// Snapshot of the registry counters.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

/// The general-traffic and authentication limiters of a service.
#[derive(Debug, Clone)]
pub struct Limiters {
    /// Applied to every route.
    pub default: RateLimiter,

    /// Applied to login and registration, in addition to `default`.
    pub auth: RateLimiter,
}

impl Limiters {
    /// Builds both limiters with the reference policies (10/s burst 20 and
    /// 2/s burst 5), default housekeeping and the system clock.
    pub fn standard() -> Result<Self, ConfigError> {
        Self::new(
            RateLimitPolicy::default_policy(),
            RateLimitPolicy::auth(),
            RegistryConfig::default(),
            Arc::new(SystemClock),
        )
    }

    /// Builds both limiters. They share the clock and housekeeping settings
    /// but each gets its own registry.
    pub fn new(
        default_policy: RateLimitPolicy,
        auth_policy: RateLimitPolicy,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            default: RateLimiter::with_settings("default", default_policy, config, clock.clone())?,
            auth: RateLimiter::with_settings("auth", auth_policy, config, clock)?,
        })
    }

    /// Starts one sweeper per registry. Dropping the handles stops them.
    pub fn start_sweepers(&self) -> io::Result<[SweeperHandle; 2]> {
        Ok([self.default.start_sweeper()?, self.auth.start_sweeper()?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn limiters() -> (Limiters, ManualClock) {
        let clock = ManualClock::new(50_000);
        let limiters = Limiters::new(
            RateLimitPolicy::default_policy(),
            RateLimitPolicy::auth(),
            RegistryConfig::default(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (limiters, clock)
    }

    #[test]
    fn test_policies_are_independent() {
        let (limiters, _clock) = limiters();

        for _ in 0..5 {
            assert!(limiters.auth.check("10.0.0.1").allowed);
        }
        assert!(!limiters.auth.check("10.0.0.1").allowed);

        // General budget untouched
        let decision = limiters.default.check("10.0.0.1");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 19);

        assert_eq!(limiters.auth.stats().active_keys, 1);
        assert_eq!(limiters.default.stats().active_keys, 1);
    }

    #[test]
    fn test_auth_refill() {
        let (limiters, clock) = limiters();

        for _ in 0..5 {
            limiters.auth.check("k");
        }
        let denied = limiters.auth.check("k");
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_millis(500));

        clock.advance(Duration::from_millis(500));
        assert!(limiters.auth.check("k").allowed);
    }

    #[test]
    fn test_check_addr_matches_string_key() {
        let limiter = RateLimiter::new("test", RateLimitPolicy::new(2, 0.01)).unwrap();
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

        assert!(limiter.check_addr(addr).allowed);
        assert!(limiter.check("192.0.2.1").allowed);
        assert!(!limiter.check_addr(addr).allowed);
        assert!(limiter.registry().contains_key("192.0.2.1"));
    }

    #[test]
    fn test_names_and_policies() {
        let limiters = Limiters::standard().unwrap();
        assert_eq!(limiters.default.name(), "default");
        assert_eq!(limiters.auth.name(), "auth");
        assert_eq!(limiters.default.policy(), RateLimitPolicy::default_policy());
        assert_eq!(limiters.auth.policy(), RateLimitPolicy::auth());
    }

    #[test]
    fn test_invalid_policy() {
        assert!(RateLimiter::new("bad", RateLimitPolicy::new(0, 1.0)).is_err());
        assert!(Limiters::new(
            RateLimitPolicy::default_policy(),
            RateLimitPolicy::new(5, 0.0),
            RegistryConfig::default(),
            Arc::new(SystemClock),
        )
        .is_err());
    }

    #[test]
    fn test_start_sweepers() {
        let limiters = Limiters::standard().unwrap();
        let sweepers = limiters.start_sweepers().unwrap();
        assert!(sweepers.iter().all(|s| s.is_running()));
        drop(sweepers);
    }
}
