//! # Rate Limiter Module
//!
//! Per-client admission control built from continuous token buckets.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Policies and registry housekeeping settings)
//!     ├── core.rs         (Single-key token bucket)
//!     ├── manager.rs      (Concurrent key → bucket registry, sweeper)
//!     ├── metrics.rs      (Admission decisions and registry stats)
//!     └── policy.rs       (Named limiters: default and auth)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Client key (source address)
//!          │
//!          ▼
//!     ┌──────────┐
//!     │ Policy   │ ◄── "default" or "auth", one registry each
//!     └────┬─────┘
//!          │
//!          ▼
//!     ┌──────────┐
//!     │ Manager  │ ◄── lookup-or-create, idle eviction
//!     └────┬─────┘
//!          │
//!          ▼
//!     ┌──────────┐
//!     │  Core    │ ◄── refill, then consume one token
//!     └────┬─────┘
//!          │
//!          ▼
//!     ┌──────────┐
//!     │ Metrics  │ ◄── Decision { allowed, limit, remaining, reset_after }
//!     └──────────┘
//! ```

mod config;
mod core;
mod manager;
mod metrics;
mod policy;

/// Policies, housekeeping settings and their reference values
pub use config::{
    RateLimitPolicy, RegistryConfig, AUTH_BURST, AUTH_REQUESTS_PER_SECOND, DEFAULT_BURST,
    DEFAULT_IDLE_THRESHOLD, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_SWEEP_INTERVAL,
};

/// Single-key token bucket
pub use core::TokenBucket;

/// Concurrent bucket registry and its background sweeper
pub use manager::{BucketRegistry, SweeperHandle};

/// Admission outcomes and registry statistics
pub use metrics::{Decision, RegistryStats};

/// Named limiters
pub use policy::{Limiters, RateLimiter};
