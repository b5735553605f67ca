//! # Warden - Request Admission and Credential Lifecycle
//!
//! The two pieces of an HTTP backend that guard every request before any
//! business logic runs:
//!
//! - a **per-client rate limiter** that bounds sustained throughput while
//!   tolerating short bursts, and
//! - a **signed-token service** that issues, verifies and refreshes
//!   short-lived proofs of identity without server-side sessions.
//!
//! Both share one hard problem: mutable, time-decaying state touched by many
//! simultaneous requests.
//!
//! ## The Token Bucket Algorithm
//!
//! ```text
//!     Token Bucket Visualization (capacity 5, refill 1/s):
//!
//!     Time 0.0s:  [🪙🪙🪙🪙🪙] 5.0 tokens
//!     Request 1:  [🪙🪙🪙🪙  ] ✅ takes 1
//!     Request 2:  [🪙🪙🪙    ] ✅ takes 1
//!     Time 1.5s:  [🪙🪙🪙🪙◐ ] 4.5 tokens (continuous refill)
//!     Request 3:  [🪙🪙🪙◐   ] ✅ takes 1
//! ```
//!
//! - **Tokens** = permission to make a request
//! - **Capacity** = largest burst tolerated
//! - **Refill** = continuous, real-valued; no fixed windows
//!
//! ## Quick Start
//!
//! ### Admission
//!
//! ```rust
//! use warden::Limiters;
//!
//! // default: 10 req/s burst 20; auth: 2 req/s burst 5
//! let limiters = Limiters::standard().unwrap();
//!
//! let decision = limiters.auth.check("203.0.113.7");
//! if decision.allowed {
//!     // handle login
//! } else {
//!     // 429, retry after decision.reset_after
//! }
//! ```
//!
//! ### Credentials
//!
//! ```rust
//! use std::time::Duration;
//! use warden::{TokenError, TokenService};
//!
//! let service = TokenService::new("change-me").unwrap();
//! let token = service.issue(42, "a@b.com", Duration::from_secs(3600)).unwrap();
//!
//! let claims = service.validate(&token).unwrap();
//! assert_eq!(claims.subject_id, 42);
//!
//! let other = TokenService::new("another-secret").unwrap();
//! assert_eq!(other.validate(&token), Err(TokenError::InvalidToken));
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   HTTP layer (yours)    │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │          gate           │
//!                    ├─────────────────────────┤
//!                    │ • check_rate_limit()    │
//!                    │ • require_auth()        │
//!                    │ • X-RateLimit-* headers │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │   Rate Limiters     │       │   Token Service      │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • default / auth    │       │ • issue / validate   │
//!     │ • per-key buckets   │       │ • refresh            │
//!     │ • idle sweeper      │       │ • HS256 codec        │
//!     └──────────┬──────────┘       └───────────┬──────────┘
//!                │                              │
//!                └──────────────┬───────────────┘
//!                               ▼
//!                         Clock (injected)
//! ```
//!
//! ## Thread Safety
//!
//! Every public type is `Send + Sync` and cheap to clone; clones share
//! state. Checks for the same client key are linearizable. The token service
//! holds no mutable state at all.
//!
//! ## Testing With Time
//!
//! All time flows through [`Clock`]. Hand a [`ManualClock`] to a registry or
//! token service to drive refill, eviction and expiry without sleeping.
//!
//! ## Examples
//!
//! See the `demos/` directory:
//! - `basic.rs` - admission and tokens end to end
//! - `gate.rs` - simulated requests through the gate with logging

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

mod clock;
mod error;
pub mod gate;
mod rate_limiter;
mod settings;
mod token;

// Public re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BearerError, ConfigError, RateLimitExceeded, TokenError, PUBLIC_TOKEN_MESSAGE};
pub use rate_limiter::{
    BucketRegistry, Decision, Limiters, RateLimitPolicy, RateLimiter, RegistryConfig,
    RegistryStats, SweeperHandle, TokenBucket, AUTH_BURST, AUTH_REQUESTS_PER_SECOND,
    DEFAULT_BURST, DEFAULT_IDLE_THRESHOLD, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_SWEEP_INTERVAL,
};
pub use settings::{ConfigSource, EnvSource, Settings};
pub use token::{
    Claims, TokenCodec, TokenService, TokenServiceBuilder, ALGORITHM, DEFAULT_AUDIENCE,
    DEFAULT_ISSUER, DEFAULT_TOKEN_DURATION, MAX_TOKEN_DURATION,
};

/// A token service wrapped in `Arc` for sharing across request handlers.
pub type SharedTokenService = std::sync::Arc<TokenService>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
///
/// ```rust
/// use warden::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for a service wiring admission and authentication.
    //!
    //! # Example
    //! ```rust
    //! use warden::prelude::*;
    //!
    //! let limiters = Limiters::standard().unwrap();
    //! let service = TokenService::new("change-me").unwrap();
    //! let policy = RateLimitPolicy::auth();
    //! ```

    pub use crate::gate::{check_rate_limit, optional_auth, require_auth, Rejection};
    pub use crate::{
        Claims, Clock, Decision, Limiters, RateLimitPolicy, RateLimiter, Settings,
        SharedTokenService, SystemClock, TokenError, TokenService,
    };
}
