//! # Token Module
//!
//! Stateless credentials: a signed token carries the caller's identity, and
//! any holder of the shared secret can verify it without a session store.
//!
//! ```text
//!     token/
//!     ├── mod.rs          (You are here)
//!     ├── claims.rs       (Verified identity and its wire payload)
//!     ├── codec.rs        (HS256 compact JWS sign / verify)
//!     └── service.rs      (issue / validate / refresh)
//! ```

mod claims;
mod codec;
mod service;

/// Verified identity payload
pub use claims::Claims;

/// HS256 signer / verifier and its registered-claim defaults
pub use codec::{TokenCodec, ALGORITHM, DEFAULT_AUDIENCE, DEFAULT_ISSUER};

/// Issue / validate / refresh orchestration
pub use service::{
    TokenService, TokenServiceBuilder, DEFAULT_TOKEN_DURATION, MAX_TOKEN_DURATION,
};
