//! # Request Gate
//!
//! The contracts between the core and an HTTP layer, expressed with the
//! [`http`] crate's types so any server framework can plug them in:
//!
//! ```text
//!     request ──► check_rate_limit(limiter, client_addr)
//!                   │ denied ──► 429 + X-RateLimit-* + Retry-After
//!                   ▼ allowed (X-RateLimit-Limit / -Remaining to add)
//!                 require_auth(service, headers)
//!                   │ missing / malformed header ──► 401 (token service never called)
//!                   │ invalid / expired token    ──► 401 "invalid or expired token"
//!                   ▼
//!                 Claims ──► business logic
//! ```
//!
//! Everything here is synchronous and allocation-light; nothing blocks.

use http::header::{HeaderName, AUTHORIZATION, RETRY_AFTER, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, StatusCode};
use thiserror::Error;
use tracing::warn;

use crate::error::{BearerError, RateLimitExceeded, TokenError};
use crate::rate_limiter::{Decision, RateLimiter};
use crate::token::{Claims, TokenService};

/// Sustained limit of the policy, in requests per second.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Whole tokens left for the client (a hint, not a quota).
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// UNIX seconds at which the next token is available (denials only).
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const BEARER_PREFIX: &str = "Bearer ";

/// Message returned when the `Authorization` header is unusable.
pub const BAD_HEADER_MESSAGE: &str = "missing or invalid authorization header";

/// Message returned for a rate-limit denial.
pub const RATE_LIMITED_MESSAGE: &str = "rate limit exceeded";

/// Why a request was stopped at the gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// Denied by a rate limiter.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// No usable bearer token in the request.
    #[error(transparent)]
    Bearer(#[from] BearerError),

    /// The token service refused the token.
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl Rejection {
    /// Status code for the response.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Bearer(_) => StatusCode::UNAUTHORIZED,
            Self::Token(err) if err.is_configuration_error() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Token(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Body message for the response. Never reveals why a token failed.
    pub fn public_message(&self) -> String {
        match self {
            Self::RateLimited(_) => RATE_LIMITED_MESSAGE.to_string(),
            Self::Bearer(_) => BAD_HEADER_MESSAGE.to_string(),
            Self::Token(err) if err.is_configuration_error() => "internal server error".to_string(),
            Self::Token(err) => err.public_message(),
        }
    }

    /// Headers for the response, as of `now_ms`.
    pub fn headers(&self, now_ms: u64) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            Self::RateLimited(exceeded) => {
                apply_rate_limit_headers(&mut headers, &exceeded.decision, now_ms);
            }
            Self::Bearer(_) => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Self::Token(err) if err.is_verification_error() => {
                headers.insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer error=\"invalid_token\""),
                );
            }
            Self::Token(_) => {}
        }
        headers
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
///
/// ```rust
/// use warden::gate::extract_bearer;
/// use warden::BearerError;
///
/// assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
/// assert_eq!(extract_bearer(None), Err(BearerError::MissingHeader));
/// assert_eq!(extract_bearer(Some("Basic dXNlcg==")), Err(BearerError::InvalidScheme));
/// assert_eq!(extract_bearer(Some("Bearer ")), Err(BearerError::EmptyToken));
/// ```
pub fn extract_bearer(header: Option<&str>) -> Result<&str, BearerError> {
    let header = match header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(BearerError::MissingHeader),
    };

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(BearerError::InvalidScheme)?
        .trim();

    if token.is_empty() {
        return Err(BearerError::EmptyToken);
    }
    Ok(token)
}

/// [`extract_bearer`] over a header map. A non-ASCII header value counts as
/// a malformed scheme.
pub fn bearer_from_headers(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = match headers.get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| BearerError::InvalidScheme)?),
        None => None,
    };
    extract_bearer(value)
}

/// The bearer token if one is present and well-formed, `None` otherwise.
pub fn optional_bearer(headers: &HeaderMap) -> Option<&str> {
    bearer_from_headers(headers).ok()
}

/// Validates the request's bearer token.
///
/// Header problems are rejected here without calling the token service.
pub fn require_auth(service: &TokenService, headers: &HeaderMap) -> Result<Claims, Rejection> {
    let token = bearer_from_headers(headers).map_err(|err| {
        warn!(reason = %err, "Rejected authorization header");
        err
    })?;
    Ok(service.validate(token)?)
}

/// Claims for a request that carries a valid token; `None` for a missing,
/// malformed, invalid or expired one. The request proceeds either way.
pub fn optional_auth(service: &TokenService, headers: &HeaderMap) -> Option<Claims> {
    optional_bearer(headers).and_then(|token| service.validate(token).ok())
}

/// Runs the admission check for `key`.
///
/// On success returns the `X-RateLimit-Limit` / `X-RateLimit-Remaining`
/// headers to add to the eventual response.
pub fn check_rate_limit(limiter: &RateLimiter, key: &str) -> Result<HeaderMap, Rejection> {
    let decision = limiter.check(key).into_result()?;
    let mut headers = HeaderMap::new();
    apply_rate_limit_headers(&mut headers, &decision, limiter.registry().now_ms());
    Ok(headers)
}

/// Writes the throttling headers for `decision`.
///
/// `X-RateLimit-Limit` and `X-RateLimit-Remaining` are always set; a denial
/// also gets `X-RateLimit-Reset` and `Retry-After`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision, now_ms: u64) {
    // f64 Display prints 10.0 as "10" and 0.5 as "0.5"
    if let Ok(limit) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert(X_RATELIMIT_LIMIT, limit);
    }
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));

    if !decision.allowed {
        headers.insert(
            X_RATELIMIT_RESET,
            HeaderValue::from(decision.reset_at_unix_secs(now_ms)),
        );
        headers.insert(RETRY_AFTER, HeaderValue::from(decision.retry_after_secs()));
    }
}
