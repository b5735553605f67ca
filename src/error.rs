//! Error types for admission and credential operations.
//!
//! Every failure is an explicit, typed value. Nothing on a request path
//! panics: a panic inside a per-request check would take down the worker
//! thread serving it.
//!
//! | Type | Kind | Recoverable by |
//! |------|------|----------------|
//! | [`RateLimitExceeded`] | admission | waiting (see the decision's reset hint) |
//! | [`TokenError`] | credential | fixing the input, or the service configuration |
//! | [`BearerError`] | transport | sending a well-formed `Authorization` header |
//! | [`ConfigError`] | configuration | fixing settings before startup |

use thiserror::Error;

use crate::rate_limiter::Decision;

/// Message shown to end users for any token verification failure.
///
/// Expired, tampered and wrong-key tokens all present identically so that a
/// client cannot probe which check failed.
pub const PUBLIC_TOKEN_MESSAGE: &str = "invalid or expired token";

/// Failures of the token service and codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TokenError {
    /// The token string was empty.
    #[error("empty token")]
    EmptyToken,

    /// The signing key is empty. This is a service misconfiguration.
    #[error("invalid signing key")]
    InvalidSigningKey,

    /// Subject id must be strictly positive.
    #[error("invalid subject id")]
    InvalidSubject,

    /// Subject label must be non-empty.
    #[error("invalid subject label")]
    InvalidLabel,

    /// Token lifetime must be strictly positive.
    #[error("invalid token duration")]
    InvalidDuration,

    /// Malformed, tampered, signed with another key or another algorithm,
    /// or issued for another issuer/audience.
    #[error("invalid token")]
    InvalidToken,

    /// Signature verified but the token is past its expiry.
    #[error("token expired")]
    ExpiredToken,
}

impl TokenError {
    /// Whether the caller can fix this by changing its arguments.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyToken | Self::InvalidSubject | Self::InvalidLabel | Self::InvalidDuration
        )
    }

    /// Whether this points at a misconfigured service rather than bad input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidSigningKey)
    }

    /// Whether the token itself was rejected by verification.
    pub fn is_verification_error(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::ExpiredToken)
    }

    /// Stable short name, suitable as a log field or metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyToken => "empty_token",
            Self::InvalidSigningKey => "invalid_signing_key",
            Self::InvalidSubject => "invalid_subject",
            Self::InvalidLabel => "invalid_label",
            Self::InvalidDuration => "invalid_duration",
            Self::InvalidToken => "invalid_token",
            Self::ExpiredToken => "expired_token",
        }
    }

    /// The message to surface to an end user.
    ///
    /// Verification failures collapse to [`PUBLIC_TOKEN_MESSAGE`]; input
    /// errors keep their own description.
    pub fn public_message(&self) -> String {
        match self {
            Self::EmptyToken | Self::InvalidToken | Self::ExpiredToken => {
                PUBLIC_TOKEN_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Failures extracting a bearer token from an `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BearerError {
    /// No `Authorization` header at all.
    #[error("authorization header required")]
    MissingHeader,

    /// A header is present but is not `Bearer <token>`.
    #[error("invalid authorization header format")]
    InvalidScheme,

    /// `Bearer ` followed by nothing.
    #[error("bearer token required")]
    EmptyToken,
}

/// Invalid or missing configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: &'static str },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

/// A request was denied by the rate limiter.
///
/// Not a fault: the caller should stop processing and answer with 429,
/// using the carried [`Decision`] for the throttling headers.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rate limit exceeded, retry in {}ms", .decision.reset_after.as_millis())]
pub struct RateLimitExceeded {
    /// The denial, with the limit and reset hint for the response headers.
    pub decision: Decision,
}
