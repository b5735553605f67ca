//! # Token Service
//!
//! Issues, validates and refreshes signed tokens. Stateless: nothing about
//! issued tokens is remembered, so a token stays valid until its own expiry
//! even after it has been refreshed.
//!
//! ```text
//!     issue ──► Issued ──(nbf ≤ now < exp, signature ok)──► Valid ──(now ≥ exp)──► Expired
//!                                                              │
//!                                         refresh ◄────────────┘  (new token, fresh iat/exp)
//!
//!     Tampered / Malformed ──► rejected at validate, never Valid
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::claims::Claims;
use super::codec::{TokenCodec, DEFAULT_AUDIENCE, DEFAULT_ISSUER};
use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;

/// Standard token lifetime used by [`TokenService::issue_standard`] and
/// [`TokenService::refresh`] (two hours).
pub const DEFAULT_TOKEN_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Longest standard lifetime a [`TokenServiceBuilder`] accepts (one year).
pub const MAX_TOKEN_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Issues and verifies signed tokens.
///
/// Cheap to clone; clones share the key and clock.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use warden::TokenService;
///
/// let service = TokenService::new("change-me").unwrap();
///
/// let token = service.issue(42, "a@b.com", Duration::from_secs(24 * 3600)).unwrap();
/// let claims = service.validate(&token).unwrap();
///
/// assert_eq!(claims.subject_id, 42);
/// assert_eq!(claims.subject_label, "a@b.com");
/// assert_eq!(claims.lifetime(), Duration::from_secs(24 * 3600));
/// ```
#[derive(Debug, Clone)]
pub struct TokenService {
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    standard_duration: Duration,
}

impl TokenService {
    /// Creates a service with the default issuer, audience, standard
    /// duration and the system clock.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidSigningKey`] if `secret` is empty, so that a
    /// misconfigured service fails at startup rather than per request.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        Self::builder(secret).build()
    }

    /// Starts building a service with non-default settings.
    pub fn builder(secret: impl AsRef<[u8]>) -> TokenServiceBuilder {
        TokenServiceBuilder::new(secret)
    }

    /// Issues a token for `subject_id` valid for `duration` from now.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InvalidSubject`]: `subject_id <= 0`
    /// - [`TokenError::InvalidLabel`]: empty `subject_label`
    /// - [`TokenError::InvalidDuration`]: `duration` shorter than one
    ///   millisecond, or too long to represent
    /// - [`TokenError::InvalidSigningKey`]: empty key
    pub fn issue(
        &self,
        subject_id: i64,
        subject_label: &str,
        duration: Duration,
    ) -> Result<String, TokenError> {
        if subject_id <= 0 {
            return Err(TokenError::InvalidSubject);
        }
        if subject_label.is_empty() {
            return Err(TokenError::InvalidLabel);
        }
        let duration_ms = u64::try_from(duration.as_millis())
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(TokenError::InvalidDuration)?;

        let now_ms = self.clock.now_ms();
        let expires_at_ms = now_ms
            .checked_add(duration_ms)
            .ok_or(TokenError::InvalidDuration)?;

        let claims = Claims {
            subject_id,
            subject_label: subject_label.to_owned(),
            issued_at_ms: now_ms,
            expires_at_ms,
        };
        let token = self.codec.encode(&claims)?;

        debug!(subject_id, expires_at_ms, "Issued token");
        Ok(token)
    }

    /// Issues a token with the service's standard duration.
    pub fn issue_standard(
        &self,
        subject_id: i64,
        subject_label: &str,
    ) -> Result<String, TokenError> {
        self.issue(subject_id, subject_label, self.standard_duration)
    }

    /// Verifies `token` and returns its claims.
    ///
    /// Failures are logged with their kind, so expiry and tampering stay
    /// distinguishable internally; present them to users through
    /// [`TokenError::public_message`].
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        match self.codec.decode(token, self.clock.now_ms()) {
            Ok(claims) => {
                debug!(subject_id = claims.subject_id, "Validated token");
                Ok(claims)
            }
            Err(err) => {
                warn!(kind = err.kind(), "Token validation failed");
                Err(err)
            }
        }
    }

    /// Exchanges a valid token for a new one with a fresh issuance time and
    /// the standard duration.
    ///
    /// Fails exactly as [`validate`](Self::validate) would; an expired token
    /// cannot be refreshed. The old token is not revoked.
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.validate(token)?;
        self.issue_standard(claims.subject_id, &claims.subject_label)
    }

    /// Lifetime of tokens from [`issue_standard`](Self::issue_standard) and
    /// [`refresh`](Self::refresh).
    pub fn standard_duration(&self) -> Duration {
        self.standard_duration
    }

    /// The underlying codec.
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}

/// Builder for [`TokenService`].
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use warden::{ManualClock, TokenService};
///
/// let clock = ManualClock::new(1_700_000_000_000);
/// let service = TokenService::builder("change-me")
///     .issuer("my-app")
///     .audience("my-app-api")
///     .standard_duration(Duration::from_secs(900))
///     .clock(Arc::new(clock.clone()))
///     .build()
///     .unwrap();
///
/// let token = service.issue_standard(7, "reader@example.com").unwrap();
/// assert_eq!(service.validate(&token).unwrap().expires_at_ms, 1_700_000_900_000);
///
/// // Empty secrets are rejected up front
/// assert!(TokenService::builder("").build().is_err());
/// ```
pub struct TokenServiceBuilder {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
    standard_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenServiceBuilder {
    fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            issuer: DEFAULT_ISSUER.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            standard_duration: DEFAULT_TOKEN_DURATION,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the `iss` claim.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Sets the `aud` claim.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Sets the lifetime used by `issue_standard` and `refresh`.
    pub fn standard_duration(mut self, duration: Duration) -> Self {
        self.standard_duration = duration;
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InvalidSigningKey`]: empty secret
    /// - [`TokenError::InvalidDuration`]: standard duration under 1ms or
    ///   over [`MAX_TOKEN_DURATION`]
    pub fn build(self) -> Result<TokenService, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::InvalidSigningKey);
        }
        if self.standard_duration.as_millis() == 0 || self.standard_duration > MAX_TOKEN_DURATION {
            return Err(TokenError::InvalidDuration);
        }

        Ok(TokenService {
            codec: TokenCodec::new(&self.secret, &self.issuer, &self.audience),
            clock: self.clock,
            standard_duration: self.standard_duration,
        })
    }
}

impl fmt::Debug for TokenServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenServiceBuilder")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("standard_duration", &self.standard_duration)
            .finish()
    }
}
