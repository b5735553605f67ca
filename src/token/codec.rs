//! # Token Codec
//!
//! Compact JWS with HMAC-SHA256 (`HS256`):
//!
//! ```text
//!     base64url(header) . base64url(payload) . base64url(HMAC-SHA256(key, header.payload))
//!     └──── {"alg":"HS256","typ":"JWT"}
//!                         └──── {"user_id":42,"email":"a@b.com","iss":..,"aud":..,"iat":..,"nbf":..,"exp":..}
//! ```
//!
//! Verification order matters: the signature is checked before any payload
//! field is looked at, so nothing unverified ever reaches a caller.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize};
use sha2::Sha256;

use super::claims::{Claims, Payload};
use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// The only accepted signing algorithm.
pub const ALGORITHM: &str = "HS256";

/// Default `iss` claim.
pub const DEFAULT_ISSUER: &str = "blog-platform";

/// Default `aud` claim.
pub const DEFAULT_AUDIENCE: &str = "blog-platform-api";

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Symmetric-key signer and verifier.
///
/// Holds no mutable state; clones share the key.
///
/// ```rust
/// use warden::{Claims, TokenCodec};
///
/// let codec = TokenCodec::new("secret", "blog-platform", "blog-platform-api");
/// let claims = Claims {
///     subject_id: 42,
///     subject_label: "a@b.com".into(),
///     issued_at_ms: 1_000,
///     expires_at_ms: 61_000,
/// };
///
/// let token = codec.encode(&claims).unwrap();
/// assert_eq!(codec.decode(&token, 30_000).unwrap(), claims);
/// ```
#[derive(Clone)]
pub struct TokenCodec {
    key: Arc<[u8]>,
    issuer: Arc<str>,
    audience: Arc<str>,
}

impl TokenCodec {
    /// Creates a codec. An empty key is accepted here but every
    /// [`encode`](Self::encode) and [`decode`](Self::decode) call then fails
    /// with [`TokenError::InvalidSigningKey`].
    pub fn new(key: impl AsRef<[u8]>, issuer: &str, audience: &str) -> Self {
        Self {
            key: Arc::from(key.as_ref()),
            issuer: Arc::from(issuer),
            audience: Arc::from(audience),
        }
    }

    /// Whether a non-empty signing key is configured.
    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }

    /// Issuer written into and required from every token.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audience written into and required from every token.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Serializes and signs `claims`.
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        let payload = Payload::new(claims, &self.issuer, &self.audience);
        let payload_json =
            serde_json::to_vec(&payload).map_err(|_| TokenError::InvalidToken)?;

        let mut token = String::with_capacity(256);
        token.push_str(&URL_SAFE_NO_PAD.encode(HEADER_JSON));
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(payload_json));

        let signature = self.sign(token.as_bytes())?;
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(signature));

        Ok(token)
    }

    /// Parses and verifies `token` as of `now_ms`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::EmptyToken`]: `token` is empty
    /// - [`TokenError::InvalidSigningKey`]: the codec key is empty
    /// - [`TokenError::InvalidToken`]: malformed, wrong algorithm, bad
    ///   signature, wrong issuer or audience, or not yet valid
    /// - [`TokenError::ExpiredToken`]: authentic but `now_ms >= exp`
    pub fn decode(&self, token: &str, now_ms: u64) -> Result<Claims, TokenError> {
        if token.is_empty() {
            return Err(TokenError::EmptyToken);
        }
        if !self.has_key() {
            return Err(TokenError::InvalidSigningKey);
        }

        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(TokenError::InvalidToken),
            };

        // Reject algorithm confusion before touching the signature
        let header: Header = decode_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::InvalidToken);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidToken)?;
        let signed_len = header_b64.len() + 1 + payload_b64.len();
        let mut mac = self.mac()?;
        mac.update(&token.as_bytes()[..signed_len]);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidToken)?;

        let payload: Payload = decode_json(payload_b64)?;
        if payload.iss != *self.issuer || payload.aud != *self.audience {
            return Err(TokenError::InvalidToken);
        }
        if payload.nbf > now_ms || payload.exp <= payload.iat || payload.user_id <= 0 {
            return Err(TokenError::InvalidToken);
        }
        if now_ms >= payload.exp {
            return Err(TokenError::ExpiredToken);
        }

        Ok(payload.into_claims())
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        if !self.has_key() {
            return Err(TokenError::InvalidSigningKey);
        }
        HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::InvalidSigningKey)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.mac()?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::InvalidToken)
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}
