//! Verified identity payload and its wire form.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity carried by a validated token.
///
/// Only [`TokenService`](crate::TokenService) constructs these: at issuance
/// from its own clock, and at validation from a payload whose signature has
/// already been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Authenticated identity. Always greater than zero.
    pub subject_id: i64,

    /// Human-readable label (the account email). Informational only; do not
    /// authorize on it.
    pub subject_label: String,

    /// Issuance time, epoch milliseconds.
    pub issued_at_ms: u64,

    /// Expiry time, epoch milliseconds. Strictly after `issued_at_ms`.
    pub expires_at_ms: u64,
}

impl Claims {
    /// Total validity window.
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(self.issued_at_ms))
    }

    /// Whether the token is expired at `now_ms`. Expiry is inclusive.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Time left before expiry as of `now_ms`.
    pub fn remaining_at(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(now_ms))
    }
}

/// JSON payload as signed into the token.
///
/// `iat`, `nbf` and `exp` are Unix epoch *milliseconds*, not the seconds
/// RFC 7519 specifies, so standard JWT libraries will misread these tokens.
/// Only [`TokenCodec`](super::TokenCodec) should decode them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Payload {
    pub(crate) user_id: i64,
    pub(crate) email: String,
    pub(crate) iss: String,
    pub(crate) sub: String,
    pub(crate) aud: String,
    pub(crate) iat: u64,
    pub(crate) nbf: u64,
    pub(crate) exp: u64,
}

impl Payload {
    pub(crate) fn new(claims: &Claims, issuer: &str, audience: &str) -> Self {
        Self {
            user_id: claims.subject_id,
            email: claims.subject_label.clone(),
            iss: issuer.to_owned(),
            sub: claims.subject_label.clone(),
            aud: audience.to_owned(),
            iat: claims.issued_at_ms,
            nbf: claims.issued_at_ms,
            exp: claims.expires_at_ms,
        }
    }

    pub(crate) fn into_claims(self) -> Claims {
        Claims {
            subject_id: self.user_id,
            subject_label: self.email,
            issued_at_ms: self.iat,
            expires_at_ms: self.exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            subject_id: 7,
            subject_label: "reader@example.com".into(),
            issued_at_ms: 1_000,
            expires_at_ms: 4_000,
        }
    }

    #[test]
    fn test_lifetime_and_expiry() {
        let claims = claims();
        assert_eq!(claims.lifetime(), Duration::from_secs(3));
        assert!(!claims.is_expired_at(3_999));
        assert!(claims.is_expired_at(4_000));
        assert_eq!(claims.remaining_at(3_500), Duration::from_millis(500));
        assert_eq!(claims.remaining_at(9_000), Duration::ZERO);
    }

    #[test]
    fn test_payload_field_names() {
        let payload = Payload::new(&claims(), "blog-platform", "blog-platform-api");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["user_id"], 7);
        assert_eq!(json["email"], "reader@example.com");
        assert_eq!(json["sub"], "reader@example.com");
        assert_eq!(json["iss"], "blog-platform");
        assert_eq!(json["aud"], "blog-platform-api");
        assert_eq!(json["nbf"], json["iat"]);

        assert_eq!(payload.into_claims(), claims());
    }
}
