//! Refresh token family records.
//!
//! Refresh tokens are the durable anchor of a login session. Every
//! token belongs to a family descending from one original login; the
//! family is the unit of revocation when reuse is detected.
//!
//! # Security
//!
//! - Token values are stored as SHA-256 hashes, never plaintext
//! - Presenting a non-ACTIVE token revokes the whole family
//! - State transitions are conditional updates at the storage layer

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::subject::Subject;

/// Lifecycle state of a refresh token.
///
/// Transitions: ACTIVE → ROTATED (superseded, family still valid) and
/// ACTIVE/ROTATED → REVOKED (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenStatus {
    /// The current token of its family; may be presented for refresh.
    Active,
    /// Superseded by a rotation. Presenting it is treated as reuse.
    Rotated,
    /// Terminally revoked.
    Revoked,
}

impl RefreshTokenStatus {
    /// Returns the status as a stable string for audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rotated => "rotated",
            Self::Revoked => "revoked",
        }
    }
}

/// Why a token (or its family) was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    /// A rotated or revoked family member was presented again.
    ReuseDetected,
    /// The client asked for revocation (RFC 7009).
    ClientRequest,
    /// An operator or security process revoked the session.
    Administrative,
}

impl RevokeReason {
    /// Returns the reason as a stable string for audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReuseDetected => "reuse_detected",
            Self::ClientRequest => "client_request",
            Self::Administrative => "administrative",
        }
    }
}

/// A refresh token record as persisted by the ledger.
///
/// The token value itself is returned to the client exactly once and
/// only its SHA-256 hash is stored, so a storage dump cannot be
/// replayed against the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Unique identifier for this token record.
    pub id: Uuid,

    /// Family this token belongs to. All tokens descending from one
    /// login share a family id and are revoked together.
    pub family_id: Uuid,

    /// SHA-256 hash of the token value handed to the client.
    pub token_hash: String,

    /// Client this token was issued to.
    pub client_id: String,

    /// The principal behind the session.
    pub subject: Subject,

    /// Tenant (organization) scope of the session.
    pub organization_id: Uuid,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Lifecycle state.
    pub status: RefreshTokenStatus,

    /// When this token record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this token was last presented successfully.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_seen_at: Option<OffsetDateTime>,

    /// When this token was revoked, if ever.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// Why this token was revoked, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoke_reason: Option<RevokeReason>,
}

impl RefreshToken {
    /// Returns `true` if this token's `expires_at` has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if this token is the ACTIVE member of its family.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RefreshTokenStatus::Active
    }

    /// Returns `true` if this token may be presented for refresh right
    /// now: ACTIVE and not expired.
    #[must_use]
    pub fn is_presentable(&self) -> bool {
        self.is_active() && !self.is_expired()
    }

    /// Hash a token value for storage or lookup.
    #[must_use]
    pub fn hash_value(value: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a cryptographically secure random token value.
    ///
    /// 256 bits of entropy, base64url-encoded without padding
    /// (43 characters).
    #[must_use]
    pub fn generate_value() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_token(status: RefreshTokenStatus, expires_at: OffsetDateTime) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            token_hash: RefreshToken::hash_value("test-token"),
            client_id: "web-app".to_string(),
            subject: Subject::User(Uuid::new_v4()),
            organization_id: Uuid::new_v4(),
            scope: "openid offline_access".to_string(),
            status,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            last_seen_at: None,
            revoked_at: None,
            revoke_reason: None,
        }
    }

    #[test]
    fn test_hash_value_is_deterministic() {
        let hash = RefreshToken::hash_value("some-token");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, RefreshToken::hash_value("some-token"));
        assert_ne!(hash, RefreshToken::hash_value("other-token"));
    }

    #[test]
    fn test_generate_value_shape() {
        let value = RefreshToken::generate_value();
        assert_eq!(value.len(), 43);
        assert!(
            value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_value_uniqueness() {
        let values: Vec<String> = (0..100).map(|_| RefreshToken::generate_value()).collect();
        let mut unique = values.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(values.len(), unique.len());
    }

    #[test]
    fn test_is_presentable() {
        let now = OffsetDateTime::now_utc();

        let token = test_token(RefreshTokenStatus::Active, now + Duration::days(1));
        assert!(token.is_presentable());

        let token = test_token(RefreshTokenStatus::Active, now - Duration::minutes(1));
        assert!(!token.is_presentable());

        let token = test_token(RefreshTokenStatus::Rotated, now + Duration::days(1));
        assert!(!token.is_presentable());

        let token = test_token(RefreshTokenStatus::Revoked, now + Duration::days(1));
        assert!(!token.is_presentable());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RefreshTokenStatus::Active.as_str(), "active");
        assert_eq!(RefreshTokenStatus::Rotated.as_str(), "rotated");
        assert_eq!(RefreshTokenStatus::Revoked.as_str(), "revoked");
        assert_eq!(RevokeReason::ReuseDetected.as_str(), "reuse_detected");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let token = test_token(
            RefreshTokenStatus::Active,
            OffsetDateTime::now_utc() + Duration::days(30),
        );
        let json = serde_json::to_string(&token).unwrap();
        let deserialized: RefreshToken = serde_json::from_str(&json).unwrap();
        assert_eq!(token.id, deserialized.id);
        assert_eq!(token.family_id, deserialized.family_id);
        assert_eq!(token.status, deserialized.status);
        assert_eq!(token.subject, deserialized.subject);
    }
}
