//! Authorization codes.
//!
//! An authorization code is minted after interactive login and consent,
//! bound to the requesting client, redirect URI, and PKCE challenge,
//! and consumed exactly once by the token exchange.
//!
//! # Security
//!
//! - Codes are 256-bit random values
//! - Short-lived (5 minutes by default)
//! - Single-use: a second consumption attempt is an error, never a
//!   silent no-op

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// An authorization code record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCode {
    /// Unique record identifier.
    pub id: Uuid,

    /// The code value handed to the client (one-time use).
    pub code: String,

    /// Client the code was issued to. The exchange must present the
    /// same client.
    pub client_id: String,

    /// Redirect URI from the authorization request. The exchange must
    /// present the exact same URI (prevents code substitution).
    pub redirect_uri: String,

    /// PKCE code challenge (S256 of the client's verifier).
    pub code_challenge: String,

    /// PKCE challenge method (always "S256").
    pub code_challenge_method: String,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Authenticated subject (user) the code represents.
    pub subject_id: Uuid,

    /// Tenant (organization) scope of the login.
    pub organization_id: Uuid,

    /// OpenID Connect nonce, echoed into the ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// When the code was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the code expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the code was exchanged. None until consumed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub used_at: Option<OffsetDateTime>,
}

impl AuthorizationCode {
    /// Generates a new cryptographically secure code value.
    ///
    /// 256 bits of entropy, base64url-encoded without padding
    /// (43 characters).
    #[must_use]
    pub fn generate_code() -> String {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Returns `true` if the code has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if the code has been consumed.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Returns `true` if the code can still be exchanged.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_code(
        expires_at: OffsetDateTime,
        used_at: Option<OffsetDateTime>,
    ) -> AuthorizationCode {
        let now = OffsetDateTime::now_utc();
        AuthorizationCode {
            id: Uuid::new_v4(),
            code: AuthorizationCode::generate_code(),
            client_id: "web-app".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            code_challenge_method: "S256".to_string(),
            scope: "openid offline_access".to_string(),
            subject_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            nonce: None,
            created_at: now,
            expires_at,
            used_at,
        }
    }

    #[test]
    fn test_generate_code_shape() {
        let code = AuthorizationCode::generate_code();
        assert_eq!(code.len(), 43);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_code_uniqueness() {
        let codes: Vec<String> = (0..100)
            .map(|_| AuthorizationCode::generate_code())
            .collect();
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(codes.len(), unique.len());
    }

    #[test]
    fn test_validity_states() {
        let now = OffsetDateTime::now_utc();

        let code = test_code(now + Duration::minutes(5), None);
        assert!(code.is_valid());

        let code = test_code(now - Duration::seconds(1), None);
        assert!(code.is_expired());
        assert!(!code.is_valid());

        let code = test_code(now + Duration::minutes(5), Some(now));
        assert!(code.is_used());
        assert!(!code.is_valid());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let code = test_code(OffsetDateTime::now_utc() + Duration::minutes(5), None);
        let json = serde_json::to_string(&code).unwrap();
        let deserialized: AuthorizationCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code.id, deserialized.id);
        assert_eq!(code.code, deserialized.code);
        assert_eq!(code.code_challenge, deserialized.code_challenge);
    }
}
