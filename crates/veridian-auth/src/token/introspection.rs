//! Token introspection (RFC 7662).
//!
//! Resource servers post a token and get back its active state plus
//! metadata. Inactive tokens answer `{"active": false}` with no
//! further detail - never why (expired vs revoked vs unknown).

use serde::{Deserialize, Serialize};

/// Token introspection request per RFC 7662.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionRequest {
    /// The token to introspect.
    pub token: String,

    /// Optional hint about the token type ("access_token" or
    /// "refresh_token"). The server identifies the type itself when
    /// the hint is absent or wrong.
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

/// Token introspection response per RFC 7662.
///
/// For inactive tokens, only `active: false` is serialized.
#[derive(Debug, Clone, Serialize, Default)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active. The only required field.
    pub active: bool,

    /// Issuer of the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Intended audience(s).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,

    /// Issued at (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration time (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// JWT ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Granted scopes (space-separated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Token type ("Bearer").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    /// The response for any inactive, unknown, or malformed token.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Builds an active response from verified access token claims.
    #[must_use]
    pub fn from_access_claims(claims: &crate::token::jwt::AccessTokenClaims) -> Self {
        Self {
            active: true,
            iss: Some(claims.iss.clone()),
            sub: Some(claims.sub.clone()),
            aud: Some(claims.aud.clone()),
            iat: Some(claims.iat),
            exp: Some(claims.exp),
            jti: Some(claims.jti.clone()),
            scope: Some(claims.scope.clone()),
            client_id: Some(claims.client_id.clone()),
            token_type: Some("Bearer".to_string()),
        }
    }
}
