//! Token endpoint wire types.
//!
//! Request parsing, response generation, and the OAuth error object
//! for `POST /oauth/token`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token request parameters.
///
/// One structure covers all grant types; field requirements depend on
/// `grant_type`:
///
/// - `authorization_code`: code, redirect_uri, code_verifier, client_id
/// - `refresh_token`: refresh_token
/// - `password`: username, password (first-party clients only)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// OAuth 2.0 grant type.
    pub grant_type: String,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI; must match the authorization request exactly.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (authorization_code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Client ID (public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post authentication).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh token (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope (must be within the original grant).
    #[serde(default)]
    pub scope: Option<String>,

    /// Username (password grant).
    #[serde(default)]
    pub username: Option<String>,

    /// Password (password grant).
    #[serde(default)]
    pub password: Option<String>,

    /// Verified CAPTCHA token, required once the subject crosses the
    /// CAPTCHA failure threshold.
    #[serde(default)]
    pub captcha_token: Option<String>,
}

/// Successful token response.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// The access token (JWT).
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Refresh token, when the grant carries a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token, when the `openid` scope was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Creates a new token response with required fields.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
            id_token: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    /// Sets the ID token.
    #[must_use]
    pub fn with_id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }
}

/// Token error response object.
#[derive(Debug, Clone, Serialize)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description. Omitted for security-gate
    /// errors where detail would aid an attacker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Correlation id for `server_error` responses, linking the
    /// generic response to the detailed audit record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl TokenError {
    /// Creates a new token error without description.
    #[must_use]
    pub fn new(error: TokenErrorCode) -> Self {
        Self {
            error,
            error_description: None,
            correlation_id: None,
        }
    }

    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            correlation_id: None,
        }
    }

    /// Attaches a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// OAuth 2.0 token error codes.
///
/// The RFC 6749 §5.2 set plus this provider's security-gate codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// Malformed or missing parameters.
    InvalidRequest,

    /// Client authentication failed.
    InvalidClient,

    /// The authorization grant is invalid, expired, consumed, or was
    /// issued to another client; also PKCE failures.
    InvalidGrant,

    /// The presented refresh token is unusable. Deliberately covers
    /// not-found, expired, rotated, revoked, and reuse without
    /// distinction.
    InvalidRefreshToken,

    /// The grant type is not supported or not allowed for the client.
    UnsupportedGrantType,

    /// The requested scope exceeds what the client may request.
    InvalidScope,

    /// The account is locked out.
    AccountLocked,

    /// A verified CAPTCHA token is required for this attempt.
    CaptchaRequired,

    /// The request must carry device-proof headers.
    DeviceProofRequired,

    /// The device proof failed verification.
    InvalidDeviceProof,

    /// A dependency failed; retry later. Carries a correlation id.
    ServerError,
}

impl TokenErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccountLocked => "account_locked",
            Self::CaptchaRequired => "captcha_required",
            Self::DeviceProofRequired => "device_proof_required",
            Self::InvalidDeviceProof => "invalid_device_proof",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::AccountLocked => 403,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::InvalidRefreshToken
            | Self::UnsupportedGrantType
            | Self::InvalidScope
            | Self::CaptchaRequired
            | Self::DeviceProofRequired
            | Self::InvalidDeviceProof => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
