//! Authentication and token issuance error types.
//!
//! This module defines all error types that can occur while issuing,
//! refreshing, introspecting, or revoking tokens.
//!
//! Security-gate errors (lockout, CAPTCHA, device proof, refresh reuse)
//! are deliberately coarse toward clients: the OAuth error code reveals
//! which gate fired, never why. The detailed reason belongs in the audit
//! trail only.

use std::fmt;

/// Errors that can occur during authentication and token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client credentials are invalid or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant is invalid, expired, consumed, or mismatched.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested scope is invalid, unknown, or exceeds the original grant.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The access token is invalid, malformed, or cannot be parsed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The presented refresh token is not usable.
    ///
    /// Covers not-found, expired, rotated, and revoked tokens as well as
    /// detected reuse. The `reason` records which sub-condition failed for
    /// the audit trail; it is never serialized into the HTTP response.
    #[error("Invalid refresh token")]
    InvalidRefreshToken {
        /// Internal reason, for audit only.
        reason: RefreshFailure,
    },

    /// The request lacks valid authentication credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The subject's account is locked out after repeated failures.
    #[error("Account locked")]
    AccountLocked,

    /// The attempt requires a verified CAPTCHA token before credentials
    /// will be compared.
    #[error("CAPTCHA required")]
    CaptchaRequired,

    /// The request is missing required device-proof headers.
    #[error("Device proof required")]
    DeviceProofRequired,

    /// The device proof failed verification.
    ///
    /// All four proof checks (window, replay, device status, signature)
    /// collapse into this one variant so the response never reveals which
    /// check rejected the proof.
    #[error("Invalid device proof")]
    InvalidDeviceProof,

    /// The access token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token has been explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// PKCE code verifier does not match the code challenge.
    #[error("PKCE verification failed")]
    PkceVerificationFailed,

    /// The token request is invalid or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The authorization server does not support the requested grant type.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// No ACTIVE signing key exists and one could not be provisioned.
    ///
    /// Fatal for signing operations; surfaces as a 5xx-class error.
    #[error("No active signing key: {message}")]
    NoActiveKey {
        /// Description of the key-state failure.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

/// Internal sub-condition of a refresh-token failure.
///
/// Recorded to the audit trail; externally every variant maps to the same
/// `invalid_refresh_token` error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshFailure {
    /// No token with the presented value exists.
    NotFound,
    /// The token exists but its `expires_at` has passed.
    Expired,
    /// The token was presented after rotation or revocation; the whole
    /// family has been revoked in response.
    Reuse,
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Expired => write!(f, "expired"),
            Self::Reuse => write!(f, "reuse"),
        }
    }
}

impl AuthError {
    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRefreshToken` error.
    #[must_use]
    pub fn invalid_refresh_token(reason: RefreshFailure) -> Self {
        Self::InvalidRefreshToken { reason }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `NoActiveKey` error.
    #[must_use]
    pub fn no_active_key(message: impl Into<String>) -> Self {
        Self::NoActiveKey {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::NoActiveKey { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a security-gate error.
    ///
    /// Security gates must always be recorded to the audit trail even
    /// though the HTTP response is deliberately generic.
    #[must_use]
    pub fn is_security_gate(&self) -> bool {
        matches!(
            self,
            Self::AccountLocked
                | Self::CaptchaRequired
                | Self::DeviceProofRequired
                | Self::InvalidDeviceProof
                | Self::InvalidRefreshToken { .. }
                | Self::PkceVerificationFailed
        )
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. }
                | Self::InvalidRefreshToken { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. }
            | Self::InvalidGrant { .. }
            | Self::Unauthorized { .. }
            | Self::PkceVerificationFailed => ErrorCategory::Authentication,
            Self::InvalidScope { .. } => ErrorCategory::Authorization,
            Self::InvalidToken { .. }
            | Self::InvalidRefreshToken { .. }
            | Self::TokenExpired
            | Self::TokenRevoked => ErrorCategory::Token,
            Self::AccountLocked
            | Self::CaptchaRequired
            | Self::DeviceProofRequired
            | Self::InvalidDeviceProof => ErrorCategory::SecurityGate,
            Self::InvalidRequest { .. } | Self::UnsupportedGrantType { .. } => {
                ErrorCategory::Validation
            }
            Self::Storage { .. } | Self::NoActiveKey { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code serialized into error responses.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } | Self::PkceVerificationFailed => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidToken { .. } | Self::TokenExpired | Self::TokenRevoked => "invalid_token",
            Self::InvalidRefreshToken { .. } => "invalid_refresh_token",
            Self::Unauthorized { .. } => "unauthorized",
            Self::AccountLocked => "account_locked",
            Self::CaptchaRequired => "captcha_required",
            Self::DeviceProofRequired => "device_proof_required",
            Self::InvalidDeviceProof => "invalid_device_proof",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::Storage { .. }
            | Self::NoActiveKey { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "server_error",
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication-related errors (identity verification).
    Authentication,
    /// Authorization-related errors (scope/permission checks).
    Authorization,
    /// Token-related errors (validation, expiration, reuse).
    Token,
    /// Security-gate errors (lockout, CAPTCHA, device proof).
    SecurityGate,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::SecurityGate => write!(f, "security_gate"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::invalid_grant("expired authorization code");
        assert_eq!(err.to_string(), "Invalid grant: expired authorization code");

        let err = AuthError::AccountLocked;
        assert_eq!(err.to_string(), "Account locked");

        // The refresh failure reason must not leak through Display.
        let err = AuthError::invalid_refresh_token(RefreshFailure::Reuse);
        assert_eq!(err.to_string(), "Invalid refresh token");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_client("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = AuthError::storage("database down");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = AuthError::no_active_key("none provisioned");
        assert!(err.is_server_error());

        let err = AuthError::invalid_refresh_token(RefreshFailure::Expired);
        assert!(err.is_token_error());
        assert!(err.is_security_gate());

        assert!(AuthError::AccountLocked.is_security_gate());
        assert!(AuthError::InvalidDeviceProof.is_security_gate());
        assert!(!AuthError::invalid_request("x").is_security_gate());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(AuthError::TokenExpired.category(), ErrorCategory::Token);
        assert_eq!(
            AuthError::AccountLocked.category(),
            ErrorCategory::SecurityGate
        );
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::no_active_key("test").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_grant("test").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::PkceVerificationFailed.oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(AuthError::AccountLocked.oauth_error_code(), "account_locked");
        assert_eq!(
            AuthError::CaptchaRequired.oauth_error_code(),
            "captcha_required"
        );
        assert_eq!(
            AuthError::InvalidDeviceProof.oauth_error_code(),
            "invalid_device_proof"
        );
        assert_eq!(
            AuthError::storage("test").oauth_error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_refresh_failures_indistinguishable() {
        // All refresh sub-conditions map to the same external code.
        for reason in [
            RefreshFailure::NotFound,
            RefreshFailure::Expired,
            RefreshFailure::Reuse,
        ] {
            let err = AuthError::invalid_refresh_token(reason);
            assert_eq!(err.oauth_error_code(), "invalid_refresh_token");
        }
    }
}
