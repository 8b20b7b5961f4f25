//! # veridian-auth
//!
//! Token issuance and session-security engine for the Veridian
//! identity provider.
//!
//! This crate provides:
//! - Signing-key lifecycle management and JWKS publication
//! - Authorization-code-with-PKCE exchange and token minting
//! - Refresh-token rotation with family-level reuse detection
//! - Device-bound proof-of-possession verification
//! - Login-failure counting with CAPTCHA and lockout gating
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`keys`] - Key manager, key encryption at rest, JWKS
//! - [`oauth`] - PKCE, authorization codes, wire types, client auth
//! - [`ledger`] - Refresh-token families, rotation, reuse detection
//! - [`device`] - Device proof verification
//! - [`lockout`] - Login security tracking
//! - [`token`] - JWTs and grant orchestration
//! - [`audit`] - Security event audit logging
//! - [`storage`] - Storage traits for auth-related data
//! - [`http`] - Axum handlers for the public endpoints
//! - [`middleware`] - Device-proof enforcement layer

pub mod audit;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod keys;
pub mod ledger;
pub mod lockout;
pub mod middleware;
pub mod oauth;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, DeviceConfig, LockoutConfig, OAuthConfig, SigningConfig};
pub use error::{AuthError, ErrorCategory, RefreshFailure};
pub use http::{
    DiscoveryState, IntrospectionState, JwksState, RevocationState, TokenState, UserInfoResponse,
    UserInfoState, introspect_handler, jwks_handler, openid_configuration_handler, revoke_handler,
    token_handler, userinfo_handler,
};
pub use keys::{EncryptedKeyMaterial, JwksDocument, KeyEncryptionKey, KeyManager, KeyStatus,
    SigningKeyRecord,
};
pub use ledger::{RefreshTokenLedger, RotationOutcome};
pub use lockout::{LoginGate, LoginSecurityTracker};
pub use storage::{
    ClientStorage, CodeStorage, Device, DeviceStatus, DeviceStorage, FailureCache, JtiStorage,
    KeyStorage, LoginAttemptStorage, RefreshTokenStorage, User, UserStorage,
};
pub use token::{CaptchaVerifier, TokenService};
pub use types::{Client, GrantType, RefreshPolicy, RefreshToken, RefreshTokenStatus, Subject};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use veridian_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, DeviceConfig, LockoutConfig, OAuthConfig, SigningConfig};
    pub use crate::device::{DeviceProof, DeviceProofVerifier};
    pub use crate::error::{AuthError, ErrorCategory, RefreshFailure};
    pub use crate::keys::{KeyEncryptionKey, KeyManager};
    pub use crate::ledger::RefreshTokenLedger;
    pub use crate::lockout::{LoginGate, LoginSecurityTracker};
    pub use crate::storage::{
        ClientStorage, CodeStorage, DeviceStorage, FailureCache, JtiStorage, KeyStorage,
        LoginAttemptStorage, RefreshTokenStorage, UserStorage,
    };
    pub use crate::token::{CaptchaVerifier, TokenService};
    pub use crate::types::{Client, GrantType, RefreshPolicy, RefreshToken, Subject};
}
