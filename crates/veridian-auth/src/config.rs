//! Identity provider configuration.
//!
//! Configuration is organized into sections mirroring the engine's
//! components: OAuth lifetimes, token signing, login lockout, and
//! device proof-of-possession. All durations accept humantime strings
//! ("10m", "90d") when deserialized from TOML.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://id.example.com"
//!
//! [auth.oauth]
//! access_token_lifetime = "15m"
//! refresh_token_lifetime = "30d"
//!
//! [auth.lockout]
//! lock_threshold = 10
//! lock_duration = "15m"
//! ```

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AuthError;

/// Root configuration for the identity provider engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL (used in token `iss` claim and the discovery document).
    /// This should be the public base URL of the identity provider.
    pub issuer: String,

    /// Audience URL of the downstream resource API (access token `aud`).
    pub resource_audience: String,

    /// OAuth 2.0 configuration.
    pub oauth: OAuthConfig,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Login failure / lockout configuration.
    pub lockout: LockoutConfig,

    /// Device proof-of-possession configuration.
    pub device: DeviceConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            resource_audience: "http://localhost:8080/api".to_string(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
            lockout: LockoutConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if any section is inconsistent
    /// (zero lifetimes, thresholds out of order, malformed secrets).
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.issuer.is_empty() {
            return Err(AuthError::configuration("issuer must not be empty"));
        }
        self.oauth.validate()?;
        self.signing.validate()?;
        self.lockout.validate()?;
        self.device.validate()?;
        Ok(())
    }
}

/// OAuth 2.0 lifetimes and refresh behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime. Codes are short-lived by design.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime (per issuance or sliding extension).
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Hard maximum lifetime of a refresh token measured from its
    /// creation. Sliding-policy extensions never push `expires_at`
    /// past `created_at + refresh_max_lifetime`.
    #[serde(with = "humantime_serde")]
    pub refresh_max_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(300), // 5 minutes
            access_token_lifetime: Duration::from_secs(900),       // 15 minutes
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            refresh_max_lifetime: Duration::from_secs(90 * 24 * 3600), // 90 days
            id_token_lifetime: Duration::from_secs(900),
        }
    }
}

impl OAuthConfig {
    fn validate(&self) -> Result<(), AuthError> {
        if self.authorization_code_lifetime.is_zero() {
            return Err(AuthError::configuration(
                "authorization_code_lifetime must be non-zero",
            ));
        }
        if self.access_token_lifetime.is_zero() {
            return Err(AuthError::configuration(
                "access_token_lifetime must be non-zero",
            ));
        }
        if self.refresh_max_lifetime < self.refresh_token_lifetime {
            return Err(AuthError::configuration(
                "refresh_max_lifetime must be at least refresh_token_lifetime",
            ));
        }
        Ok(())
    }
}

/// Token signing and JWKS publication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm for newly provisioned keys.
    /// Supported: "RS256", "RS384", "ES384"
    pub algorithm: String,

    /// Base64-encoded 256-bit key-encryption key protecting private
    /// key material at rest. Supplied via environment in production;
    /// never logged.
    pub key_encryption_key: String,

    /// `Cache-Control: max-age` for the JWKS endpoint, in seconds.
    pub jwks_max_age_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            key_encryption_key: String::new(),
            jwks_max_age_secs: 3600,
        }
    }
}

impl SigningConfig {
    fn validate(&self) -> Result<(), AuthError> {
        match self.algorithm.as_str() {
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(AuthError::configuration(format!(
                    "unsupported signing algorithm: {other}"
                )));
            }
        }
        if !self.key_encryption_key.is_empty() {
            let decoded = BASE64
                .decode(&self.key_encryption_key)
                .map_err(|e| AuthError::configuration(format!("key_encryption_key: {e}")))?;
            if decoded.len() != 32 {
                return Err(AuthError::configuration(
                    "key_encryption_key must decode to exactly 32 bytes",
                ));
            }
        }
        Ok(())
    }
}

/// Login failure counting and lockout thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Failure count at which CAPTCHA verification becomes mandatory
    /// before credentials are compared.
    pub captcha_threshold: u32,

    /// Shared secret for the CAPTCHA provider, handed to the verifier
    /// implementation. Never logged.
    pub captcha_secret: String,

    /// Failure count at which the account is locked.
    pub lock_threshold: u32,

    /// How long a lock lasts once triggered.
    #[serde(with = "humantime_serde")]
    pub lock_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            captcha_threshold: 5,
            captcha_secret: String::new(),
            lock_threshold: 10,
            lock_duration: Duration::from_secs(900), // 15 minutes
        }
    }
}

impl LockoutConfig {
    fn validate(&self) -> Result<(), AuthError> {
        if self.lock_threshold == 0 {
            return Err(AuthError::configuration("lock_threshold must be non-zero"));
        }
        if self.captcha_threshold > self.lock_threshold {
            return Err(AuthError::configuration(
                "captcha_threshold must not exceed lock_threshold",
            ));
        }
        if self.lock_duration.is_zero() {
            return Err(AuthError::configuration("lock_duration must be non-zero"));
        }
        Ok(())
    }
}

/// Device proof-of-possession configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Accepted clock skew between the proof timestamp and server time,
    /// in either direction.
    #[serde(with = "humantime_serde")]
    pub timestamp_tolerance: Duration,

    /// How long a seen `jti` stays in the replay cache. Must be at
    /// least the timestamp tolerance or a replayed proof could slip in
    /// after its cache entry expires but inside the window.
    #[serde(with = "humantime_serde")]
    pub replay_ttl: Duration,

    /// Length in bytes of provisioned device secrets.
    pub secret_length: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance: Duration::from_secs(60),
            replay_ttl: Duration::from_secs(300),
            secret_length: 32,
        }
    }
}

impl DeviceConfig {
    fn validate(&self) -> Result<(), AuthError> {
        if self.replay_ttl < self.timestamp_tolerance {
            return Err(AuthError::configuration(
                "replay_ttl must be at least timestamp_tolerance",
            ));
        }
        if self.secret_length < 16 {
            return Err(AuthError::configuration(
                "secret_length must be at least 16 bytes",
            ));
        }
        Ok(())
    }
}
