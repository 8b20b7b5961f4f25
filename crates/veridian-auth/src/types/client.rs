//! Registered OAuth client domain type.
//!
//! Clients are the applications that request tokens. Each client is
//! bound to a tenant (organization), a set of allowed grant types and
//! redirect URIs, and an explicit refresh-token policy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth 2.0 grant types supported by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code with PKCE (interactive login).
    AuthorizationCode,
    /// Refresh an access token.
    RefreshToken,
    /// Resource Owner Password Credentials. Restricted to trusted
    /// first-party clients.
    Password,
}

impl GrantType {
    /// Parses a grant type from its wire representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "password" => Some(Self::Password),
            _ => None,
        }
    }

    /// Returns the wire representation of the grant type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Refresh-token behavior for a client.
///
/// An explicit per-client configuration value. Policy is never inferred
/// from client naming conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Every refresh mints a replacement token id and marks the
    /// presented one ROTATED. The default; detects theft via reuse.
    #[default]
    Rotate,
    /// Refreshes extend the same token id's expiry in place, up to a
    /// hard maximum lifetime measured from creation.
    Sliding,
}

/// Errors raised when validating a client record.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// The client has no registered redirect URIs but allows the
    /// authorization_code grant.
    #[error("authorization_code clients must register at least one redirect URI")]
    MissingRedirectUris,

    /// A registered redirect URI is not an absolute URL.
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// Confidential clients must carry a secret hash.
    #[error("Confidential clients must have a client secret")]
    MissingSecret,
}

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Public client identifier.
    pub client_id: String,

    /// Argon2 hash of the client secret (None for public clients).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,

    /// Human-readable client name.
    pub name: String,

    /// Tenant (organization) this client belongs to.
    pub organization_id: Uuid,

    /// Grant types this client may use.
    pub grant_types: Vec<GrantType>,

    /// Exact-match redirect URIs for the authorization-code flow.
    pub redirect_uris: Vec<String>,

    /// Scopes this client may request. Empty means all scopes.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Whether this client can keep a secret (confidential) or not
    /// (public, PKCE-only).
    pub confidential: bool,

    /// Whether this is a trusted first-party client. Only first-party
    /// clients may use the password grant.
    #[serde(default)]
    pub first_party: bool,

    /// Whether the client is active. Inactive clients cannot obtain
    /// tokens.
    pub active: bool,

    /// Refresh-token behavior for this client.
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,

    /// Per-client access token lifetime override, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime: Option<i64>,

    /// Per-client refresh token lifetime override, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_lifetime: Option<i64>,
}

impl Client {
    /// Returns `true` if the given redirect URI is registered for this
    /// client. Matching is exact; no prefix or wildcard logic.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    /// Returns `true` if the client may use the given grant type.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Returns `true` if the client may request the given scope.
    ///
    /// An empty scope list means the client is unrestricted.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s == scope)
    }

    /// Validates structural invariants of the client record.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientValidationError`] describing the first
    /// violated invariant.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.is_grant_type_allowed(GrantType::AuthorizationCode)
            && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::MissingRedirectUris);
        }
        for uri in &self.redirect_uris {
            if url::Url::parse(uri).is_err() {
                return Err(ClientValidationError::InvalidRedirectUri(uri.clone()));
            }
        }
        if self.confidential && self.secret_hash.is_none() {
            return Err(ClientValidationError::MissingSecret);
        }
        Ok(())
    }
}
