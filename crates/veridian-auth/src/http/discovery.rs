//! OpenID Connect discovery document handler.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::config::AuthConfig;

/// State for the discovery endpoint.
#[derive(Clone)]
pub struct DiscoveryState {
    /// Authentication configuration.
    pub config: AuthConfig,
}

impl DiscoveryState {
    /// Creates a new discovery state.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

/// Handler for `GET /.well-known/openid-configuration`.
///
/// Returns a static discovery document built from the configured
/// issuer: endpoint URLs, supported algorithms, and PKCE methods.
pub async fn openid_configuration_handler(
    State(state): State<DiscoveryState>,
) -> impl IntoResponse {
    let base = state.config.issuer.trim_end_matches('/');

    let doc = serde_json::json!({
        "issuer": base,
        "token_endpoint": format!("{base}/oauth/token"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "jwks_uri": format!("{base}/jwks.json"),
        "revocation_endpoint": format!("{base}/oauth/revoke"),
        "introspection_endpoint": format!("{base}/introspect"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token", "password"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": [state.config.signing.algorithm],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "code_challenge_methods_supported": ["S256"],
        "scopes_supported": ["openid", "profile", "email", "offline_access"],
    });

    ([(header::CONTENT_TYPE, "application/json")], Json(doc))
}
