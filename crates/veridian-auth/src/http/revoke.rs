//! Token revocation endpoint handler (RFC 7009).
//!
//! Revokes the presented refresh token's entire family. Always returns
//! 200 OK for an authenticated client, even for unknown tokens, so the
//! endpoint cannot be used to enumerate valid token values.

use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::ledger::RefreshTokenLedger;
use crate::oauth::client_auth::{authenticate_client, parse_basic_auth};
use crate::oauth::request::TokenRequest;
use crate::storage::ClientStorage;
use crate::types::RevokeReason;

/// State for the revocation endpoint.
#[derive(Clone)]
pub struct RevocationState {
    /// The refresh token ledger.
    pub ledger: Arc<RefreshTokenLedger>,
    /// Client storage for authentication.
    pub client_storage: Arc<dyn ClientStorage>,
}

impl RevocationState {
    /// Creates a new revocation state.
    #[must_use]
    pub fn new(ledger: Arc<RefreshTokenLedger>, client_storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            ledger,
            client_storage,
        }
    }
}

/// Form parameters for the revocation endpoint (RFC 7009).
#[derive(Debug, Deserialize)]
pub struct RevocationForm {
    /// The token to revoke.
    pub token: String,

    /// Optional hint about the token type.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    /// Client ID (when not using Basic auth).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post authentication).
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Handler for `POST /oauth/revoke`.
///
/// # Responses
///
/// - `200 OK` for authenticated clients, regardless of whether the
///   token existed
/// - `400` if the `token` parameter is missing
/// - `401` for failed client authentication
pub async fn revoke_handler(
    State(state): State<RevocationState>,
    headers: HeaderMap,
    Form(form): Form<RevocationForm>,
) -> Response {
    if form.token.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let basic_auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);
    let basic_auth_ref = basic_auth
        .as_ref()
        .map(|(id, secret)| (id.as_str(), secret.as_str()));

    // Reuse the token-endpoint authentication shape.
    let auth_request = TokenRequest {
        grant_type: String::new(),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: form.client_id.clone(),
        client_secret: form.client_secret.clone(),
        refresh_token: None,
        scope: None,
        username: None,
        password: None,
        captcha_token: None,
    };

    let client =
        match authenticate_client(&auth_request, basic_auth_ref, state.client_storage.as_ref())
            .await
        {
            Ok(authenticated) => authenticated.client,
            Err(e) => {
                tracing::debug!(error = %e, "Revocation: client authentication failed");
                return StatusCode::UNAUTHORIZED.into_response();
            }
        };

    match state
        .ledger
        .revoke_by_value(&form.token, RevokeReason::ClientRequest)
        .await
    {
        Ok(()) => {
            tracing::info!(client_id = %client.client_id, "Token revocation processed");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            // Still 200 per RFC 7009, to avoid revealing token state;
            // the failure is only visible in the logs.
            tracing::warn!(
                client_id = %client.client_id,
                error = %e,
                "Token revocation encountered error (returning 200 OK)"
            );
            StatusCode::OK.into_response()
        }
    }
}
