//! Token introspection endpoint handler (RFC 7662).

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::AuthConfig;
use crate::keys::KeyManager;
use crate::ledger::RefreshTokenLedger;
use crate::oauth::client_auth::{authenticate_client, parse_basic_auth};
use crate::oauth::request::TokenRequest;
use crate::storage::ClientStorage;
use crate::token::introspection::{IntrospectionRequest, IntrospectionResponse};
use crate::token::jwt::AccessTokenClaims;

/// State for the introspection endpoint.
#[derive(Clone)]
pub struct IntrospectionState {
    /// Key manager for access-token signature verification.
    pub key_manager: Arc<KeyManager>,
    /// Ledger for refresh-token lookups.
    pub ledger: Arc<RefreshTokenLedger>,
    /// Client storage for authentication.
    pub client_storage: Arc<dyn ClientStorage>,
    /// Provider configuration (issuer).
    pub config: AuthConfig,
}

impl IntrospectionState {
    /// Creates a new introspection state.
    #[must_use]
    pub fn new(
        key_manager: Arc<KeyManager>,
        ledger: Arc<RefreshTokenLedger>,
        client_storage: Arc<dyn ClientStorage>,
        config: AuthConfig,
    ) -> Self {
        Self {
            key_manager,
            ledger,
            client_storage,
            config,
        }
    }
}

/// Handler for `POST /introspect`.
///
/// Requires client authentication. Inactive tokens of any kind answer
/// `{"active": false}` with no detail about why.
pub async fn introspect_handler(
    State(state): State<IntrospectionState>,
    headers: HeaderMap,
    Form(request): Form<IntrospectionRequest>,
) -> Response {
    let basic_auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);
    let basic_auth_ref = basic_auth
        .as_ref()
        .map(|(id, secret)| (id.as_str(), secret.as_str()));

    let auth_request = TokenRequest {
        grant_type: String::new(),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: None,
        client_secret: None,
        refresh_token: None,
        scope: None,
        username: None,
        password: None,
        captcha_token: None,
    };

    if authenticate_client(&auth_request, basic_auth_ref, state.client_storage.as_ref())
        .await
        .is_err()
    {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let response = introspect(&state, &request).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// Determines the active state of a presented token.
///
/// Tries the token as a signed access token first, then as a refresh
/// token. Any failure along the way means `active: false`.
async fn introspect(state: &IntrospectionState, request: &IntrospectionRequest) -> IntrospectionResponse {
    // Access tokens are JWTs; expiry is checked from the claims so an
    // expired-but-well-signed token still answers inactive rather than
    // erroring.
    if let Ok(claims) = state
        .key_manager
        .verify_token::<AccessTokenClaims>(&request.token, &state.config.issuer, false)
        .await
    {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if claims.exp <= now {
            return IntrospectionResponse::inactive();
        }
        return IntrospectionResponse::from_access_claims(&claims);
    }

    // Not a (valid) JWT: try the refresh ledger.
    match state.ledger.peek(&request.token).await {
        Ok(Some(token)) if token.is_presentable() => IntrospectionResponse {
            active: true,
            iss: Some(state.config.issuer.clone()),
            sub: Some(token.subject.to_string()),
            aud: None,
            iat: Some(token.created_at.unix_timestamp()),
            exp: Some(token.expires_at.unix_timestamp()),
            jti: Some(token.id.to_string()),
            scope: Some(token.scope.clone()),
            client_id: Some(token.client_id.clone()),
            token_type: Some("refresh_token".to_string()),
        },
        _ => IntrospectionResponse::inactive(),
    }
}
