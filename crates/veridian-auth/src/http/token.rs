//! OAuth 2.0 token endpoint handler.
//!
//! Handles `POST /oauth/token` with an
//! `application/x-www-form-urlencoded` body. Clients authenticate via
//! HTTP Basic Auth, body credentials, or (for public clients) bare
//! `client_id`; the grant itself is dispatched by
//! [`TokenService::handle`].
//!
//! Error responses follow the OAuth error object shape. Infrastructure
//! failures answer with a generic `server_error` carrying a
//! correlation id; the underlying cause goes to the logs only.

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::oauth::client_auth::{authenticate_client, parse_basic_auth};
use crate::oauth::request::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
use crate::storage::ClientStorage;
use crate::token::service::TokenService;

/// State for the token endpoint.
#[derive(Clone)]
pub struct TokenState {
    /// Grant orchestrator.
    pub token_service: Arc<TokenService>,
    /// Client storage for authentication.
    pub client_storage: Arc<dyn ClientStorage>,
}

impl TokenState {
    /// Creates a new token state.
    #[must_use]
    pub fn new(token_service: Arc<TokenService>, client_storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            token_service,
            client_storage,
        }
    }
}

/// Handler for `POST /oauth/token`.
pub async fn token_handler(
    State(state): State<TokenState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    debug!(
        grant_type = %request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    let basic_auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);
    let basic_auth_ref = basic_auth
        .as_ref()
        .map(|(id, secret)| (id.as_str(), secret.as_str()));

    let client =
        match authenticate_client(&request, basic_auth_ref, state.client_storage.as_ref()).await {
            Ok(authenticated) => authenticated.client,
            Err(e) => {
                warn!(error = %e, "Client authentication failed");
                return error_response(&e);
            }
        };

    match state.token_service.handle(&request, &client).await {
        Ok(response) => success_response(response),
        Err(e) => {
            warn!(
                client_id = %client.client_id,
                grant_type = %request.grant_type,
                error = %e,
                "Token request failed"
            );
            error_response(&e)
        }
    }
}

/// Builds the success response with cache-prevention headers.
fn success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

/// Maps an engine error to the OAuth error object.
pub(crate) fn error_response(error: &AuthError) -> Response {
    let code = error_code(error);

    let body = if code == TokenErrorCode::ServerError {
        // Generic outward response; the correlation id ties it to the
        // detailed log record.
        let correlation_id = Uuid::new_v4();
        tracing::error!(%correlation_id, error = %error, "Token endpoint infrastructure failure");
        TokenError::new(code).with_correlation_id(correlation_id.to_string())
    } else if error.is_security_gate() {
        // Security gates never explain themselves.
        TokenError::new(code)
    } else {
        TokenError::with_description(code, error.to_string())
    };

    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn error_code(error: &AuthError) -> TokenErrorCode {
    match error {
        AuthError::InvalidClient { .. } | AuthError::Unauthorized { .. } => {
            TokenErrorCode::InvalidClient
        }
        AuthError::InvalidGrant { .. } | AuthError::PkceVerificationFailed => {
            TokenErrorCode::InvalidGrant
        }
        AuthError::InvalidRefreshToken { .. } => TokenErrorCode::InvalidRefreshToken,
        AuthError::InvalidScope { .. } => TokenErrorCode::InvalidScope,
        AuthError::UnsupportedGrantType { .. } => TokenErrorCode::UnsupportedGrantType,
        AuthError::AccountLocked => TokenErrorCode::AccountLocked,
        AuthError::CaptchaRequired => TokenErrorCode::CaptchaRequired,
        AuthError::DeviceProofRequired => TokenErrorCode::DeviceProofRequired,
        AuthError::InvalidDeviceProof => TokenErrorCode::InvalidDeviceProof,
        AuthError::InvalidRequest { .. } => TokenErrorCode::InvalidRequest,
        _ => TokenErrorCode::ServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefreshFailure;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            error_code(&AuthError::invalid_client("x")),
            TokenErrorCode::InvalidClient
        );
        assert_eq!(
            error_code(&AuthError::PkceVerificationFailed),
            TokenErrorCode::InvalidGrant
        );
        assert_eq!(
            error_code(&AuthError::invalid_refresh_token(RefreshFailure::Reuse)),
            TokenErrorCode::InvalidRefreshToken
        );
        assert_eq!(
            error_code(&AuthError::AccountLocked),
            TokenErrorCode::AccountLocked
        );
        assert_eq!(
            error_code(&AuthError::storage("db down")),
            TokenErrorCode::ServerError
        );
        assert_eq!(
            error_code(&AuthError::no_active_key("none")),
            TokenErrorCode::ServerError
        );
    }

    #[test]
    fn test_reuse_and_not_found_map_identically() {
        // Externally indistinguishable refresh failures.
        let reuse = error_code(&AuthError::invalid_refresh_token(RefreshFailure::Reuse));
        let missing = error_code(&AuthError::invalid_refresh_token(RefreshFailure::NotFound));
        let expired = error_code(&AuthError::invalid_refresh_token(RefreshFailure::Expired));
        assert_eq!(reuse, missing);
        assert_eq!(reuse, expired);
    }
}
