//! UserInfo endpoint handler (OpenID Connect).
//!
//! Bearer-authenticated; claims are gated on the access token carrying
//! the `openid` scope.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::keys::KeyManager;
use crate::storage::UserStorage;
use crate::token::jwt::AccessTokenClaims;

/// State for the userinfo endpoint.
#[derive(Clone)]
pub struct UserInfoState {
    /// Key manager for access-token verification.
    pub key_manager: Arc<KeyManager>,
    /// User storage for claim lookup.
    pub user_storage: Arc<dyn UserStorage>,
    /// Provider configuration (issuer).
    pub config: AuthConfig,
}

impl UserInfoState {
    /// Creates a new userinfo state.
    #[must_use]
    pub fn new(
        key_manager: Arc<KeyManager>,
        user_storage: Arc<dyn UserStorage>,
        config: AuthConfig,
    ) -> Self {
        Self {
            key_manager,
            user_storage,
            config,
        }
    }
}

/// Subject claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfoResponse {
    /// Subject identifier.
    pub sub: String,

    /// Preferred username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Handler for `GET /userinfo`.
///
/// # Responses
///
/// - `200 OK` with subject claims
/// - `401` for a missing/invalid bearer token
/// - `403` when the token lacks the `openid` scope
pub async fn userinfo_handler(State(state): State<UserInfoState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match state
        .key_manager
        .verify_token::<AccessTokenClaims>(token, &state.config.issuer, true)
        .await
    {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    if !claims.scope.split_whitespace().any(|s| s == "openid") {
        return StatusCode::FORBIDDEN.into_response();
    }

    // Subjects serialize as "kind:uuid"; only user subjects have
    // profile claims.
    let Some(user_id) = claims
        .sub
        .strip_prefix("user:")
        .and_then(|id| Uuid::parse_str(id).ok())
    else {
        return (
            StatusCode::OK,
            Json(UserInfoResponse {
                sub: claims.sub,
                preferred_username: None,
                name: None,
                email: None,
            }),
        )
            .into_response();
    };

    match state.user_storage.find_by_id(user_id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(UserInfoResponse {
                sub: claims.sub,
                preferred_username: Some(user.username),
                name: user.name,
                email: user.email,
            }),
        )
            .into_response(),
        Ok(None) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "UserInfo storage failure");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Extracts the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
