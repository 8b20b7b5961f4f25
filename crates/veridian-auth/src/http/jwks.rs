//! JWKS endpoint handler with conditional-GET support.
//!
//! The key manager supplies a deterministic content hash for the key
//! set; this handler turns it into an `ETag` and honors
//! `If-None-Match` with `304 Not Modified`, so verifiers polling the
//! endpoint pay for a full body only when the key set actually
//! changed.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::keys::KeyManager;

/// State for the JWKS endpoint.
#[derive(Clone)]
pub struct JwksState {
    /// The key manager owning the published set.
    pub key_manager: Arc<KeyManager>,
    /// `Cache-Control: max-age` value in seconds.
    pub max_age_secs: u64,
}

impl JwksState {
    /// Creates a new JWKS state.
    #[must_use]
    pub fn new(key_manager: Arc<KeyManager>, max_age_secs: u64) -> Self {
        Self {
            key_manager,
            max_age_secs,
        }
    }
}

/// Handler for `GET /jwks.json`.
///
/// # Responses
///
/// - `304 Not Modified` when `If-None-Match` matches the current ETag
/// - `200 OK` with the key set, `ETag`, and `Cache-Control` otherwise
/// - `500` when the key set cannot be read
pub async fn jwks_handler(State(state): State<JwksState>, headers: HeaderMap) -> Response {
    let doc = match state.key_manager.public_key_set().await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load public key set");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let etag = format!("\"{}\"", doc.etag);

    if let Some(candidate) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok())
        && if_none_match_matches(candidate, &etag)
    {
        return (
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag)],
        )
            .into_response();
    }

    (
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::ETAG, etag),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.max_age_secs),
            ),
        ],
        Json(doc.jwks),
    )
        .into_response()
}

/// Matches an `If-None-Match` header value against the current ETag.
///
/// Handles the `*` wildcard, comma-separated candidate lists, and weak
/// validators (`W/"..."` compares equal to its strong form).
fn if_none_match_matches(header_value: &str, etag: &str) -> bool {
    if header_value.trim() == "*" {
        return true;
    }
    header_value
        .split(',')
        .map(str::trim)
        .map(|v| v.strip_prefix("W/").unwrap_or(v))
        .any(|v| v == etag)
}
