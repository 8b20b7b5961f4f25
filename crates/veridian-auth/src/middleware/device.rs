//! Device proof-of-possession middleware.
//!
//! Protected routes carry this layer; any request reaching them must
//! present the four proof headers (`X-Device-Id`, `X-JTI`, `X-TS`,
//! `X-Device-Proof`), and the proof must verify against the device's
//! registered secret with replay protection.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::device::{
    DeviceProof, DeviceProofVerifier, HEADER_DEVICE_ID, HEADER_JTI, HEADER_PROOF, HEADER_TIMESTAMP,
};
use crate::error::AuthError;
use crate::http::token::error_response;

/// State for the device-proof layer.
#[derive(Clone)]
pub struct DeviceProofLayerState {
    /// The proof verifier.
    pub verifier: Arc<DeviceProofVerifier>,
}

impl DeviceProofLayerState {
    /// Creates a new layer state.
    #[must_use]
    pub fn new(verifier: Arc<DeviceProofVerifier>) -> Self {
        Self { verifier }
    }
}

/// Middleware enforcing a valid device proof on the request.
///
/// Requests without the proof headers are rejected with
/// `device_proof_required`; requests whose proof fails any check are
/// rejected with the uniform `invalid_device_proof`.
pub async fn require_device_proof(
    State(state): State<DeviceProofLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let proof = match parse_proof_headers(request.headers()) {
        Ok(proof) => proof,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = state.verifier.verify(&method, &path, &proof).await {
        return error_response(&e);
    }

    next.run(request).await
}

/// Parses the proof headers.
///
/// Missing headers map to `DeviceProofRequired`; present-but-malformed
/// values map to the uniform `InvalidDeviceProof`.
fn parse_proof_headers(headers: &HeaderMap) -> Result<DeviceProof, AuthError> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let (Some(device_id), Some(jti), Some(ts), Some(signature)) = (
        get(HEADER_DEVICE_ID),
        get(HEADER_JTI),
        get(HEADER_TIMESTAMP),
        get(HEADER_PROOF),
    ) else {
        return Err(AuthError::DeviceProofRequired);
    };

    let device_id = Uuid::parse_str(&device_id).map_err(|_| AuthError::InvalidDeviceProof)?;
    let timestamp: i64 = ts.parse().map_err(|_| AuthError::InvalidDeviceProof)?;

    Ok(DeviceProof {
        device_id,
        jti,
        timestamp,
        signature,
    })
}
