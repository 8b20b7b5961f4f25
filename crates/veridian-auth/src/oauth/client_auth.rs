//! Client authentication for the token, revocation, and introspection
//! endpoints.
//!
//! Supported methods:
//!
//! - `client_secret_basic` - HTTP Basic Auth header
//! - `client_secret_post` - `client_id` + `client_secret` in the body
//! - public client - `client_id` only (authorization_code with PKCE)
//!
//! Client secrets are stored as Argon2id hashes and verified with the
//! same machinery as user passwords.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::request::TokenRequest;
use crate::storage::ClientStorage;
use crate::types::Client;

/// A client that passed authentication.
pub struct AuthenticatedClient {
    /// The authenticated client record.
    pub client: Client,
}

/// Parses an `Authorization: Basic ...` header into (id, secret).
///
/// Returns `None` if the header is not Basic auth or is malformed.
#[must_use]
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Authenticates the client behind a token-endpoint request.
///
/// Basic auth takes precedence over body credentials. Public clients
/// authenticate with `client_id` alone; confidential clients must
/// present their secret.
///
/// # Errors
///
/// Returns `AuthError::InvalidClient` if no client can be identified,
/// the client is unknown or inactive, or the secret does not verify.
pub async fn authenticate_client(
    request: &TokenRequest,
    basic_auth: Option<(&str, &str)>,
    storage: &dyn ClientStorage,
) -> AuthResult<AuthenticatedClient> {
    let (client_id, secret) = match basic_auth {
        Some((id, secret)) => (id.to_string(), Some(secret.to_string())),
        None => {
            let id = request
                .client_id
                .clone()
                .ok_or_else(|| AuthError::invalid_client("No client identification provided"))?;
            (id, request.client_secret.clone())
        }
    };

    let client = storage
        .find_by_client_id(&client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

    if !client.active {
        return Err(AuthError::invalid_client("Client is inactive"));
    }

    if client.confidential {
        let secret =
            secret.ok_or_else(|| AuthError::invalid_client("Client secret required"))?;
        let hash = client
            .secret_hash
            .as_deref()
            .ok_or_else(|| AuthError::invalid_client("Client has no registered secret"))?;

        if !verify_client_secret(&secret, hash)
            .map_err(|e| AuthError::internal(format!("Secret verification failed: {e}")))?
        {
            return Err(AuthError::invalid_client("Client authentication failed"));
        }
    }

    Ok(AuthenticatedClient { client })
}

/// Generates a new client secret.
///
/// 256 bits of randomness, hex-encoded, with a `vcs_` prefix for easy
/// identification in leaked-credential scans.
#[must_use]
pub fn generate_client_secret() -> String {
    let bytes: [u8; 32] = rand::Rng::r#gen(&mut rand::thread_rng());
    format!("vcs_{}", hex::encode(bytes))
}

/// Hashes a client secret for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails.
pub fn hash_client_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a client secret against its stored Argon2 hash.
///
/// # Errors
///
/// Returns an error only if the stored hash is malformed; a wrong
/// secret yields `Ok(false)`.
pub fn verify_client_secret(
    secret: &str,
    hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}
