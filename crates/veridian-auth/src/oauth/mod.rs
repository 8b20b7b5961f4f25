//! OAuth 2.0 protocol types and client authentication.
//!
//! - [`pkce`] - Proof Key for Code Exchange (RFC 7636, S256 only)
//! - [`code`] - Single-use authorization codes
//! - [`request`] - Token endpoint wire types
//! - [`client_auth`] - Client authentication (Basic / body / public)

pub mod client_auth;
pub mod code;
pub mod pkce;
pub mod request;

pub use client_auth::{
    AuthenticatedClient, authenticate_client, generate_client_secret, hash_client_secret,
    parse_basic_auth, verify_client_secret,
};
pub use code::AuthorizationCode;
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use request::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
