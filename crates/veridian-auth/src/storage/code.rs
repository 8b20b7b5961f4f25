//! Authorization code storage trait.
//!
//! Authorization codes are single-use by contract. The `consume`
//! operation is the linchpin: it must atomically check the used flag
//! and set it, so that of two concurrent exchanges exactly one
//! succeeds and the other observes the code as already consumed.

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::code::AuthorizationCode;

/// Storage trait for authorization codes.
#[async_trait]
pub trait CodeStorage: Send + Sync {
    /// Stores a freshly issued authorization code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Looks up a code by its value without consuming it.
    ///
    /// Returns the record regardless of consumed/expired state;
    /// callers inspect the record themselves. Provided for
    /// introspection and audit paths, never for the exchange itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>>;

    /// Atomically consumes a code.
    ///
    /// Marks the code used and returns the record, as one conditional
    /// update: the mark only succeeds if the code exists and its used
    /// flag is still clear. A second concurrent consumption must
    /// observe the flag set and fail with `InvalidGrant`, never
    /// silently succeed.
    ///
    /// Expiry is NOT checked here; the caller rejects expired codes
    /// after consumption so the error surface stays uniform.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the code does not exist or
    /// was already consumed, or a storage error if the operation fails.
    async fn consume(&self, code: &str) -> AuthResult<AuthorizationCode>;

    /// Deletes expired codes.
    ///
    /// Returns the number of codes deleted. Called periodically to
    /// bound storage growth.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
