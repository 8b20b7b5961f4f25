//! Signing key storage trait.
//!
//! The key manager's core invariant - at most one ACTIVE key - is
//! enforced here: `insert_active` is a conditional insert that fails
//! when an ACTIVE key already exists, so two instances racing through
//! `ensure_active_key()` cannot both provision one.

use async_trait::async_trait;

use crate::AuthResult;
use crate::keys::SigningKeyRecord;

/// Storage trait for signing key records.
#[async_trait]
pub trait KeyStorage: Send + Sync {
    /// Inserts a new key as ACTIVE, only if no ACTIVE key exists.
    ///
    /// Implementations must make the existence check and the insert
    /// one atomic step (a partial unique index on `status = 'active'`
    /// is the canonical shape).
    ///
    /// # Returns
    ///
    /// `true` if the key was inserted as ACTIVE, `false` if another
    /// ACTIVE key was already present (the caller should re-read).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn insert_active(&self, record: &SigningKeyRecord) -> AuthResult<bool>;

    /// Returns the current ACTIVE key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_active(&self) -> AuthResult<Option<SigningKeyRecord>>;

    /// Returns all keys still relevant for verification: the ACTIVE
    /// key plus RETIRED keys that may have outstanding tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn verification_set(&self) -> AuthResult<Vec<SigningKeyRecord>>;

    /// Atomically retires the current ACTIVE key and installs the
    /// given record as the new ACTIVE key.
    ///
    /// Both writes happen in one step so there is never a window with
    /// zero or two ACTIVE keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn rotate(&self, new_record: &SigningKeyRecord) -> AuthResult<()>;
}
