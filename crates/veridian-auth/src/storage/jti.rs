//! JTI replay-suppression storage trait.
//!
//! Device proofs carry a one-time nonce (`jti`). This trait tracks
//! which nonces have been accepted so a captured proof cannot be
//! replayed inside its timestamp window.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage trait for nonce replay suppression.
///
/// Entries only need to live for the replay window (at least the
/// proof timestamp tolerance); after `expires_at` they are garbage.
#[async_trait]
pub trait JtiStorage: Send + Sync {
    /// Atomically marks a `jti` as used if not already used.
    ///
    /// The check and the mark must be one step - a conditional insert
    /// (`INSERT ... ON CONFLICT DO NOTHING`) - so two proofs carrying
    /// the same nonce racing through verification cannot both pass.
    ///
    /// # Returns
    ///
    /// `true` on first use, `false` if the nonce was already seen
    /// (replay detected).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;

    /// Checks whether a `jti` has been seen, without marking it.
    ///
    /// Used as a cheap early rejection; the authoritative decision is
    /// always the atomic [`Self::mark_used`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_used(&self, jti: &str) -> AuthResult<bool>;

    /// Deletes entries whose `expires_at` has passed.
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
