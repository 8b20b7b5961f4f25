//! Refresh token storage trait.
//!
//! The ledger's reuse-detection correctness rests on one storage
//! primitive: [`RefreshTokenStorage::transition_status`], a conditional
//! update that only succeeds when the row's status still matches the
//! expected pre-state. Two callers racing to rotate the same token both
//! issue the same conditional update; exactly one wins, the other
//! observes the post-transition state and is treated as reuse.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{RefreshToken, RefreshTokenStatus, RevokeReason};

/// Storage trait for refresh token families.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by the SHA-256 hash of its value.
    ///
    /// Returns the record regardless of status or expiry; the ledger
    /// inspects the record itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Finds a refresh token by its record id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshToken>>;

    /// Conditionally transitions a token's status.
    ///
    /// The update succeeds only if the row's current status equals
    /// `expected`; otherwise no write happens. Implementations must
    /// make the check and the write one atomic step (e.g.
    /// `UPDATE ... SET status = $next WHERE id = $id AND status = $expected`).
    ///
    /// # Returns
    ///
    /// `true` if this caller performed the transition, `false` if the
    /// precondition no longer held.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: RefreshTokenStatus,
        next: RefreshTokenStatus,
    ) -> AuthResult<bool>;

    /// Conditionally extends a token's expiry in place (sliding mode).
    ///
    /// Same atomicity contract as [`Self::transition_status`]: the
    /// write only happens if the row is still in `expected` status,
    /// and it also updates `last_seen_at`.
    ///
    /// # Returns
    ///
    /// `true` if the expiry was extended, `false` if the precondition
    /// no longer held.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn extend_expiry(
        &self,
        id: Uuid,
        expected: RefreshTokenStatus,
        new_expires_at: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Revokes every token in a family, whatever its current status.
    ///
    /// Sets status REVOKED, `revoked_at` and the reason on all family
    /// members. Idempotent: already-revoked members keep their
    /// original revocation data.
    ///
    /// # Returns
    ///
    /// The number of tokens newly revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_family(&self, family_id: Uuid, reason: RevokeReason) -> AuthResult<u64>;

    /// Lists all tokens of a family, newest first.
    ///
    /// Used by audit and session-management surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_family(&self, family_id: Uuid) -> AuthResult<Vec<RefreshToken>>;

    /// Deletes tokens that expired before `cutoff`.
    ///
    /// Returns the number of tokens deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self, cutoff: OffsetDateTime) -> AuthResult<u64>;
}
