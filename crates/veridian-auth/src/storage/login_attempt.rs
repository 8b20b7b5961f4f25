//! Login failure storage traits.
//!
//! The login security tracker composes two layers behind these traits:
//! a fast cache that gates live requests and a durable store that is
//! the system of record. Keeping both behind one shape makes the
//! fail-closed/fail-open policy auditable in a single place
//! (`lockout::LoginSecurityTracker`) instead of scattered branches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// Per-subject login failure state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFailureRecord {
    /// The subject being tracked.
    pub subject_id: Uuid,

    /// Consecutive failure count since the last success.
    pub failure_count: u32,

    /// When the last failure happened.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_failure_at: Option<OffsetDateTime>,

    /// Until when the subject is locked out. A value in the past is
    /// equivalent to unlocked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub locked_until: Option<OffsetDateTime>,

    /// Why the lock was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,
}

impl LoginFailureRecord {
    /// Creates an empty record for a subject.
    #[must_use]
    pub fn empty(subject_id: Uuid) -> Self {
        Self {
            subject_id,
            failure_count: 0,
            last_failure_at: None,
            locked_until: None,
            lock_reason: None,
        }
    }

    /// Returns `true` if the subject is currently locked.
    ///
    /// A `locked_until` in the past counts as unlocked.
    #[must_use]
    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Fast failure-count cache.
///
/// Source of truth for live gating while reachable. Operations must be
/// atomic under concurrent access from multiple handler instances
/// (atomic increment, compare-and-set style writes).
#[async_trait]
pub trait FailureCache: Send + Sync {
    /// Reads the cached record for a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable; callers fall back
    /// to the durable store.
    async fn get(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>>;

    /// Atomically increments the failure count and returns the updated
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    async fn increment(&self, subject_id: Uuid, now: OffsetDateTime) -> AuthResult<LoginFailureRecord>;

    /// Records a lock on the subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    async fn set_lock(
        &self,
        subject_id: Uuid,
        locked_until: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<()>;

    /// Resets the subject to zero failures and unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    async fn reset(&self, subject_id: Uuid) -> AuthResult<()>;
}

/// Durable failure-record store.
///
/// Fallback when the cache is unavailable and the system of record for
/// audit. A durable-store failure during a security decision fails the
/// request closed.
#[async_trait]
pub trait LoginAttemptStorage: Send + Sync {
    /// Reads the stored record for a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>>;

    /// Atomically increments the failure count and returns the updated
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn increment(&self, subject_id: Uuid, now: OffsetDateTime) -> AuthResult<LoginFailureRecord>;

    /// Records a lock on the subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn set_lock(
        &self,
        subject_id: Uuid,
        locked_until: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<()>;

    /// Resets the subject to zero failures and unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn reset(&self, subject_id: Uuid) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_empty_record() {
        let id = Uuid::new_v4();
        let record = LoginFailureRecord::empty(id);
        assert_eq!(record.subject_id, id);
        assert_eq!(record.failure_count, 0);
        assert!(!record.is_locked(OffsetDateTime::now_utc()));
    }

    #[test]
    fn test_expired_lock_is_unlocked() {
        let now = OffsetDateTime::now_utc();
        let mut record = LoginFailureRecord::empty(Uuid::new_v4());

        record.locked_until = Some(now + Duration::minutes(10));
        assert!(record.is_locked(now));

        // A lock in the past is equivalent to unlocked.
        record.locked_until = Some(now - Duration::seconds(1));
        assert!(!record.is_locked(now));
    }
}
