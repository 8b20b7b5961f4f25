//! Login failure tracking, CAPTCHA gating, and lockout.
//!
//! The tracker composes two layers: a fast cache that gates live
//! requests and a durable store that is the fallback and system of
//! record. The fail-open/fail-closed policy lives entirely in this
//! module:
//!
//! - fast cache unreachable → degrade to the durable store (safe)
//! - durable store unreachable during a security decision → fail
//!   closed, never "treat as success"
//!
//! A cache/store divergence only ever delays lockout (a false negative
//! on one read); it can never bypass it, because every decision
//! consults the durable store when the cache cannot answer.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditEvent, AuditKind};
use crate::config::LockoutConfig;
use crate::storage::login_attempt::{FailureCache, LoginAttemptStorage, LoginFailureRecord};

/// Decision for an incoming login attempt, made before credentials are
/// compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    /// Proceed with credential verification.
    Allowed,
    /// Proceed only if the request carries a verified CAPTCHA token.
    CaptchaRequired,
    /// Reject outright, even with correct credentials.
    Locked {
        /// When the lock expires.
        until: OffsetDateTime,
    },
}

/// Tracks login failures per subject and drives CAPTCHA/lockout
/// decisions.
///
/// Sole writer of login failure records.
pub struct LoginSecurityTracker {
    cache: Arc<dyn FailureCache>,
    store: Arc<dyn LoginAttemptStorage>,
    config: LockoutConfig,
}

impl LoginSecurityTracker {
    /// Creates a new tracker.
    #[must_use]
    pub fn new(
        cache: Arc<dyn FailureCache>,
        store: Arc<dyn LoginAttemptStorage>,
        config: LockoutConfig,
    ) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    /// Gates an attempt before credential comparison.
    ///
    /// Reads the cache first; on cache failure falls back to the
    /// durable store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if both layers are unreachable - the
    /// caller must fail the attempt closed.
    pub async fn check(&self, subject_id: Uuid) -> AuthResult<LoginGate> {
        let record = self.read_record(subject_id).await?;
        let now = OffsetDateTime::now_utc();

        let Some(record) = record else {
            return Ok(LoginGate::Allowed);
        };

        if record.is_locked(now) {
            AuditEvent::new(AuditKind::LockoutRejected)
                .subject(crate::types::Subject::User(subject_id))
                .detail("failure_count", record.failure_count.to_string())
                .record();
            return Ok(LoginGate::Locked {
                until: record.locked_until.unwrap_or(now),
            });
        }

        if record.failure_count >= self.config.captcha_threshold {
            return Ok(LoginGate::CaptchaRequired);
        }

        Ok(LoginGate::Allowed)
    }

    /// Records a failed attempt and applies thresholds.
    ///
    /// Returns the gate that now applies (so callers can shape the
    /// response): `Locked` when this failure crossed the lock
    /// threshold, `CaptchaRequired` past the CAPTCHA threshold,
    /// `Allowed` otherwise.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the durable store cannot record the
    /// failure. The cache being unreachable is not an error: the
    /// durable store alone still enforces lockout, degraded but safe.
    pub async fn record_failure(&self, subject_id: Uuid) -> AuthResult<LoginGate> {
        let now = OffsetDateTime::now_utc();

        // Durable store is the system of record; its failure is the
        // caller's failure.
        let record = self.store.increment(subject_id, now).await?;

        // Cache is best-effort; divergence only delays gating until
        // the next durable read.
        if let Err(e) = self.cache.increment(subject_id, now).await {
            tracing::warn!(error = %e, "Failure cache unreachable; counting on durable store only");
        }

        AuditEvent::new(AuditKind::LoginFailed)
            .subject(crate::types::Subject::User(subject_id))
            .detail("failure_count", record.failure_count.to_string())
            .record();

        if record.failure_count >= self.config.lock_threshold {
            let until = now + Duration::seconds(self.config.lock_duration.as_secs() as i64);
            let reason = "failure_threshold";

            self.store.set_lock(subject_id, until, reason).await?;
            if let Err(e) = self.cache.set_lock(subject_id, until, reason).await {
                tracing::warn!(error = %e, "Failure cache unreachable while locking");
            }

            tracing::warn!(subject_id = %subject_id, %until, "Account locked after repeated login failures");
            AuditEvent::new(AuditKind::AccountLocked)
                .subject(crate::types::Subject::User(subject_id))
                .detail("locked_until", until.to_string())
                .record();

            return Ok(LoginGate::Locked { until });
        }

        if record.failure_count >= self.config.captcha_threshold {
            return Ok(LoginGate::CaptchaRequired);
        }

        Ok(LoginGate::Allowed)
    }

    /// Records a successful authentication: resets both layers to zero
    /// failures and unlocked.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the durable store cannot be reset.
    pub async fn record_success(&self, subject_id: Uuid) -> AuthResult<()> {
        self.store.reset(subject_id).await?;
        if let Err(e) = self.cache.reset(subject_id).await {
            tracing::warn!(error = %e, "Failure cache unreachable during reset");
        }

        AuditEvent::new(AuditKind::LoginSucceeded)
            .subject(crate::types::Subject::User(subject_id))
            .record();
        Ok(())
    }

    /// Cache-first read with durable fallback.
    async fn read_record(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>> {
        match self.cache.get(subject_id).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                // Cache miss is authoritative only if the store agrees;
                // a cold cache must not unlock a locked account.
                self.store.get(subject_id).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failure cache unreachable; falling back to durable store");
                self.store.get(subject_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Shared map-backed layer used for both cache and store mocks,
    /// with a switch to simulate unavailability.
    #[derive(Default)]
    struct MockLayer {
        records: Mutex<HashMap<Uuid, LoginFailureRecord>>,
        unavailable: AtomicBool,
    }

    impl MockLayer {
        fn check_available(&self) -> AuthResult<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(AuthError::storage("layer unavailable"))
            } else {
                Ok(())
            }
        }

        fn get_impl(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>> {
            self.check_available()?;
            Ok(self.records.lock().unwrap().get(&subject_id).cloned())
        }

        fn increment_impl(
            &self,
            subject_id: Uuid,
            now: OffsetDateTime,
        ) -> AuthResult<LoginFailureRecord> {
            self.check_available()?;
            let mut records = self.records.lock().unwrap();
            let record = records
                .entry(subject_id)
                .or_insert_with(|| LoginFailureRecord::empty(subject_id));
            record.failure_count += 1;
            record.last_failure_at = Some(now);
            Ok(record.clone())
        }

        fn set_lock_impl(
            &self,
            subject_id: Uuid,
            locked_until: OffsetDateTime,
            reason: &str,
        ) -> AuthResult<()> {
            self.check_available()?;
            let mut records = self.records.lock().unwrap();
            let record = records
                .entry(subject_id)
                .or_insert_with(|| LoginFailureRecord::empty(subject_id));
            record.locked_until = Some(locked_until);
            record.lock_reason = Some(reason.to_string());
            Ok(())
        }

        fn reset_impl(&self, subject_id: Uuid) -> AuthResult<()> {
            self.check_available()?;
            self.records
                .lock()
                .unwrap()
                .insert(subject_id, LoginFailureRecord::empty(subject_id));
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl FailureCache for MockLayer {
        async fn get(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>> {
            self.get_impl(subject_id)
        }
        async fn increment(
            &self,
            subject_id: Uuid,
            now: OffsetDateTime,
        ) -> AuthResult<LoginFailureRecord> {
            self.increment_impl(subject_id, now)
        }
        async fn set_lock(
            &self,
            subject_id: Uuid,
            locked_until: OffsetDateTime,
            reason: &str,
        ) -> AuthResult<()> {
            self.set_lock_impl(subject_id, locked_until, reason)
        }
        async fn reset(&self, subject_id: Uuid) -> AuthResult<()> {
            self.reset_impl(subject_id)
        }
    }

    #[async_trait::async_trait]
    impl LoginAttemptStorage for MockLayer {
        async fn get(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>> {
            self.get_impl(subject_id)
        }
        async fn increment(
            &self,
            subject_id: Uuid,
            now: OffsetDateTime,
        ) -> AuthResult<LoginFailureRecord> {
            self.increment_impl(subject_id, now)
        }
        async fn set_lock(
            &self,
            subject_id: Uuid,
            locked_until: OffsetDateTime,
            reason: &str,
        ) -> AuthResult<()> {
            self.set_lock_impl(subject_id, locked_until, reason)
        }
        async fn reset(&self, subject_id: Uuid) -> AuthResult<()> {
            self.reset_impl(subject_id)
        }
    }

    fn tracker() -> (LoginSecurityTracker, Arc<MockLayer>, Arc<MockLayer>) {
        let cache = Arc::new(MockLayer::default());
        let store = Arc::new(MockLayer::default());
        let tracker =
            LoginSecurityTracker::new(cache.clone(), store.clone(), LockoutConfig::default());
        (tracker, cache, store)
    }

    #[tokio::test]
    async fn test_clean_subject_is_allowed() {
        let (tracker, _, _) = tracker();
        let gate = tracker.check(Uuid::new_v4()).await.unwrap();
        assert_eq!(gate, LoginGate::Allowed);
    }

    #[tokio::test]
    async fn test_captcha_threshold() {
        let (tracker, _, _) = tracker();
        let subject = Uuid::new_v4();

        // Defaults: captcha at 5, lock at 10.
        for _ in 0..4 {
            assert_eq!(
                tracker.record_failure(subject).await.unwrap(),
                LoginGate::Allowed
            );
        }
        assert_eq!(
            tracker.record_failure(subject).await.unwrap(),
            LoginGate::CaptchaRequired
        );
        assert_eq!(
            tracker.check(subject).await.unwrap(),
            LoginGate::CaptchaRequired
        );
    }

    #[tokio::test]
    async fn test_lockout_determinism() {
        let (tracker, _, _) = tracker();
        let subject = Uuid::new_v4();

        // The 10th consecutive failure locks the account.
        for i in 1..=9 {
            let gate = tracker.record_failure(subject).await.unwrap();
            assert!(
                !matches!(gate, LoginGate::Locked { .. }),
                "locked too early at failure {i}"
            );
        }
        let gate = tracker.record_failure(subject).await.unwrap();
        assert!(matches!(gate, LoginGate::Locked { .. }));

        // Attempt 11 is rejected before credentials are even compared.
        assert!(matches!(
            tracker.check(subject).await.unwrap(),
            LoginGate::Locked { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_lock_allows_and_success_resets() {
        let (tracker, cache, store) = tracker();
        let subject = Uuid::new_v4();

        for _ in 0..10 {
            tracker.record_failure(subject).await.unwrap();
        }

        // Rewind the lock so it has elapsed.
        let past = OffsetDateTime::now_utc() - Duration::seconds(1);
        store.set_lock_impl(subject, past, "failure_threshold").unwrap();
        cache.set_lock_impl(subject, past, "failure_threshold").unwrap();

        // Expired lock gates on CAPTCHA (counter still high), not Locked.
        assert_eq!(
            tracker.check(subject).await.unwrap(),
            LoginGate::CaptchaRequired
        );

        // A success resets both layers to zero/unlocked.
        tracker.record_success(subject).await.unwrap();
        assert_eq!(tracker.check(subject).await.unwrap(), LoginGate::Allowed);
        assert_eq!(
            store.get_impl(subject).unwrap().unwrap().failure_count,
            0
        );
        assert_eq!(
            cache.get_impl(subject).unwrap().unwrap().failure_count,
            0
        );
    }

    #[tokio::test]
    async fn test_cache_outage_degrades_to_store() {
        let (tracker, cache, _) = tracker();
        let subject = Uuid::new_v4();

        cache.unavailable.store(true, Ordering::SeqCst);

        // Failures still count via the durable store.
        for _ in 0..10 {
            tracker.record_failure(subject).await.unwrap();
        }

        // Lockout still enforced with the cache down.
        assert!(matches!(
            tracker.check(subject).await.unwrap(),
            LoginGate::Locked { .. }
        ));
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let (tracker, _, store) = tracker();
        let subject = Uuid::new_v4();

        store.unavailable.store(true, Ordering::SeqCst);

        // Recording a failure needs the system of record.
        assert!(tracker.record_failure(subject).await.is_err());
    }

    #[tokio::test]
    async fn test_both_layers_down_check_fails_closed() {
        let (tracker, cache, store) = tracker();
        let subject = Uuid::new_v4();

        cache.unavailable.store(true, Ordering::SeqCst);
        store.unavailable.store(true, Ordering::SeqCst);

        assert!(tracker.check(subject).await.is_err());
    }

    #[tokio::test]
    async fn test_cold_cache_does_not_unlock() {
        let (tracker, _, store) = tracker();
        let subject = Uuid::new_v4();

        // Lock exists only in the durable store (e.g. cache restarted).
        let until = OffsetDateTime::now_utc() + Duration::minutes(10);
        store.increment_impl(subject, OffsetDateTime::now_utc()).unwrap();
        store.set_lock_impl(subject, until, "failure_threshold").unwrap();

        assert!(matches!(
            tracker.check(subject).await.unwrap(),
            LoginGate::Locked { .. }
        ));
    }
}
