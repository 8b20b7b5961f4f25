//! Refresh token ledger: issue, rotate, detect reuse, revoke families.
//!
//! A refresh token family represents one continuous login session.
//! Presenting a family member that is no longer ACTIVE is treated as
//! evidence of theft and collapses the whole family: an attacker and
//! the legitimate holder racing to use the same token both eventually
//! present a non-ACTIVE token, revoking the session for both parties
//! instead of letting either keep access.
//!
//! # Concurrency
//!
//! The rotation step is a conditional storage update
//! ([`RefreshTokenStorage::transition_status`]) that only succeeds if
//! the token is still ACTIVE. Of two concurrent presenters of the same
//! token, exactly one wins the transition; the loser observes the
//! post-transition state and takes the reuse path. There is no
//! separate read-check-write window.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditEvent, AuditKind};
use crate::config::OAuthConfig;
use crate::error::{AuthError, RefreshFailure};
use crate::storage::RefreshTokenStorage;
use crate::types::{
    Client, RefreshPolicy, RefreshToken, RefreshTokenStatus, RevokeReason, Subject,
};

/// Outcome of a successful rotation.
#[derive(Debug)]
pub struct RotationOutcome {
    /// The token value to hand back to the client. Under rotating
    /// policy this is a fresh value; under sliding policy it is absent
    /// because the presented token remains valid.
    pub new_value: Option<String>,

    /// The record that now anchors the session: the replacement token
    /// (rotating) or the extended original (sliding).
    pub token: RefreshToken,
}

/// The refresh token ledger.
///
/// Sole writer of refresh token records.
pub struct RefreshTokenLedger {
    storage: Arc<dyn RefreshTokenStorage>,
    config: OAuthConfig,
}

impl RefreshTokenLedger {
    /// Creates a new ledger.
    #[must_use]
    pub fn new(storage: Arc<dyn RefreshTokenStorage>, config: OAuthConfig) -> Self {
        Self { storage, config }
    }

    /// Issues a new refresh token family for a fresh login.
    ///
    /// Returns the plaintext token value (handed to the client exactly
    /// once) and the stored record.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be persisted.
    pub async fn issue_family(
        &self,
        subject: Subject,
        organization_id: Uuid,
        client: &Client,
        scope: &str,
    ) -> AuthResult<(String, RefreshToken)> {
        let now = OffsetDateTime::now_utc();
        let lifetime = self.refresh_lifetime(client);

        let value = RefreshToken::generate_value();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            token_hash: RefreshToken::hash_value(&value),
            client_id: client.client_id.clone(),
            subject,
            organization_id,
            scope: scope.to_string(),
            status: RefreshTokenStatus::Active,
            created_at: now,
            expires_at: now + lifetime,
            last_seen_at: None,
            revoked_at: None,
            revoke_reason: None,
        };

        self.storage.create(&token).await?;

        AuditEvent::new(AuditKind::RefreshFamilyIssued)
            .subject(subject)
            .client(&token.client_id)
            .detail("family_id", token.family_id.to_string())
            .record();

        Ok((value, token))
    }

    /// Rotates a presented refresh token.
    ///
    /// The §4.3 state machine:
    ///
    /// 1. Unknown value → `invalid_refresh_token` (not found)
    /// 2. Expired → `invalid_refresh_token` (expired)
    /// 3. Non-ACTIVE status → reuse: revoke the whole family, then
    ///    `invalid_refresh_token` (reuse)
    /// 4. Otherwise rotate (or slide, per client policy)
    ///
    /// The three failures are externally indistinguishable; only the
    /// audit trail records which condition fired.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRefreshToken` per the state machine,
    /// or a storage error. Reuse detection is never retried: a storage
    /// failure mid-decision propagates as-is (fail closed).
    pub async fn rotate(&self, presented_value: &str, client: &Client) -> AuthResult<RotationOutcome> {
        let hash = RefreshToken::hash_value(presented_value);

        let token = match self.storage.find_by_hash(&hash).await? {
            Some(token) => token,
            None => {
                AuditEvent::new(AuditKind::RefreshRejected)
                    .client(&client.client_id)
                    .detail("reason", RefreshFailure::NotFound.to_string())
                    .record();
                return Err(AuthError::invalid_refresh_token(RefreshFailure::NotFound));
            }
        };

        // A token presented by the wrong client is handled like an
        // unknown token; confirming its existence would aid an attacker.
        if token.client_id != client.client_id {
            AuditEvent::new(AuditKind::RefreshRejected)
                .subject(token.subject)
                .client(&client.client_id)
                .detail("reason", "client_mismatch")
                .record();
            return Err(AuthError::invalid_refresh_token(RefreshFailure::NotFound));
        }

        if token.is_expired() {
            AuditEvent::new(AuditKind::RefreshRejected)
                .subject(token.subject)
                .client(&client.client_id)
                .detail("reason", RefreshFailure::Expired.to_string())
                .record();
            return Err(AuthError::invalid_refresh_token(RefreshFailure::Expired));
        }

        if token.status != RefreshTokenStatus::Active {
            return self.handle_reuse(&token).await;
        }

        match client.refresh_policy {
            RefreshPolicy::Rotate => self.rotate_token(token).await,
            RefreshPolicy::Sliding => self.slide_token(token, client).await,
        }
    }

    /// Revokes the family of a presented token value.
    ///
    /// Used by the revocation endpoint. Unknown values are a no-op so
    /// the endpoint cannot be used to probe for valid tokens.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup or revocation fails.
    pub async fn revoke_by_value(&self, presented_value: &str, reason: RevokeReason) -> AuthResult<()> {
        let hash = RefreshToken::hash_value(presented_value);
        let Some(token) = self.storage.find_by_hash(&hash).await? else {
            return Ok(());
        };

        let revoked = self.storage.revoke_family(token.family_id, reason).await?;

        AuditEvent::new(AuditKind::RefreshFamilyRevoked)
            .subject(token.subject)
            .client(&token.client_id)
            .detail("family_id", token.family_id.to_string())
            .detail("reason", reason.as_str())
            .detail("revoked_count", revoked.to_string())
            .record();

        Ok(())
    }

    /// Looks up the current record behind a presented value, without
    /// state changes. Used by introspection.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub async fn peek(&self, presented_value: &str) -> AuthResult<Option<RefreshToken>> {
        let hash = RefreshToken::hash_value(presented_value);
        self.storage.find_by_hash(&hash).await
    }

    /// Reuse path: collapse the family, then report failure.
    async fn handle_reuse(&self, token: &RefreshToken) -> AuthResult<RotationOutcome> {
        let revoked = self
            .storage
            .revoke_family(token.family_id, RevokeReason::ReuseDetected)
            .await?;

        tracing::warn!(
            family_id = %token.family_id,
            client_id = %token.client_id,
            status = token.status.as_str(),
            "Refresh token reuse detected; family revoked"
        );
        AuditEvent::new(AuditKind::RefreshReuseDetected)
            .subject(token.subject)
            .client(&token.client_id)
            .detail("family_id", token.family_id.to_string())
            .detail("presented_status", token.status.as_str())
            .detail("revoked_count", revoked.to_string())
            .record();

        Err(AuthError::invalid_refresh_token(RefreshFailure::Reuse))
    }

    /// Rotating policy: mint a replacement id, mark the old ROTATED.
    async fn rotate_token(&self, token: RefreshToken) -> AuthResult<RotationOutcome> {
        let won = self
            .storage
            .transition_status(
                token.id,
                RefreshTokenStatus::Active,
                RefreshTokenStatus::Rotated,
            )
            .await?;

        if !won {
            // Lost the race: someone else transitioned this token
            // between our read and our conditional write. Re-read and
            // treat as reuse.
            let current = self
                .storage
                .find_by_id(token.id)
                .await?
                .unwrap_or(token);
            return self.handle_reuse(&current).await;
        }

        let now = OffsetDateTime::now_utc();
        let value = RefreshToken::generate_value();
        let replacement = RefreshToken {
            id: Uuid::new_v4(),
            family_id: token.family_id,
            token_hash: RefreshToken::hash_value(&value),
            client_id: token.client_id.clone(),
            subject: token.subject,
            organization_id: token.organization_id,
            scope: token.scope.clone(),
            status: RefreshTokenStatus::Active,
            created_at: now,
            expires_at: now + self.config_lifetime(),
            last_seen_at: None,
            revoked_at: None,
            revoke_reason: None,
        };
        self.storage.create(&replacement).await?;

        AuditEvent::new(AuditKind::RefreshRotated)
            .subject(replacement.subject)
            .client(&replacement.client_id)
            .detail("family_id", replacement.family_id.to_string())
            .record();

        Ok(RotationOutcome {
            new_value: Some(value),
            token: replacement,
        })
    }

    /// Sliding policy: extend the same id's expiry in place, capped at
    /// the hard maximum lifetime from creation.
    async fn slide_token(&self, token: RefreshToken, client: &Client) -> AuthResult<RotationOutcome> {
        let now = OffsetDateTime::now_utc();
        let hard_cap = token.created_at + duration_from_std(self.config.refresh_max_lifetime);
        let extended = (now + self.refresh_lifetime(client)).min(hard_cap);

        let won = self
            .storage
            .extend_expiry(token.id, RefreshTokenStatus::Active, extended)
            .await?;

        if !won {
            let current = self
                .storage
                .find_by_id(token.id)
                .await?
                .unwrap_or(token);
            return self.handle_reuse(&current).await;
        }

        AuditEvent::new(AuditKind::RefreshRotated)
            .subject(token.subject)
            .client(&token.client_id)
            .detail("family_id", token.family_id.to_string())
            .detail("mode", "sliding")
            .record();

        let token = RefreshToken {
            expires_at: extended,
            last_seen_at: Some(now),
            ..token
        };
        Ok(RotationOutcome {
            new_value: None,
            token,
        })
    }

    fn refresh_lifetime(&self, client: &Client) -> Duration {
        client
            .refresh_token_lifetime
            .map(Duration::seconds)
            .unwrap_or_else(|| self.config_lifetime())
    }

    fn config_lifetime(&self) -> Duration {
        duration_from_std(self.config.refresh_token_lifetime)
    }
}

fn duration_from_std(d: std::time::Duration) -> Duration {
    Duration::seconds(d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GrantType;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-test storage with the same conditional-update semantics the
    /// trait demands.
    #[derive(Default)]
    struct MockRefreshStorage {
        tokens: Mutex<HashMap<Uuid, RefreshToken>>,
    }

    #[async_trait::async_trait]
    impl RefreshTokenStorage for MockRefreshStorage {
        async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
            self.tokens.lock().unwrap().insert(token.id, token.clone());
            Ok(())
        }

        async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
            Ok(self
                .tokens
                .lock()
                .unwrap()
                .values()
                .find(|t| t.token_hash == token_hash)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshToken>> {
            Ok(self.tokens.lock().unwrap().get(&id).cloned())
        }

        async fn transition_status(
            &self,
            id: Uuid,
            expected: RefreshTokenStatus,
            next: RefreshTokenStatus,
        ) -> AuthResult<bool> {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(&id) {
                Some(token) if token.status == expected => {
                    token.status = next;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn extend_expiry(
            &self,
            id: Uuid,
            expected: RefreshTokenStatus,
            new_expires_at: OffsetDateTime,
        ) -> AuthResult<bool> {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(&id) {
                Some(token) if token.status == expected => {
                    token.expires_at = new_expires_at;
                    token.last_seen_at = Some(OffsetDateTime::now_utc());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn revoke_family(
            &self,
            family_id: Uuid,
            reason: RevokeReason,
        ) -> AuthResult<u64> {
            let mut tokens = self.tokens.lock().unwrap();
            let now = OffsetDateTime::now_utc();
            let mut count = 0;
            for token in tokens.values_mut() {
                if token.family_id == family_id && token.status != RefreshTokenStatus::Revoked {
                    token.status = RefreshTokenStatus::Revoked;
                    token.revoked_at = Some(now);
                    token.revoke_reason = Some(reason);
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn find_family(&self, family_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
            let mut family: Vec<_> = self
                .tokens
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.family_id == family_id)
                .cloned()
                .collect();
            family.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(family)
        }

        async fn cleanup_expired(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
            let mut tokens = self.tokens.lock().unwrap();
            let before = tokens.len();
            tokens.retain(|_, t| t.expires_at >= cutoff);
            Ok((before - tokens.len()) as u64)
        }
    }

    fn client(policy: RefreshPolicy) -> Client {
        Client {
            client_id: "web-app".to_string(),
            secret_hash: None,
            name: "Web App".to_string(),
            organization_id: Uuid::new_v4(),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            scopes: vec![],
            confidential: false,
            first_party: false,
            active: true,
            refresh_policy: policy,
            access_token_lifetime: None,
            refresh_token_lifetime: None,
        }
    }

    fn ledger() -> (RefreshTokenLedger, Arc<MockRefreshStorage>) {
        let storage = Arc::new(MockRefreshStorage::default());
        let ledger = RefreshTokenLedger::new(storage.clone(), OAuthConfig::default());
        (ledger, storage)
    }

    #[tokio::test]
    async fn test_issue_family() {
        let (ledger, storage) = ledger();
        let client = client(RefreshPolicy::Rotate);
        let subject = Subject::User(Uuid::new_v4());

        let (value, token) = ledger
            .issue_family(subject, client.organization_id, &client, "openid")
            .await
            .unwrap();

        assert_eq!(value.len(), 43);
        assert_eq!(token.status, RefreshTokenStatus::Active);
        assert_eq!(token.token_hash, RefreshToken::hash_value(&value));

        let stored = storage.find_by_id(token.id).await.unwrap().unwrap();
        assert_eq!(stored.family_id, token.family_id);
    }

    #[tokio::test]
    async fn test_rotate_happy_path() {
        let (ledger, _) = ledger();
        let client = client(RefreshPolicy::Rotate);
        let subject = Subject::User(Uuid::new_v4());

        let (value, original) = ledger
            .issue_family(subject, client.organization_id, &client, "openid")
            .await
            .unwrap();

        let outcome = ledger.rotate(&value, &client).await.unwrap();
        let new_value = outcome.new_value.expect("rotating policy mints a value");
        assert_ne!(new_value, value);
        assert_eq!(outcome.token.family_id, original.family_id);
        assert_ne!(outcome.token.id, original.id);

        // The replacement rotates again just fine.
        assert!(ledger.rotate(&new_value, &client).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotated_token_never_succeeds_twice() {
        let (ledger, _) = ledger();
        let client = client(RefreshPolicy::Rotate);

        let (value, _) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        ledger.rotate(&value, &client).await.unwrap();

        // Second presentation of the now-ROTATED value is reuse.
        let err = ledger.rotate(&value, &client).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::Reuse
            }
        ));
    }

    #[tokio::test]
    async fn test_reuse_collapses_whole_family() {
        let (ledger, storage) = ledger();
        let client = client(RefreshPolicy::Rotate);

        let (v1, original) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        // Build a chain: v1 -> v2 -> v3.
        let v2 = ledger.rotate(&v1, &client).await.unwrap().new_value.unwrap();
        let v3 = ledger.rotate(&v2, &client).await.unwrap().new_value.unwrap();

        // Replaying v1 collapses everything, including the current v3.
        let err = ledger.rotate(&v1, &client).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::Reuse
            }
        ));

        let family = storage.find_family(original.family_id).await.unwrap();
        assert_eq!(family.len(), 3);
        assert!(
            family
                .iter()
                .all(|t| t.status == RefreshTokenStatus::Revoked)
        );
        assert!(
            family
                .iter()
                .all(|t| t.revoke_reason == Some(RevokeReason::ReuseDetected))
        );

        // Any further presentation of any member fails the same way.
        let err = ledger.rotate(&v3, &client).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::Reuse
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let (ledger, _) = ledger();
        let client = client(RefreshPolicy::Rotate);

        let err = ledger.rotate("never-issued", &client).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::NotFound
            }
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (ledger, storage) = ledger();
        let client = client(RefreshPolicy::Rotate);

        let (value, token) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        // Force expiry.
        {
            let mut tokens = storage.tokens.lock().unwrap();
            tokens.get_mut(&token.id).unwrap().expires_at =
                OffsetDateTime::now_utc() - Duration::minutes(1);
        }

        let err = ledger.rotate(&value, &client).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::Expired
            }
        ));
    }

    #[tokio::test]
    async fn test_client_mismatch_looks_like_not_found() {
        let (ledger, _) = ledger();
        let owner = client(RefreshPolicy::Rotate);
        let mut other = client(RefreshPolicy::Rotate);
        other.client_id = "other-app".to_string();

        let (value, _) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                owner.organization_id,
                &owner,
                "openid",
            )
            .await
            .unwrap();

        let err = ledger.rotate(&value, &other).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::NotFound
            }
        ));
    }

    #[tokio::test]
    async fn test_sliding_policy_extends_same_id() {
        let (ledger, _) = ledger();
        let client = client(RefreshPolicy::Sliding);

        let (value, original) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        let first = ledger.rotate(&value, &client).await.unwrap();
        assert!(first.new_value.is_none());
        assert_eq!(first.token.id, original.id);
        assert!(first.token.expires_at >= original.expires_at);

        // Same value keeps working under sliding policy.
        let second = ledger.rotate(&value, &client).await.unwrap();
        assert_eq!(second.token.id, original.id);
    }

    #[tokio::test]
    async fn test_sliding_never_exceeds_hard_cap() {
        let (ledger, storage) = ledger();
        let client = client(RefreshPolicy::Sliding);

        let (value, original) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        let hard_cap = original.created_at
            + Duration::seconds(OAuthConfig::default().refresh_max_lifetime.as_secs() as i64);

        for _ in 0..5 {
            let outcome = ledger.rotate(&value, &client).await.unwrap();
            assert!(outcome.token.expires_at <= hard_cap);
        }

        let stored = storage.find_by_id(original.id).await.unwrap().unwrap();
        assert!(stored.expires_at <= hard_cap);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_exactly_one_winner() {
        // Both callers fetch the token as ACTIVE, then race the CAS.
        let (ledger, storage) = ledger();
        let client = client(RefreshPolicy::Rotate);

        let (value, token) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        // Simulate the loser's interleaving: the winner's transition
        // lands first, then the loser attempts the same conditional
        // update and must observe defeat.
        let won_first = storage
            .transition_status(
                token.id,
                RefreshTokenStatus::Active,
                RefreshTokenStatus::Rotated,
            )
            .await
            .unwrap();
        assert!(won_first);

        let won_second = storage
            .transition_status(
                token.id,
                RefreshTokenStatus::Active,
                RefreshTokenStatus::Rotated,
            )
            .await
            .unwrap();
        assert!(!won_second);

        // The loser's full rotate() path lands on reuse and collapses
        // the family.
        let err = ledger.rotate(&value, &client).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRefreshToken {
                reason: RefreshFailure::Reuse
            }
        ));
    }

    #[tokio::test]
    async fn test_revoke_by_value_is_enumeration_safe() {
        let (ledger, storage) = ledger();
        let client = client(RefreshPolicy::Rotate);

        // Unknown values succeed silently.
        assert!(
            ledger
                .revoke_by_value("unknown", RevokeReason::ClientRequest)
                .await
                .is_ok()
        );

        let (value, token) = ledger
            .issue_family(
                Subject::User(Uuid::new_v4()),
                client.organization_id,
                &client,
                "openid",
            )
            .await
            .unwrap();

        ledger
            .revoke_by_value(&value, RevokeReason::ClientRequest)
            .await
            .unwrap();

        let stored = storage.find_by_id(token.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RefreshTokenStatus::Revoked);
        assert_eq!(stored.revoke_reason, Some(RevokeReason::ClientRequest));
    }
}
