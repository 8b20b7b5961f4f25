//! # veridian-storage-memory
//!
//! In-memory implementations of the `veridian-auth` storage traits.
//!
//! Used by the server in development mode and by integration tests.
//! Each backend honors the atomicity contracts of its trait: the
//! check and the write of every conditional operation happen under one
//! lock acquisition, so the single-use, compare-and-swap, and
//! insert-if-absent guarantees hold under concurrent access exactly as
//! a database backend would provide them with conditional updates.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use veridian_auth::AuthResult;
use veridian_auth::error::AuthError;
use veridian_auth::keys::{KeyStatus, SigningKeyRecord};
use veridian_auth::oauth::AuthorizationCode;
use veridian_auth::storage::login_attempt::LoginFailureRecord;
use veridian_auth::storage::{
    ClientStorage, CodeStorage, Device, DeviceStorage, FailureCache, JtiStorage, KeyStorage,
    LoginAttemptStorage, RefreshTokenStorage, User, UserStorage,
};
use veridian_auth::storage::device::DeviceStatus;
use veridian_auth::types::{Client, RefreshToken, RefreshTokenStatus, RevokeReason};

// =============================================================================
// Clients
// =============================================================================

/// In-memory client registry.
#[derive(Default)]
pub struct MemoryClientStorage {
    clients: RwLock<HashMap<String, Client>>,
}

impl MemoryClientStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStorage for MemoryClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().unwrap().get(client_id).cloned())
    }

    async fn create(&self, client: &Client) -> AuthResult<()> {
        let mut clients = self.clients.write().unwrap();
        if clients.contains_key(&client.client_id) {
            return Err(AuthError::storage("client_id already registered"));
        }
        clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }
}

// =============================================================================
// Users
// =============================================================================

/// In-memory user store.
#[derive(Default)]
pub struct MemoryUserStorage {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStorage for MemoryUserStorage {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        self.users.write().unwrap().insert(user.id, user.clone());
        Ok(())
    }
}

// =============================================================================
// Authorization codes
// =============================================================================

/// In-memory authorization code store with atomic single-use
/// consumption.
#[derive(Default)]
pub struct MemoryCodeStorage {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
}

impl MemoryCodeStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeStorage for MemoryCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        self.codes
            .write()
            .unwrap()
            .insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>> {
        Ok(self.codes.read().unwrap().get(code).cloned())
    }

    async fn consume(&self, code: &str) -> AuthResult<AuthorizationCode> {
        // Check and mark under one write lock: the second of two
        // concurrent consumers sees used_at already set.
        let mut codes = self.codes.write().unwrap();
        let record = codes
            .get_mut(code)
            .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;

        if record.used_at.is_some() {
            return Err(AuthError::invalid_grant("Authorization code already used"));
        }

        record.used_at = Some(OffsetDateTime::now_utc());
        Ok(record.clone())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut codes = self.codes.write().unwrap();
        let before = codes.len();
        codes.retain(|_, c| c.expires_at > now);
        Ok((before - codes.len()) as u64)
    }
}

// =============================================================================
// Refresh tokens
// =============================================================================

/// In-memory refresh token store with conditional status transitions.
#[derive(Default)]
pub struct MemoryRefreshTokenStorage {
    tokens: RwLock<HashMap<Uuid, RefreshToken>>,
}

impl MemoryRefreshTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryRefreshTokenStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        self.tokens.write().unwrap().insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self
            .tokens
            .read()
            .unwrap()
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshToken>> {
        Ok(self.tokens.read().unwrap().get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: RefreshTokenStatus,
        next: RefreshTokenStatus,
    ) -> AuthResult<bool> {
        let mut tokens = self.tokens.write().unwrap();
        match tokens.get_mut(&id) {
            Some(token) if token.status == expected => {
                token.status = next;
                token.last_seen_at = Some(OffsetDateTime::now_utc());
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
        let mut tokens = self.tokens.write().unwrap();
        match tokens.get_mut(&id) {
            Some(token) if token.status == expected => {
                token.expires_at = new_expires_at;
                token.last_seen_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_family(&self, family_id: Uuid, reason: RevokeReason) -> AuthResult<u64> {
        let mut tokens = self.tokens.write().unwrap();
        let now = OffsetDateTime::now_utc();
        let mut revoked = 0;
        for token in tokens.values_mut() {
            if token.family_id == family_id && token.status != RefreshTokenStatus::Revoked {
                token.status = RefreshTokenStatus::Revoked;
                token.revoked_at = Some(now);
                token.revoke_reason = Some(reason);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_family(&self, family_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
        let mut family: Vec<_> = self
            .tokens
            .read()
            .unwrap()
            .values()
            .filter(|t| t.family_id == family_id)
            .cloned()
            .collect();
        family.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(family)
    }

    async fn cleanup_expired(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= cutoff);
        Ok((before - tokens.len()) as u64)
    }
}

// =============================================================================
// Signing keys
// =============================================================================

/// In-memory key store enforcing the single-ACTIVE invariant.
#[derive(Default)]
pub struct MemoryKeyStorage {
    keys: RwLock<HashMap<String, SigningKeyRecord>>,
}

impl MemoryKeyStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStorage for MemoryKeyStorage {
    async fn insert_active(&self, record: &SigningKeyRecord) -> AuthResult<bool> {
        // Existence check and insert under one write lock, mirroring a
        // partial unique index on status = 'active'.
        let mut keys = self.keys.write().unwrap();
        if keys.values().any(|k| k.status == KeyStatus::Active) {
            return Ok(false);
        }
        keys.insert(record.kid.clone(), record.clone());
        Ok(true)
    }

    async fn find_active(&self) -> AuthResult<Option<SigningKeyRecord>> {
        Ok(self
            .keys
            .read()
            .unwrap()
            .values()
            .find(|k| k.status == KeyStatus::Active)
            .cloned())
    }

    async fn verification_set(&self) -> AuthResult<Vec<SigningKeyRecord>> {
        Ok(self.keys.read().unwrap().values().cloned().collect())
    }

    async fn rotate(&self, new_record: &SigningKeyRecord) -> AuthResult<()> {
        let mut keys = self.keys.write().unwrap();
        let now = OffsetDateTime::now_utc();
        for key in keys.values_mut() {
            if key.status == KeyStatus::Active {
                key.status = KeyStatus::Retired;
                key.retired_at = Some(now);
            }
        }
        keys.insert(new_record.kid.clone(), new_record.clone());
        Ok(())
    }
}

// =============================================================================
// Devices
// =============================================================================

/// In-memory device registry.
#[derive(Default)]
pub struct MemoryDeviceStorage {
    devices: RwLock<HashMap<Uuid, Device>>,
}

impl MemoryDeviceStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStorage for MemoryDeviceStorage {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Device>> {
        Ok(self.devices.read().unwrap().get(&id).cloned())
    }

    async fn create(&self, device: &Device) -> AuthResult<()> {
        self.devices
            .write()
            .unwrap()
            .insert(device.id, device.clone());
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: DeviceStatus) -> AuthResult<()> {
        let mut devices = self.devices.write().unwrap();
        let device = devices
            .get_mut(&id)
            .ok_or_else(|| AuthError::storage("device not found"))?;
        device.status = status;
        Ok(())
    }
}

// =============================================================================
// JTI replay cache
// =============================================================================

/// In-memory nonce replay cache with atomic first-use marking.
#[derive(Default)]
pub struct MemoryJtiStorage {
    used: RwLock<HashMap<String, OffsetDateTime>>,
}

impl MemoryJtiStorage {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JtiStorage for MemoryJtiStorage {
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        // Conditional insert under one write lock: exactly one of two
        // concurrent callers with the same jti observes first-use.
        let mut used = self.used.write().unwrap();
        if used.contains_key(jti) {
            return Ok(false);
        }
        used.insert(jti.to_string(), expires_at);
        Ok(true)
    }

    async fn is_used(&self, jti: &str) -> AuthResult<bool> {
        Ok(self.used.read().unwrap().contains_key(jti))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut used = self.used.write().unwrap();
        let before = used.len();
        used.retain(|_, exp| *exp > now);
        Ok((before - used.len()) as u64)
    }
}

// =============================================================================
// Login failures (cache and durable layers)
// =============================================================================

/// In-memory login-failure layer.
///
/// One implementation serves as both the fast cache and the durable
/// store in development and tests; the tracker composes two separate
/// instances so the fallback paths stay observable.
#[derive(Default)]
pub struct MemoryLoginAttemptStorage {
    records: RwLock<HashMap<Uuid, LoginFailureRecord>>,
}

impl MemoryLoginAttemptStorage {
    /// Creates an empty layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_impl(&self, subject_id: Uuid) -> Option<LoginFailureRecord> {
        self.records.read().unwrap().get(&subject_id).cloned()
    }

    fn increment_impl(&self, subject_id: Uuid, now: OffsetDateTime) -> LoginFailureRecord {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(subject_id)
            .or_insert_with(|| LoginFailureRecord::empty(subject_id));
        record.failure_count += 1;
        record.last_failure_at = Some(now);
        record.clone()
    }

    fn set_lock_impl(&self, subject_id: Uuid, locked_until: OffsetDateTime, reason: &str) {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(subject_id)
            .or_insert_with(|| LoginFailureRecord::empty(subject_id));
        record.locked_until = Some(locked_until);
        record.lock_reason = Some(reason.to_string());
    }

    fn reset_impl(&self, subject_id: Uuid) {
        self.records
            .write()
            .unwrap()
            .insert(subject_id, LoginFailureRecord::empty(subject_id));
    }
}

#[async_trait]
impl LoginAttemptStorage for MemoryLoginAttemptStorage {
    async fn get(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>> {
        Ok(self.get_impl(subject_id))
    }

    async fn increment(
        &self,
        subject_id: Uuid,
        now: OffsetDateTime,
    ) -> AuthResult<LoginFailureRecord> {
        Ok(self.increment_impl(subject_id, now))
    }

    async fn set_lock(
        &self,
        subject_id: Uuid,
        locked_until: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<()> {
        self.set_lock_impl(subject_id, locked_until, reason);
        Ok(())
    }

    async fn reset(&self, subject_id: Uuid) -> AuthResult<()> {
        self.reset_impl(subject_id);
        Ok(())
    }
}

#[async_trait]
impl FailureCache for MemoryLoginAttemptStorage {
    async fn get(&self, subject_id: Uuid) -> AuthResult<Option<LoginFailureRecord>> {
        Ok(self.get_impl(subject_id))
    }

    async fn increment(
        &self,
        subject_id: Uuid,
        now: OffsetDateTime,
    ) -> AuthResult<LoginFailureRecord> {
        Ok(self.increment_impl(subject_id, now))
    }

    async fn set_lock(
        &self,
        subject_id: Uuid,
        locked_until: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<()> {
        self.set_lock_impl(subject_id, locked_until, reason);
        Ok(())
    }

    async fn reset(&self, subject_id: Uuid) -> AuthResult<()> {
        self.reset_impl(subject_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_code(value: &str) -> AuthorizationCode {
        let now = OffsetDateTime::now_utc();
        AuthorizationCode {
            id: Uuid::new_v4(),
            code: value.to_string(),
            client_id: "web-app".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            code_challenge: "challenge".to_string(),
            code_challenge_method: "S256".to_string(),
            scope: "openid".to_string(),
            subject_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            nonce: None,
            created_at: now,
            expires_at: now + Duration::minutes(5),
            used_at: None,
        }
    }

    #[tokio::test]
    async fn test_code_consume_is_single_use() {
        let storage = MemoryCodeStorage::new();
        storage.create(&test_code("code-1")).await.unwrap();

        assert!(storage.consume("code-1").await.is_ok());
        assert!(storage.consume("code-1").await.is_err());
        assert!(storage.consume("never-issued").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_code_consumption_one_winner() {
        use std::sync::Arc;

        let storage = Arc::new(MemoryCodeStorage::new());
        storage.create(&test_code("racing-code")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.consume("racing-code").await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_jti_mark_used_atomicity() {
        use std::sync::Arc;

        let storage = Arc::new(MemoryJtiStorage::new());
        let expires = OffsetDateTime::now_utc() + Duration::minutes(5);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(
                async move { storage.mark_used("nonce", expires).await.unwrap() },
            ));
        }

        let mut first_uses = 0;
        for handle in handles {
            if handle.await.unwrap() {
                first_uses += 1;
            }
        }
        assert_eq!(first_uses, 1);
        assert!(storage.is_used("nonce").await.unwrap());
    }

    #[tokio::test]
    async fn test_jti_cleanup() {
        let storage = MemoryJtiStorage::new();
        let now = OffsetDateTime::now_utc();

        storage.mark_used("old", now - Duration::minutes(1)).await.unwrap();
        storage.mark_used("new", now + Duration::minutes(5)).await.unwrap();

        assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
        assert!(!storage.is_used("old").await.unwrap());
        assert!(storage.is_used("new").await.unwrap());
    }

    #[tokio::test]
    async fn test_client_duplicate_registration_rejected() {
        use veridian_auth::types::{GrantType, RefreshPolicy};

        let storage = MemoryClientStorage::new();
        let client = Client {
            client_id: "web-app".to_string(),
            secret_hash: None,
            name: "Web App".to_string(),
            organization_id: Uuid::new_v4(),
            grant_types: vec![GrantType::AuthorizationCode],
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            scopes: vec![],
            confidential: false,
            first_party: false,
            active: true,
            refresh_policy: RefreshPolicy::Rotate,
            access_token_lifetime: None,
            refresh_token_lifetime: None,
        };

        storage.create(&client).await.unwrap();
        assert!(storage.create(&client).await.is_err());
        assert!(
            storage
                .find_by_client_id("web-app")
                .await
                .unwrap()
                .is_some()
        );
    }
}
