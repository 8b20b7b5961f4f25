//! User storage trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// A user in the authentication system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Username for authentication.
    pub username: String,

    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argon2-hashed password (None for federated users).
    ///
    /// Stored for password authentication. Filter this field out when
    /// exposing User via an API.
    #[serde(default)]
    pub password_hash: Option<String>,

    /// Tenant (organization) the user belongs to.
    pub organization_id: Uuid,

    /// Whether the user account is active.
    /// Inactive users cannot authenticate.
    pub active: bool,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Creates a new active user with the given username.
    #[must_use]
    pub fn new(username: impl Into<String>, organization_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: None,
            name: None,
            password_hash: None,
            organization_id,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Storage trait for users.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Finds a user by id.
    ///
    /// Used to re-fetch subject claims on refresh; stale claims
    /// embedded in an old token are never trusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, user: &User) -> AuthResult<()>;
}
