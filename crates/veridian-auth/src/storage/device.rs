//! Registered device storage trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// Lifecycle state of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// The device may attach proofs to requests.
    Active,
    /// The device is suspended; proofs are rejected.
    Suspended,
    /// The device registration was removed.
    Deregistered,
}

/// A device registered for proof-of-possession.
///
/// The provisioning secret is handed to the device exactly once. Only
/// its SHA-256 digest is persisted; that digest doubles as the HMAC
/// key for proof verification (the device derives the same digest from
/// its secret), so the raw secret never exists server-side after
/// provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique device identifier.
    pub id: Uuid,

    /// Tenant (organization) this device belongs to.
    pub organization_id: Uuid,

    /// Hex-encoded SHA-256 digest of the provisioning secret.
    pub secret_hash: String,

    /// Lifecycle state.
    pub status: DeviceStatus,

    /// When the device was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Device {
    /// Returns `true` if the device may attach proofs.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }
}

/// Storage trait for registered devices.
#[async_trait]
pub trait DeviceStorage: Send + Sync {
    /// Finds a device by its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Device>>;

    /// Registers a new device.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, device: &Device) -> AuthResult<()>;

    /// Updates a device's lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not exist or the storage
    /// operation fails.
    async fn set_status(&self, id: Uuid, status: DeviceStatus) -> AuthResult<()>;
}
