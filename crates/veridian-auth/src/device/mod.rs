//! Device proof-of-possession verification.
//!
//! Registered devices attach a detached HMAC proof to protected
//! requests, demonstrating possession of their provisioning secret
//! without transmitting it. The proof signs
//! `method\npath\njti\ntimestamp` with HMAC-SHA256.
//!
//! Verification performs four independent checks, short-circuiting on
//! the first failure, and every failure collapses into the same
//! generic [`AuthError::InvalidDeviceProof`]:
//!
//! 1. timestamp within the configured window of server time
//! 2. `jti` not seen before (replay suppression)
//! 3. device status ACTIVE
//! 4. signature match, compared in constant time
//!
//! The HMAC key is the SHA-256 digest of the provisioning secret - the
//! only durable artifact on the server side. Devices derive the same
//! digest from the secret they hold.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditEvent, AuditKind};
use crate::config::DeviceConfig;
use crate::error::AuthError;
use crate::storage::{DeviceStorage, JtiStorage};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the device id.
pub const HEADER_DEVICE_ID: &str = "x-device-id";
/// Header carrying the proof nonce.
pub const HEADER_JTI: &str = "x-jti";
/// Header carrying the unix-seconds timestamp.
pub const HEADER_TIMESTAMP: &str = "x-ts";
/// Header carrying the base64url-encoded HMAC.
pub const HEADER_PROOF: &str = "x-device-proof";

/// A parsed device proof, as extracted from request headers.
///
/// Ephemeral: proofs are never persisted, only their `jti` enters the
/// replay cache.
#[derive(Debug, Clone)]
pub struct DeviceProof {
    /// The presenting device.
    pub device_id: Uuid,

    /// One-time nonce.
    pub jti: String,

    /// Unix seconds at which the device produced the proof.
    pub timestamp: i64,

    /// Base64url-encoded HMAC-SHA256 over the canonical string.
    pub signature: String,
}

impl DeviceProof {
    /// Builds the canonical string a proof signs.
    #[must_use]
    pub fn canonical_string(method: &str, path: &str, jti: &str, timestamp: i64) -> String {
        format!("{method}\n{path}\n{jti}\n{timestamp}")
    }

    /// Computes a proof signature for the given request and key.
    ///
    /// Used by device SDKs and tests; the verifier recomputes the same
    /// value.
    #[must_use]
    pub fn compute_signature(
        method: &str,
        path: &str,
        jti: &str,
        timestamp: i64,
        hmac_key: &[u8],
    ) -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut mac =
            HmacSha256::new_from_slice(hmac_key).expect("HMAC can take key of any size");
        mac.update(Self::canonical_string(method, path, jti, timestamp).as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Derives the HMAC key from a provisioning secret.
    ///
    /// The server stores only this digest; the device derives it
    /// locally from the secret it was handed at registration.
    #[must_use]
    pub fn derive_key(secret: &str) -> Vec<u8> {
        Sha256::digest(secret.as_bytes()).to_vec()
    }
}

/// Verifies device proofs against registered devices and the replay
/// cache.
pub struct DeviceProofVerifier {
    devices: Arc<dyn DeviceStorage>,
    replay: Arc<dyn JtiStorage>,
    config: DeviceConfig,
}

impl DeviceProofVerifier {
    /// Creates a new verifier.
    #[must_use]
    pub fn new(
        devices: Arc<dyn DeviceStorage>,
        replay: Arc<dyn JtiStorage>,
        config: DeviceConfig,
    ) -> Self {
        Self {
            devices,
            replay,
            config,
        }
    }

    /// Verifies a proof for a request.
    ///
    /// On success the proof's `jti` is cached for the replay window so
    /// the same nonce cannot be accepted again.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidDeviceProof`] on any check failure,
    /// without revealing which check failed. Storage failures propagate
    /// as-is and fail the request closed.
    pub async fn verify(&self, method: &str, path: &str, proof: &DeviceProof) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();

        // 1. Timestamp window bounds the replay horizon.
        let tolerance = Duration::seconds(self.config.timestamp_tolerance.as_secs() as i64);
        let proof_time = OffsetDateTime::from_unix_timestamp(proof.timestamp)
            .map_err(|_| self.reject(proof, "timestamp_unparseable"))?;
        let skew = (proof_time - now).abs();
        if skew > tolerance {
            return Err(self.reject(proof, "timestamp_outside_window"));
        }

        // 2. Nonce must be fresh.
        if self.replay.is_used(&proof.jti).await? {
            return Err(self.reject(proof, "jti_replayed"));
        }

        // 3. Device must exist and be ACTIVE.
        let device = match self.devices.find_by_id(proof.device_id).await? {
            Some(device) if device.is_active() => device,
            Some(_) => return Err(self.reject(proof, "device_not_active")),
            None => return Err(self.reject(proof, "device_unknown")),
        };

        // 4. Signature, compared in constant time.
        let key = hex::decode(&device.secret_hash)
            .map_err(|e| AuthError::internal(format!("Malformed device secret hash: {e}")))?;
        let expected =
            DeviceProof::compute_signature(method, path, &proof.jti, proof.timestamp, &key);
        if expected
            .as_bytes()
            .ct_eq(proof.signature.as_bytes())
            .unwrap_u8()
            != 1
        {
            return Err(self.reject(proof, "signature_mismatch"));
        }

        // Claim the nonce atomically; losing the race to a concurrent
        // request with the same jti means that request was a replay of
        // this one (or vice versa) - reject.
        let replay_ttl = Duration::seconds(self.config.replay_ttl.as_secs() as i64);
        if !self.replay.mark_used(&proof.jti, now + replay_ttl).await? {
            return Err(self.reject(proof, "jti_replayed"));
        }

        AuditEvent::new(AuditKind::DeviceProofAccepted)
            .subject(crate::types::Subject::Device(proof.device_id))
            .detail("jti", proof.jti.clone())
            .record();

        Ok(())
    }

    /// Records the audit detail and returns the uniform error.
    fn reject(&self, proof: &DeviceProof, reason: &'static str) -> AuthError {
        AuditEvent::new(AuditKind::DeviceProofRejected)
            .subject(crate::types::Subject::Device(proof.device_id))
            .detail("jti", proof.jti.clone())
            .detail("reason", reason)
            .record();
        AuthError::InvalidDeviceProof
    }
}

/// Generates a device provisioning secret of the configured length.
///
/// The plaintext goes to the device exactly once; only its SHA-256
/// digest (see [`DeviceProof::derive_key`]) is stored.
#[must_use]
pub fn generate_device_secret(length: usize) -> String {
    use rand::RngCore;
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::device::{Device, DeviceStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockDeviceStorage {
        devices: Mutex<HashMap<Uuid, Device>>,
    }

    #[async_trait::async_trait]
    impl DeviceStorage for MockDeviceStorage {
        async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Device>> {
            Ok(self.devices.lock().unwrap().get(&id).cloned())
        }

        async fn create(&self, device: &Device) -> AuthResult<()> {
            self.devices.lock().unwrap().insert(device.id, device.clone());
            Ok(())
        }

        async fn set_status(&self, id: Uuid, status: DeviceStatus) -> AuthResult<()> {
            let mut devices = self.devices.lock().unwrap();
            let device = devices
                .get_mut(&id)
                .ok_or_else(|| AuthError::storage("device not found"))?;
            device.status = status;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockJtiStorage {
        used: Mutex<HashMap<String, OffsetDateTime>>,
    }

    #[async_trait::async_trait]
    impl JtiStorage for MockJtiStorage {
        async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
            let mut used = self.used.lock().unwrap();
            if used.contains_key(jti) {
                return Ok(false);
            }
            used.insert(jti.to_string(), expires_at);
            Ok(true)
        }

        async fn is_used(&self, jti: &str) -> AuthResult<bool> {
            Ok(self.used.lock().unwrap().contains_key(jti))
        }

        async fn cleanup_expired(&self) -> AuthResult<u64> {
            let now = OffsetDateTime::now_utc();
            let mut used = self.used.lock().unwrap();
            let before = used.len();
            used.retain(|_, exp| *exp > now);
            Ok((before - used.len()) as u64)
        }
    }

    struct Harness {
        verifier: DeviceProofVerifier,
        devices: Arc<MockDeviceStorage>,
        device_id: Uuid,
        key: Vec<u8>,
    }

    async fn harness() -> Harness {
        let devices = Arc::new(MockDeviceStorage::default());
        let replay = Arc::new(MockJtiStorage::default());

        let secret = generate_device_secret(32);
        let key = DeviceProof::derive_key(&secret);
        let device_id = Uuid::new_v4();
        devices
            .create(&Device {
                id: device_id,
                organization_id: Uuid::new_v4(),
                secret_hash: hex::encode(&key),
                status: DeviceStatus::Active,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();

        Harness {
            verifier: DeviceProofVerifier::new(devices.clone(), replay, DeviceConfig::default()),
            devices,
            device_id,
            key,
        }
    }

    fn proof_at(h: &Harness, jti: &str, timestamp: i64) -> DeviceProof {
        DeviceProof {
            device_id: h.device_id,
            jti: jti.to_string(),
            timestamp,
            signature: DeviceProof::compute_signature(
                "POST",
                "/oauth/token",
                jti,
                timestamp,
                &h.key,
            ),
        }
    }

    #[tokio::test]
    async fn test_valid_proof_accepted() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let proof = proof_at(&h, "nonce-1", now);
        assert!(h.verifier.verify("POST", "/oauth/token", &proof).await.is_ok());
    }

    #[tokio::test]
    async fn test_timestamp_outside_window_rejected() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        // 61 seconds in the past and future both fall outside ±60s.
        for ts in [now - 61, now + 61] {
            let proof = proof_at(&h, &format!("nonce-{ts}"), ts);
            let err = h
                .verifier
                .verify("POST", "/oauth/token", &proof)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidDeviceProof));
        }

        // 59 seconds of skew is inside the window.
        let proof = proof_at(&h, "nonce-in-window", now - 59);
        assert!(h.verifier.verify("POST", "/oauth/token", &proof).await.is_ok());
    }

    #[tokio::test]
    async fn test_replayed_jti_rejected_even_with_valid_signature() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let proof = proof_at(&h, "nonce-replay", now);
        assert!(h.verifier.verify("POST", "/oauth/token", &proof).await.is_ok());

        // Identical valid proof, same jti: rejected.
        let err = h
            .verifier
            .verify("POST", "/oauth/token", &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidDeviceProof));

        // A fresh jti from the same device still works.
        let proof = proof_at(&h, "nonce-fresh", now);
        assert!(h.verifier.verify("POST", "/oauth/token", &proof).await.is_ok());
    }

    #[tokio::test]
    async fn test_inactive_device_rejected() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        h.devices
            .set_status(h.device_id, DeviceStatus::Suspended)
            .await
            .unwrap();

        let proof = proof_at(&h, "nonce-suspended", now);
        let err = h
            .verifier
            .verify("POST", "/oauth/token", &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidDeviceProof));
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut proof = proof_at(&h, "nonce-unknown", now);
        proof.device_id = Uuid::new_v4();

        let err = h
            .verifier
            .verify("POST", "/oauth/token", &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidDeviceProof));
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut proof = proof_at(&h, "nonce-tampered", now);
        proof.signature = "AAAA".to_string();
        let err = h
            .verifier
            .verify("POST", "/oauth/token", &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidDeviceProof));

        // Signing the wrong path also fails.
        let proof = DeviceProof {
            device_id: h.device_id,
            jti: "nonce-wrong-path".to_string(),
            timestamp: now,
            signature: DeviceProof::compute_signature("POST", "/other", "nonce-wrong-path", now, &h.key),
        };
        let err = h
            .verifier
            .verify("POST", "/oauth/token", &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidDeviceProof));
    }

    #[tokio::test]
    async fn test_failed_signature_does_not_burn_the_jti() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut bad = proof_at(&h, "nonce-shared", now);
        bad.signature = "AAAA".to_string();
        assert!(h.verifier.verify("POST", "/oauth/token", &bad).await.is_err());

        // The nonce only enters the replay cache on success; the
        // legitimate proof with the same jti still verifies.
        let good = proof_at(&h, "nonce-shared", now);
        assert!(h.verifier.verify("POST", "/oauth/token", &good).await.is_ok());
    }

    #[test]
    fn test_canonical_string_layout() {
        let s = DeviceProof::canonical_string("GET", "/userinfo", "abc", 1_700_000_000);
        assert_eq!(s, "GET\n/userinfo\nabc\n1700000000");
    }

    #[test]
    fn test_generate_device_secret_length() {
        let secret = generate_device_secret(32);
        assert_eq!(secret.len(), 64); // hex doubles the byte length
        assert_ne!(secret, generate_device_secret(32));
    }
}
