//! Key manager: signing-key lifecycle and JWKS publication.
//!
//! Responsibilities:
//!
//! - `ensure_active_key()` - idempotent provisioning of an ACTIVE key
//! - `active_signing_key()` - decrypt-on-demand access to the current
//!   private key, cached in memory and invalidated on rotation
//! - `public_key_set()` - the JWKS plus a deterministic content hash
//!   used as an HTTP cache validator
//! - `rotate()` - ACTIVE → RETIRED transition with the retired key
//!   kept in the verification set
//!
//! Key state lives in storage, not in a process global, so multiple
//! instances converge on the same ACTIVE key.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::keys::material::{EncryptedKeyMaterial, KeyEncryptionKey};
use crate::storage::KeyStorage;
use crate::token::jwt::{Jwk, Jwks, SigningAlgorithm, SigningKeyPair};

/// Lifecycle state of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// The key currently used for signing. At most one per deployment.
    Active,
    /// No longer signs, but stays published for verification until all
    /// tokens signed with it have expired.
    Retired,
}

/// A signing key as persisted by key storage.
///
/// Private material is encrypted at rest; the public PEM and the
/// pre-exported JWK are stored in the clear for JWKS publication
/// without touching the private half.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningKeyRecord {
    /// Key ID, carried in token headers.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Lifecycle state.
    pub status: KeyStatus,

    /// Encrypted private key PEM.
    pub private_material: EncryptedKeyMaterial,

    /// Public key PEM.
    pub public_pem: String,

    /// Public key in JWK form for the published set.
    pub jwk: Jwk,

    /// When the key was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the key was retired, if it was.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub retired_at: Option<OffsetDateTime>,
}

/// Public key set with its cache validator.
#[derive(Debug, Clone)]
pub struct JwksDocument {
    /// The published keys (ACTIVE plus still-relevant RETIRED).
    pub jwks: Jwks,

    /// Deterministic content hash of the key set, suitable as an ETag.
    /// Identical across calls until the key set changes.
    pub etag: String,
}

/// Manages the signing key set backed by persistent storage.
pub struct KeyManager {
    storage: Arc<dyn KeyStorage>,
    kek: KeyEncryptionKey,
    algorithm: SigningAlgorithm,

    /// Decrypted ACTIVE key, cached after first use. Swapped out on
    /// rotation so the next signer re-reads storage.
    cached: ArcSwapOption<SigningKeyPair>,
}

impl KeyManager {
    /// Creates a new key manager.
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyStorage>,
        kek: KeyEncryptionKey,
        algorithm: SigningAlgorithm,
    ) -> Self {
        Self {
            storage,
            kek,
            algorithm,
            cached: ArcSwapOption::empty(),
        }
    }

    /// Ensures an ACTIVE signing key exists, provisioning one if not.
    ///
    /// Idempotent. Two instances racing through this method cannot both
    /// install a key: `KeyStorage::insert_active` is conditional, and
    /// the loser simply re-reads the winner's key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if key state cannot be read or written,
    /// or an internal error if key generation fails.
    pub async fn ensure_active_key(&self) -> AuthResult<SigningKeyRecord> {
        if let Some(record) = self.storage.find_active().await? {
            return Ok(record);
        }

        let pair = SigningKeyPair::generate(self.algorithm)
            .map_err(|e| AuthError::internal(format!("Key generation failed: {e}")))?;
        let record = self.record_from_pair(&pair)?;

        if self.storage.insert_active(&record).await? {
            tracing::info!(kid = %record.kid, algorithm = %record.algorithm, "Provisioned new active signing key");
            return Ok(record);
        }

        // Another instance won the race; use its key.
        self.storage
            .find_active()
            .await?
            .ok_or_else(|| AuthError::no_active_key("Active key vanished during provisioning"))
    }

    /// Returns the ACTIVE key's decrypted signing pair.
    ///
    /// The decrypted pair is cached in memory; rotation invalidates the
    /// cache. The absence of any ACTIVE key is fatal for signing and
    /// surfaces as [`AuthError::NoActiveKey`] - callers must not fall
    /// back to a stale key.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveKey` if no ACTIVE key exists, or an internal
    /// error if decryption or PEM parsing fails.
    pub async fn active_signing_key(&self) -> AuthResult<Arc<SigningKeyPair>> {
        let record = self
            .storage
            .find_active()
            .await?
            .ok_or_else(|| AuthError::no_active_key("No active signing key provisioned"))?;

        if let Some(cached) = self.cached.load_full()
            && cached.kid == record.kid
        {
            return Ok(cached);
        }

        let private_pem = record.private_material.open(&self.kek)?;
        let pair = SigningKeyPair::from_pem(
            record.kid.clone(),
            record.algorithm,
            &private_pem,
            &record.public_pem,
        )
        .map_err(|e| AuthError::internal(format!("Failed to load signing key: {e}")))?;

        let pair = Arc::new(pair);
        self.cached.store(Some(pair.clone()));
        Ok(pair)
    }

    /// Returns the published key set with its cache validator.
    ///
    /// The ETag is the hex SHA-256 of the kid-sorted serialized JWK
    /// set: identical for identical key sets, different as soon as a
    /// key is added, retired out of relevance, or rotated in.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the key set cannot be read.
    pub async fn public_key_set(&self) -> AuthResult<JwksDocument> {
        let mut records = self.storage.verification_set().await?;
        records.sort_by(|a, b| a.kid.cmp(&b.kid));

        let mut jwks = Jwks::new();
        let mut hasher = Sha256::new();
        for record in &records {
            let serialized = serde_json::to_string(&record.jwk)
                .map_err(|e| AuthError::internal(format!("Failed to serialize JWK: {e}")))?;
            hasher.update(serialized.as_bytes());
            jwks.add_key(record.jwk.clone());
        }

        Ok(JwksDocument {
            jwks,
            etag: hex::encode(hasher.finalize()),
        })
    }

    /// Verifies a token against the published verification set.
    ///
    /// The token's `kid` header selects the key; RETIRED keys verify
    /// just like the ACTIVE one, so tokens issued before a rotation
    /// stay valid until they expire.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is malformed, carries an
    /// unknown `kid`, fails signature or issuer validation, or (when
    /// `validate_exp` is set) has expired.
    pub async fn verify_token<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        issuer: &str,
        validate_exp: bool,
    ) -> AuthResult<T> {
        use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};

        let header = decode_header(token)
            .map_err(|e| AuthError::invalid_token(format!("Malformed token: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("Token has no kid header"))?;

        let records = self.storage.verification_set().await?;
        let record = records
            .into_iter()
            .find(|r| r.kid == kid)
            .ok_or_else(|| AuthError::invalid_token(format!("Unknown signing key: {kid}")))?;

        let decoding_key = if record.algorithm.is_rsa() {
            DecodingKey::from_rsa_pem(record.public_pem.as_bytes())
        } else {
            DecodingKey::from_ec_pem(record.public_pem.as_bytes())
        }
        .map_err(|e| AuthError::internal(format!("Failed to load verification key: {e}")))?;

        let mut validation = Validation::new(record.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[issuer]);
        validation.validate_exp = validate_exp;
        validation.validate_aud = false; // Audience validated at application layer

        decode::<T>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::invalid_token(e.to_string()))
    }

    /// Rotates the signing key: generates a new ACTIVE key and retires
    /// the current one in a single storage step.
    ///
    /// The retired key remains in the verification set so outstanding
    /// tokens keep verifying until they expire.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the rotation cannot be persisted, or
    /// an internal error if key generation fails.
    pub async fn rotate(&self) -> AuthResult<SigningKeyRecord> {
        let pair = SigningKeyPair::generate(self.algorithm)
            .map_err(|e| AuthError::internal(format!("Key generation failed: {e}")))?;
        let record = self.record_from_pair(&pair)?;

        self.storage.rotate(&record).await?;
        self.cached.store(None);

        tracing::info!(kid = %record.kid, "Rotated signing key");
        Ok(record)
    }

    fn record_from_pair(&self, pair: &SigningKeyPair) -> AuthResult<SigningKeyRecord> {
        let private_material = EncryptedKeyMaterial::seal(pair.private_pem(), &self.kek)?;
        Ok(SigningKeyRecord {
            kid: pair.kid.clone(),
            algorithm: pair.algorithm,
            status: KeyStatus::Active,
            private_material,
            public_pem: pair.public_pem().to_string(),
            jwk: pair.to_jwk(),
            created_at: pair.created_at,
            retired_at: None,
        })
    }
}
