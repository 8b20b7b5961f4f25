//! Signing-key lifecycle management and JWKS publication.
//!
//! The key manager owns the set of asymmetric signing keys and
//! guarantees exactly one ACTIVE key at any time. RETIRED keys stay in
//! the published verification set until tokens signed with them have
//! expired.

pub mod manager;
pub mod material;

pub use manager::{JwksDocument, KeyManager, KeyStatus, SigningKeyRecord};
pub use material::{EncryptedKeyMaterial, KeyEncryptionKey};
