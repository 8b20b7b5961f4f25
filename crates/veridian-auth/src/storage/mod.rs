//! Storage traits for auth-related data.
//!
//! The persistence engine is an external collaborator; this module only
//! defines the interfaces the engine components require. The contracts
//! that matter for security (atomic single-use consumption, conditional
//! status transitions, atomic replay marking) are spelled out on the
//! individual trait methods - implementations that relax them reopen
//! the races the engine is designed to close.
//!
//! A reference in-memory implementation lives in the
//! `veridian-storage-memory` crate.

pub mod client;
pub mod code;
pub mod device;
pub mod jti;
pub mod key;
pub mod login_attempt;
pub mod refresh_token;
pub mod user;

pub use client::ClientStorage;
pub use code::CodeStorage;
pub use device::{Device, DeviceStatus, DeviceStorage};
pub use jti::JtiStorage;
pub use key::KeyStorage;
pub use login_attempt::{FailureCache, LoginAttemptStorage};
pub use refresh_token::RefreshTokenStorage;
pub use user::{User, UserStorage};
