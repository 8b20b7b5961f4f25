//! Token subject identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The principal a token was issued for.
///
/// Exactly one identity is populated per token: a human user, a
/// provisioned service account, or a registered device. The enum makes
/// the exactly-one-of invariant structural instead of a convention over
/// three nullable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// A human user.
    User(Uuid),
    /// A provisioned service account.
    Account(Uuid),
    /// A registered device.
    Device(Uuid),
}

impl Subject {
    /// Returns the underlying identifier regardless of kind.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) | Self::Account(id) | Self::Device(id) => *id,
        }
    }

    /// Returns the subject kind as a stable string for claims and audit.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Account(_) => "account",
            Self::Device(_) => "device",
        }
    }

    /// Returns `true` if this subject is a human user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
