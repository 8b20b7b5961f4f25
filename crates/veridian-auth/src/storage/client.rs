//! Client storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Storage trait for registered OAuth clients.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its public identifier.
    ///
    /// Returns `None` if no such client is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Registers a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is already taken or the
    /// storage operation fails.
    async fn create(&self, client: &Client) -> AuthResult<()>;
}
