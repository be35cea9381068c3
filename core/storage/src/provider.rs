//! Storage provider trait definition.

use async_trait::async_trait;

use pearanoid_common::Result;

/// Storage backend holding a single encrypted vault blob.
///
/// Implementations must handle their own authentication and never inspect
/// or re-frame the bytes they are given.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "local", "http").
    fn name(&self) -> &str;

    /// Fetch the stored blob.
    ///
    /// # Errors
    /// - `NotFound` if no vault has been saved yet
    /// - `Transport` for network, remote-store or I/O failures
    async fn fetch_encrypted_vault(&self) -> Result<Vec<u8>>;

    /// Replace the stored blob with `data`.
    ///
    /// # Postconditions
    /// - A subsequent fetch returns exactly `data`
    ///
    /// # Errors
    /// - `Transport` for network, remote-store or I/O failures
    async fn save_encrypted_vault(&self, data: Vec<u8>) -> Result<()>;
}
