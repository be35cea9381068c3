//! In-memory storage provider for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::provider::StorageProvider;
use pearanoid_common::{Error, Result};

/// In-memory storage provider.
///
/// Useful for testing and development. The blob is lost on drop. Fetches
/// and saves can be made to fail on demand to exercise transport errors.
#[derive(Default)]
pub struct MemoryProvider {
    blob: RwLock<Option<Vec<u8>>>,
    fail_fetches: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider already holding `blob`.
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: RwLock::new(Some(blob)),
            ..Self::default()
        }
    }

    /// Make every subsequent fetch fail with a transport error.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent save fail with a transport error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the stored blob, if any.
    pub async fn snapshot(&self) -> Option<Vec<u8>> {
        self.blob.read().await.clone()
    }

    /// Overwrite the stored blob directly, bypassing failure injection.
    pub async fn replace(&self, blob: Vec<u8>) {
        *self.blob.write().await = Some(blob);
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_encrypted_vault(&self) -> Result<Vec<u8>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Error::Transport("memory provider: fetch failed".to_string()));
        }
        self.blob
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::NotFound("No vault stored".to_string()))
    }

    async fn save_encrypted_vault(&self, data: Vec<u8>) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Transport("memory provider: save failed".to_string()));
        }
        *self.blob.write().await = Some(data);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
