//! Local filesystem storage provider.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::provider::StorageProvider;
use pearanoid_common::{Error, Result};

/// File name of the blob inside the provider root.
pub const VAULT_FILENAME: &str = "vault.db";

/// Local filesystem storage provider.
///
/// Stores the blob as `<root>/vault.db`. Saves write a sibling temporary
/// file and rename it into place so a crash never leaves a torn blob.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Path of the blob file.
    pub fn vault_path(&self) -> PathBuf {
        self.root.join(VAULT_FILENAME)
    }

    fn transport(action: &str, path: &Path, err: std::io::Error) -> Error {
        Error::Transport(format!("Failed to {} {}: {}", action, path.display(), err))
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch_encrypted_vault(&self) -> Result<Vec<u8>> {
        let path = self.vault_path();
        match fs::read(&path).await {
            Ok(data) => {
                debug!(path = %path.display(), size = data.len(), "Read vault blob");
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(format!(
                "No vault at {}",
                path.display()
            ))),
            Err(e) => Err(Self::transport("read", &path, e)),
        }
    }

    async fn save_encrypted_vault(&self, data: Vec<u8>) -> Result<()> {
        let path = self.vault_path();
        let tmp = self.root.join(format!("{}.tmp", VAULT_FILENAME));

        fs::write(&tmp, &data)
            .await
            .map_err(|e| Self::transport("write", &tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| Self::transport("set permissions on", &tmp, e))?;
        }

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::transport("replace", &path, e))?;

        debug!(path = %path.display(), size = data.len(), "Wrote vault blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_not_found_before_first_save() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();

        assert!(matches!(
            provider.fetch_encrypted_vault().await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_save_fetch() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();

        provider.save_encrypted_vault(b"first".to_vec()).await.unwrap();
        provider.save_encrypted_vault(b"second".to_vec()).await.unwrap();

        assert_eq!(provider.fetch_encrypted_vault().await.unwrap(), b"second");
        assert!(!temp.path().join("vault.db.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("dir");
        let provider = LocalProvider::new(&root).unwrap();

        provider.save_encrypted_vault(vec![1]).await.unwrap();
        assert!(root.join(VAULT_FILENAME).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path()).unwrap();
        provider.save_encrypted_vault(vec![1]).await.unwrap();

        let mode = std::fs::metadata(provider.vault_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
