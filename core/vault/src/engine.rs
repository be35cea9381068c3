//! Vault encryption engine.
//!
//! Stateless apart from its KDF parameters. Every blob it produces has the
//! layout described in [`pearanoid_crypto::blob`]: a fresh nonce per call,
//! and a fresh salt whenever a password (rather than a held key) is supplied.

use zeroize::Zeroizing;

use crate::model::{Vault, VAULT_VERSION};
use pearanoid_common::{Error, Result};
use pearanoid_crypto::{derive_key, EncryptedVault, KdfParams, MasterKey, Salt, SessionKey};

/// Derives keys and seals/opens whole vaults.
#[derive(Debug, Clone)]
pub struct CryptoEngine {
    params: KdfParams,
}

impl CryptoEngine {
    /// Create an engine, rejecting KDF parameters below the floor.
    pub fn new(params: KdfParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Derive the 32-byte master key for `password` and `salt`.
    pub fn derive_key(&self, password: &[u8], salt: &Salt) -> Result<MasterKey> {
        derive_key(password, salt, &self.params)
    }

    /// Derive a key under a freshly generated salt.
    pub fn new_session_key(&self, password: &[u8]) -> Result<SessionKey> {
        let salt = Salt::generate();
        let key = self.derive_key(password, &salt)?;
        Ok(SessionKey::new(salt, key))
    }

    /// Encrypt `vault` under `password` with a fresh salt and nonce.
    ///
    /// # Errors
    /// - `Validation` if the password is empty
    /// - `Crypto` if key derivation or sealing fails
    pub fn encrypt(&self, vault: &Vault, password: &[u8]) -> Result<EncryptedVault> {
        let key = self.new_session_key(password)?;
        self.encrypt_with_key(vault, &key)
    }

    /// Encrypt `vault` with an already derived key.
    ///
    /// The blob keeps the key's salt so it still opens with the password;
    /// only the nonce is new.
    pub fn encrypt_with_key(&self, vault: &Vault, key: &SessionKey) -> Result<EncryptedVault> {
        let plaintext = Zeroizing::new(serde_json::to_vec(vault)?);
        EncryptedVault::seal(key, &plaintext)
    }

    /// Decrypt a blob, returning the vault and the key that opened it.
    ///
    /// # Errors
    /// - `Authentication` for a wrong or empty password, a tampered blob or
    ///   one too short to hold a header and tag
    /// - `Serialization` if the authenticated payload is not a supported vault
    pub fn decrypt(&self, blob: &EncryptedVault, password: &[u8]) -> Result<(Vault, SessionKey)> {
        // No vault is ever sealed under an empty password.
        if password.is_empty() {
            return Err(Error::Authentication);
        }
        let salt = blob.salt();
        let key = SessionKey::new(salt, self.derive_key(password, &salt)?);
        let vault = self.open_with_key(blob, &key)?;
        Ok((vault, key))
    }

    /// Decrypt a blob with an already derived key.
    pub fn open_with_key(&self, blob: &EncryptedVault, key: &SessionKey) -> Result<Vault> {
        let plaintext = Zeroizing::new(blob.open(key)?);
        let vault: Vault = serde_json::from_slice(&plaintext)?;
        if vault.version != VAULT_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported vault version {}",
                vault.version
            )));
        }
        if let Some(id) = vault.duplicate_id() {
            return Err(Error::Serialization(format!("duplicate entry id {}", id)));
        }
        Ok(vault)
    }
}
