//! Encrypted vault blob layout.
//!
//! ```text
//! [ salt (16) ][ nonce (12) ][ ciphertext ... ][ tag (16) ]
//! ```
//!
//! Offsets are fixed and nothing is length-prefixed. The nonce, ciphertext
//! and tag together are exactly what [`crate::aead::encrypt`] returns, so the
//! blob is the salt followed by one AEAD output.

use std::fmt;

use crate::aead::{self, NONCE_SIZE, TAG_SIZE};
use crate::keys::{Salt, SessionKey, SALT_LENGTH};
use pearanoid_common::{Error, Result};

/// Size of the fixed header (salt + nonce).
pub const HEADER_SIZE: usize = SALT_LENGTH + NONCE_SIZE;

/// Smallest well-formed blob: header plus an empty ciphertext's tag.
pub const MIN_BLOB_SIZE: usize = HEADER_SIZE + TAG_SIZE;

/// Opaque at-rest representation of a vault.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedVault(Vec<u8>);

impl EncryptedVault {
    /// Wrap bytes fetched from storage.
    ///
    /// Blobs shorter than [`MIN_BLOB_SIZE`] are reported as
    /// `Authentication` errors: a truncated blob is indistinguishable from
    /// one sealed under another password.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_BLOB_SIZE {
            return Err(Error::Authentication);
        }
        Ok(Self(bytes))
    }

    /// Seal `plaintext` under `key`, embedding the key's salt.
    pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Self> {
        let sealed = aead::encrypt(key.key().as_bytes(), plaintext)?;

        let mut bytes = Vec::with_capacity(SALT_LENGTH + sealed.len());
        bytes.extend_from_slice(key.salt().as_bytes());
        bytes.extend_from_slice(&sealed);
        Ok(Self(bytes))
    }

    /// Salt embedded in the header.
    pub fn salt(&self) -> Salt {
        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&self.0[..SALT_LENGTH]);
        Salt::from_bytes(salt)
    }

    /// Nonce embedded in the header.
    pub fn nonce(&self) -> &[u8] {
        &self.0[SALT_LENGTH..HEADER_SIZE]
    }

    /// Authenticate and decrypt with a key derived from [`Self::salt`].
    pub fn open(&self, key: &SessionKey) -> Result<Vec<u8>> {
        if key.salt() != &self.salt() {
            return Err(Error::Authentication);
        }
        aead::decrypt(key.key().as_bytes(), &self.0[SALT_LENGTH..])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncryptedVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedVault({} bytes)", self.0.len())
    }
}
