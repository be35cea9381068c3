//! Authenticated encryption using ChaCha20-Poly1305.
//!
//! ChaCha20-Poly1305 provides both confidentiality and authenticity with a
//! 256-bit key, a 96-bit nonce and a 128-bit tag. A fresh random nonce is
//! drawn from the OS CSPRNG for every encryption.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use pearanoid_common::{Error, Result};

/// Nonce size for ChaCha20-Poly1305 (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn cipher(key: &[u8]) -> Result<ChaCha20Poly1305> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(ChaCha20Poly1305::new(GenericArray::from_slice(key)))
}

/// Encrypt plaintext using ChaCha20-Poly1305.
///
/// # Preconditions
/// - `key` must be exactly KEY_LENGTH bytes
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is randomly generated
/// - The output length is plaintext length + TAG_SIZE + NONCE_SIZE
///
/// # Errors
/// - Returns error if key length is incorrect
/// - Returns error if encryption fails
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    // Prepend nonce to ciphertext
    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
/// - `Crypto` if the key length is incorrect
/// - `Authentication` if the input is too short or the tag does not verify
///
/// # Security
/// - Authenticates before returning anything; no partial plaintext on failure
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;

    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Authentication);
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|_| Error::Authentication)
}
