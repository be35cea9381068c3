//! Cryptographic primitives for Pearanoid.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using ChaCha20-Poly1305 (96-bit nonce)
//! - Secure key management with automatic zeroization
//! - The fixed-offset header of an encrypted vault blob
//! - Random password generation
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Authentication failures never return partial plaintext

pub mod aead;
pub mod blob;
pub mod generator;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, encrypt};
pub use blob::{EncryptedVault, HEADER_SIZE, MIN_BLOB_SIZE};
pub use generator::{generate_password, PasswordPolicy};
pub use kdf::{derive_key, KdfParams};
pub use keys::{MasterKey, Salt, SessionKey, KEY_LENGTH, SALT_LENGTH};
