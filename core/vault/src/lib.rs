//! Vault engine for Pearanoid.
//!
//! This crate provides:
//! - The credential data model
//! - Whole-vault encryption on top of `pearanoid-crypto`
//! - The session state machine with idle auto-lock
//! - Client configuration
//!
//! # Architecture
//! The session sits between the front end and a storage provider. Storage
//! only ever sees sealed blobs; plaintext exists solely inside an unlocked
//! session.

pub mod config;
pub mod engine;
pub mod idle;
pub mod model;
pub mod session;

pub use config::{ClientConfig, SessionConfig};
pub use engine::CryptoEngine;
pub use model::{sections_of, CredentialEntry, EntryFields, EntryUpdate, Vault, VAULT_VERSION};
pub use session::{LockReason, LockStatus, SessionSnapshot, VaultSession};
