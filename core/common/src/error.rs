//! Common error types for Pearanoid.

use thiserror::Error;

/// Top-level error type for Pearanoid operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The encrypted vault could not be fetched or saved.
    ///
    /// Covers network and remote-store failures. Callers may retry the
    /// whole operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No vault exists yet.
    ///
    /// Not a failure in itself: it drives the vault-creation path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Decryption failed.
    ///
    /// Wrong password and corrupted ciphertext are reported identically.
    #[error("Invalid master password")]
    Authentication,

    /// Caller-supplied input was rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Cryptographic operation failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted in the current state.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
