//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{MasterKey, Salt, KEY_LENGTH};
use pearanoid_common::{Error, Result};

/// Smallest memory cost accepted, in KiB (19 MiB).
pub const MIN_MEMORY_COST: u32 = 19_456;

/// Smallest time cost accepted.
pub const MIN_TIME_COST: u32 = 2;

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for mobile devices.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// The weakest parameters [`derive_key`] accepts.
    pub fn minimum() -> Self {
        Self {
            memory_cost: MIN_MEMORY_COST,
            time_cost: MIN_TIME_COST,
            parallelism: 1,
        }
    }

    /// Parse a named preset: "interactive", "moderate", "sensitive" or "minimum".
    pub fn from_preset(name: &str) -> Result<Self> {
        match name {
            "interactive" => Ok(Self::interactive()),
            "moderate" => Ok(Self::moderate()),
            "sensitive" => Ok(Self::sensitive()),
            "minimum" => Ok(Self::minimum()),
            other => Err(Error::InvalidInput(format!(
                "Unknown KDF preset '{}': use interactive, moderate, sensitive or minimum",
                other
            ))),
        }
    }

    /// Reject parameters weaker than the accepted floor.
    pub fn validate(&self) -> Result<()> {
        if self.memory_cost < MIN_MEMORY_COST {
            return Err(Error::Crypto(format!(
                "KDF memory cost must be at least {} KiB (got {})",
                MIN_MEMORY_COST, self.memory_cost
            )));
        }
        if self.time_cost < MIN_TIME_COST {
            return Err(Error::Crypto(format!(
                "KDF time cost must be at least {} (got {})",
                MIN_TIME_COST, self.time_cost
            )));
        }
        if self.parallelism < 1 {
            return Err(Error::Crypto(
                "KDF parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a master key from a password and salt using Argon2id.
///
/// # Preconditions
/// - `password` must not be empty
/// - `params` must pass [`KdfParams::validate`]
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
/// - Different salts yield independent keys for the same password
///
/// # Errors
/// - `Validation` if password is empty
/// - `Crypto` if parameters are below the floor or rejected by Argon2
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::Validation("Password cannot be empty".to_string()));
    }
    params.validate()?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password, salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    let key = MasterKey::from_bytes(key_bytes);
    zeroize::Zeroize::zeroize(&mut key_bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SALT_LENGTH;

    #[test]
    fn test_derive_key_deterministic() {
        let password = b"test-password-123";
        let salt = Salt::from_bytes([42u8; SALT_LENGTH]);
        let params = KdfParams::minimum();

        let key1 = derive_key(password, &salt, &params).unwrap();
        let key2 = derive_key(password, &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let password = b"test-password-123";
        let salt1 = Salt::from_bytes([1u8; SALT_LENGTH]);
        let salt2 = Salt::from_bytes([2u8; SALT_LENGTH]);
        let params = KdfParams::minimum();

        let key1 = derive_key(password, &salt1, &params).unwrap();
        let key2 = derive_key(password, &salt2, &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = Salt::from_bytes([42u8; SALT_LENGTH]);
        let params = KdfParams::minimum();

        let key1 = derive_key(b"password1", &salt, &params).unwrap();
        let key2 = derive_key(b"password2", &salt, &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        let salt = Salt::generate();
        let params = KdfParams::minimum();

        assert!(matches!(
            derive_key(b"", &salt, &params),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_weak_params_rejected() {
        let salt = Salt::generate();
        let weak = KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        };

        assert!(matches!(
            derive_key(b"password", &salt, &weak),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_presets_pass_validation() {
        for name in ["interactive", "moderate", "sensitive", "minimum"] {
            KdfParams::from_preset(name).unwrap().validate().unwrap();
        }
        assert!(KdfParams::from_preset("turbo").is_err());
    }

    #[test]
    fn test_params_json_roundtrip() {
        let params = KdfParams::moderate();
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(serde_json::from_str::<KdfParams>(&json).unwrap(), params);
    }
}
