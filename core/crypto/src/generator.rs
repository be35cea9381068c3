//! Random password generation.
//!
//! Every selected character class contributes at least one character; the
//! rest are drawn from the union of the selected classes and the result is
//! shuffled. All randomness comes from the OS CSPRNG.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use pearanoid_common::{Error, Result};

/// Shortest password the generator will produce.
pub const MIN_LENGTH: usize = 4;

/// Longest password the generator will produce.
pub const MAX_LENGTH: usize = 1024;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_-+=<>?/[]{}|~";

/// Which characters a generated password may contain, and how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub length: usize,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digits: bool,
    pub symbols: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 16,
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
        }
    }
}

impl PasswordPolicy {
    fn classes(&self) -> Vec<&'static [u8]> {
        [
            (self.uppercase, UPPERCASE),
            (self.lowercase, LOWERCASE),
            (self.digits, DIGITS),
            (self.symbols, SYMBOLS),
        ]
        .into_iter()
        .filter_map(|(enabled, set)| enabled.then_some(set))
        .collect()
    }

    /// Check the policy can produce a password.
    ///
    /// # Errors
    /// - `Validation` if length is outside [`MIN_LENGTH`]..=[`MAX_LENGTH`]
    /// - `Validation` if no character class is selected
    pub fn validate(&self) -> Result<()> {
        if self.length < MIN_LENGTH {
            return Err(Error::Validation(format!(
                "Password length must be at least {} characters",
                MIN_LENGTH
            )));
        }
        if self.length > MAX_LENGTH {
            return Err(Error::Validation(format!(
                "Password length must be at most {} characters",
                MAX_LENGTH
            )));
        }
        if self.classes().is_empty() {
            return Err(Error::Validation(
                "At least one character set must be selected".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate a password satisfying `policy`.
pub fn generate_password(policy: &PasswordPolicy) -> Result<Zeroizing<String>> {
    policy.validate()?;

    let classes = policy.classes();
    let pool: Vec<u8> = classes.iter().flat_map(|set| set.iter().copied()).collect();
    let mut rng = OsRng;

    let mut chars = Zeroizing::new(Vec::with_capacity(policy.length));
    for set in &classes {
        chars.push(set[rng.gen_range(0..set.len())]);
    }
    while chars.len() < policy.length {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }
    chars.shuffle(&mut rng);

    // Every byte comes from the ASCII tables above.
    let password: String = chars.iter().map(|&b| b as char).collect();
    Ok(Zeroizing::new(password))
}
