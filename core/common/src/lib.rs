//! Common utilities and types shared across Pearanoid modules.
//!
//! This module provides the error taxonomy used by every layer and a few
//! small value types that more than one crate needs.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::EntryId;
