//! Storage providers for the encrypted vault blob.
//!
//! The vault core needs exactly two operations from storage: fetch the
//! current blob and replace it. Providers treat the blob as opaque bytes;
//! its format belongs to the crypto layer.
//!
//! # Design Principles
//! - Provider isolation: no provider-specific logic in vault or crypto modules
//! - Async operations: all I/O operations are async
//! - Unified error semantics: `NotFound` when no vault exists yet,
//!   `Transport` for everything that went wrong on the way

pub mod http;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;

pub use http::{HttpConfig, HttpProvider};
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::StorageProvider;
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
