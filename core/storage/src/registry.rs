//! Provider registry for dynamic provider resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::http::{HttpConfig, HttpProvider};
use crate::local::LocalProvider;
use crate::memory::MemoryProvider;
use crate::provider::StorageProvider;
use pearanoid_common::{Error, Result};

/// Factory function type for creating providers.
pub type ProviderFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Registry for storage provider factories.
///
/// Allows dynamic registration and resolution of storage providers
/// by name and configuration.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Provider '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a provider by name and configuration.
    ///
    /// # Errors
    /// - `InvalidInput` if no provider is registered under `name`
    /// - Whatever the factory reports for an invalid configuration
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn StorageProvider>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::InvalidInput(format!("Provider '{}' is not registered", name))
        })?;
        factory(config)
    }

    /// Get list of registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_factory(_config: Value) -> Result<Arc<dyn StorageProvider>> {
    Ok(Arc::new(MemoryProvider::new()))
}

fn local_factory(config: Value) -> Result<Arc<dyn StorageProvider>> {
    let root = config
        .get("root")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidInput("Local provider requires 'root' path".to_string()))?;
    Ok(Arc::new(LocalProvider::new(root)?))
}

fn http_factory(config: Value) -> Result<Arc<dyn StorageProvider>> {
    let config: HttpConfig = serde_json::from_value(config)
        .map_err(|e| Error::InvalidInput(format!("Invalid http provider config: {}", e)))?;
    Ok(Arc::new(HttpProvider::new(config)?))
}

/// Create a registry with the built-in providers: `memory`, `local`, `http`.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .factories
        .insert("memory".to_string(), Box::new(memory_factory));
    registry
        .factories
        .insert("local".to_string(), Box::new(local_factory));
    registry
        .factories
        .insert("http".to_string(), Box::new(http_factory));
    registry
}
