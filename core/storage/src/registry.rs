//! Backend registry for dynamic backend resolution.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use omnistore_common::{Error, Result};

use crate::local::{LocalBackend, LocalConfig};
use crate::memory::{MemoryBackend, MemoryConfig};
use crate::provider::Storage;

/// Factory function type for creating backends.
pub type ProviderFactory = Box<dyn Fn(Value) -> Result<Arc<dyn Storage>> + Send + Sync>;

/// Backend selection: a registered name plus its options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered backend name ("memory", "local", "s3").
    pub provider: String,
    /// Backend-specific options handed to the factory.
    #[serde(default)]
    pub options: Value,
}

impl ProviderConfig {
    /// Read a JSON config file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::from_io(e, format!("Config file not found: {}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Resolve the configured backend from `registry`.
    pub fn open(self, registry: &ProviderRegistry) -> Result<Arc<dyn Storage>> {
        registry.resolve(&self.provider, self.options)
    }
}

/// Registry for storage backend factories.
///
/// Allows dynamic registration and resolution of backends
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

    /// Register a backend factory.
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

    /// Resolve a backend by name and configuration.
    ///
    /// # Errors
    /// - Provider not registered
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn Storage>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::Config(format!("Provider '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered backend names.
    pub fn providers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a backend is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize backend options, treating `null` as an empty object.
fn parse_options<T: DeserializeOwned>(provider: &str, config: Value) -> Result<T> {
    let config = match config {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(config)
        .map_err(|e| Error::Config(format!("Invalid {} config: {}", provider, e)))
}

fn create_memory_backend(config: Value) -> Result<Arc<dyn Storage>> {
    let backend: Arc<dyn Storage> = MemoryBackend::new(parse_options::<MemoryConfig>("memory", config)?)?;
    Ok(backend)
}

fn create_local_backend(config: Value) -> Result<Arc<dyn Storage>> {
    let backend: Arc<dyn Storage> = LocalBackend::new(parse_options::<LocalConfig>("local", config)?)?;
    Ok(backend)
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> ProviderRegistry {
    let builtins: [(&str, ProviderFactory); 3] = [
        ("memory", Box::new(create_memory_backend)),
        ("local", Box::new(create_local_backend)),
        ("s3", Box::new(crate::s3::create_s3_backend)),
    ];

    ProviderRegistry {
        factories: builtins
            .into_iter()
            .map(|(name, factory)| (name.to_string(), factory))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_factory() -> ProviderFactory {
        Box::new(|_| {
            let backend: Arc<dyn Storage> = MemoryBackend::new(MemoryConfig::default())?;
            Ok(backend)
        })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProviderRegistry::new();
        registry.register("test", memory_factory()).unwrap();

        let backend = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ProviderRegistry::new();
        registry.register("test", memory_factory()).unwrap();

        let result = registry.register("test", memory_factory());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        let result = registry.resolve("unknown", Value::Null);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_providers_list() {
        let mut registry = ProviderRegistry::new();
        registry.register("a", memory_factory()).unwrap();
        registry.register("b", memory_factory()).unwrap();

        let providers = registry.providers();
        assert!(providers.contains(&"a".to_string()));
        assert!(providers.contains(&"b".to_string()));
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        for name in ["memory", "local", "s3"] {
            assert!(registry.has_provider(name), "missing {}", name);
        }
    }

    #[test]
    fn test_default_memory_with_null_options() {
        let registry = create_default_registry();
        let backend = registry.resolve("memory", Value::Null).unwrap();
        assert_eq!(backend.endpoint(), "memory.memory.localhost");
    }

    #[tokio::test]
    async fn test_local_from_config_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("objects");
        let config_path = dir.path().join("backend.json");
        let config = serde_json::json!({
            "provider": "local",
            "options": { "root": root }
        });
        tokio::fs::write(&config_path, config.to_string()).await.unwrap();

        let backend = ProviderConfig::from_file(&config_path)
            .await
            .unwrap()
            .open(&create_default_registry())
            .unwrap();

        assert_eq!(backend.name(), "local");
        backend.put("a.txt", "hello".into()).await.unwrap();
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn test_invalid_options() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.resolve("local", serde_json::json!({ "root": 42 })),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let err = ProviderConfig::from_file(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
