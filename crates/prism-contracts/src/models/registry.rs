use indexmap::IndexMap;

use super::adapter::ModelAdapter;
use super::catalog::default_adapters;
use super::descriptor::{ModelDescriptor, Provider};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown model: {0}")]
    NotFound(String),
}

/// Keyed adapter table. Populated once at startup and read-only afterwards;
/// insertion order is display order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    adapters: IndexMap<&'static str, ModelAdapter>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(adapters: Option<Vec<ModelAdapter>>) -> Self {
        let mut registry = Self {
            adapters: IndexMap::new(),
        };
        for adapter in adapters.unwrap_or_else(default_adapters) {
            registry.register(adapter);
        }
        registry
    }

    /// Re-registering a key replaces the adapter in place and keeps its slot.
    pub fn register(&mut self, adapter: ModelAdapter) {
        self.adapters.insert(adapter.key(), adapter);
    }

    pub fn get(&self, key: &str) -> Result<&ModelAdapter, RegistryError> {
        self.adapters
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    pub fn descriptor(&self, key: &str) -> Result<&ModelDescriptor, RegistryError> {
        self.get(key).map(|adapter| &adapter.descriptor)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.adapters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.adapters.keys().copied()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &ModelAdapter> {
        self.adapters.values()
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.adapters.values().map(|adapter| &adapter.descriptor)
    }

    /// Categories in order of first appearance, each listing its models in
    /// registration order.
    pub fn list_by_category(&self) -> IndexMap<&'static str, Vec<&ModelDescriptor>> {
        let mut grouped: IndexMap<&'static str, Vec<&ModelDescriptor>> = IndexMap::new();
        for descriptor in self.list() {
            grouped
                .entry(descriptor.category)
                .or_default()
                .push(descriptor);
        }
        grouped
    }

    pub fn by_provider(&self, provider: Provider) -> Vec<&ModelDescriptor> {
        self.list()
            .filter(|descriptor| descriptor.provider == provider)
            .collect()
    }
}
