//! Provider registry: name → factory, with cached default instances.
//!
//! Names are case-insensitive (stored lower-cased). A lookup without a
//! config (or with an empty one) returns a shared default instance, created
//! on first use. A lookup with a non-empty config always builds a fresh,
//! uncached instance.
//!
//! The registry is internally synchronized; share it by reference or
//! through [`global_registry`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokenspy_settings::TokenSpySettings;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::openai::{OpenAiCompatibleProvider, OpenAiFlavor};
use crate::provider::{Provider, ProviderConfig, ProviderError, ProviderResult};

/// Builds a provider instance from a config.
pub type ProviderFactory = Arc<dyn Fn(&ProviderConfig) -> Arc<dyn Provider> + Send + Sync>;

#[derive(Default)]
struct Inner {
    factories: BTreeMap<String, ProviderFactory>,
    instances: HashMap<String, Arc<dyn Provider>>,
}

/// Thread-safe provider registry.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in providers registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register `anthropic`, `openai`, `moonshot`, and `local`.
    pub fn register_builtins(&self) {
        self.register("anthropic", |config| {
            Arc::new(AnthropicProvider::new(config.clone()))
        });
        for flavor in [OpenAiFlavor::OpenAi, OpenAiFlavor::Moonshot, OpenAiFlavor::Local] {
            self.register(flavor.name(), move |config| {
                Arc::new(OpenAiCompatibleProvider::new(flavor, config.clone()))
            });
        }
    }

    /// Register `factory` under `name`, replacing any previous registration.
    ///
    /// A cached default instance from the previous factory is discarded.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        let key = name.to_lowercase();
        let mut inner = self.inner.write();
        let _ = inner.instances.remove(&key);
        debug!(provider = %key, "provider registered");
        let _ = inner.factories.insert(key, Arc::new(factory));
    }

    /// Look up a provider.
    ///
    /// `None` or an empty config returns the shared default instance.
    pub fn get(
        &self,
        name: &str,
        config: Option<&ProviderConfig>,
    ) -> ProviderResult<Arc<dyn Provider>> {
        let key = name.to_lowercase();

        if let Some(config) = config.filter(|c| !c.is_empty()) {
            let factory = self.factory(name, &key)?;
            return Ok(factory(config));
        }

        {
            let inner = self.inner.read();
            if let Some(instance) = inner.instances.get(&key) {
                return Ok(Arc::clone(instance));
            }
        }

        let mut inner = self.inner.write();
        if let Some(instance) = inner.instances.get(&key) {
            return Ok(Arc::clone(instance));
        }
        let factory = inner
            .factories
            .get(&key)
            .cloned()
            .ok_or_else(|| unknown(name, &inner.factories))?;
        let instance = factory(&ProviderConfig::default());
        let _ = inner.instances.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    /// Look up a provider configured from `settings`.
    pub fn get_configured(
        &self,
        name: &str,
        settings: &TokenSpySettings,
    ) -> ProviderResult<Arc<dyn Provider>> {
        let config = ProviderConfig::from_settings(settings, name);
        self.get(name, Some(&config))
    }

    /// Like [`get`](Self::get), returning `None` for unknown names.
    pub fn get_or_none(
        &self,
        name: &str,
        config: Option<&ProviderConfig>,
    ) -> Option<Arc<dyn Provider>> {
        self.get(name, config).ok()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.inner.read().factories.keys().cloned().collect()
    }

    /// Whether `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.read().factories.contains_key(&name.to_lowercase())
    }

    /// Remove a registration and its cached instance.
    ///
    /// Returns `false` if `name` was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        let mut inner = self.inner.write();
        let _ = inner.instances.remove(&key);
        inner.factories.remove(&key).is_some()
    }

    /// Drop all cached default instances.
    pub fn clear_cache(&self) {
        self.inner.write().instances.clear();
    }

    fn factory(&self, name: &str, key: &str) -> ProviderResult<ProviderFactory> {
        let inner = self.inner.read();
        inner
            .factories
            .get(key)
            .cloned()
            .ok_or_else(|| unknown(name, &inner.factories))
    }
}

fn unknown(name: &str, factories: &BTreeMap<String, ProviderFactory>) -> ProviderError {
    ProviderError::UnknownProvider {
        name: name.to_string(),
        available: factories.keys().cloned().collect(),
    }
}

/// Process-wide registry with the built-ins pre-registered.
pub fn global_registry() -> &'static ProviderRegistry {
    static REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ProviderRegistry::with_builtins)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
