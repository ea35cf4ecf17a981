//! Plugin registry.
//!
//! Plugins are linked into the binary. A [`PluginCatalog`] maps load
//! locations (the `url` of a plugin entry) to factories; the
//! [`PluginRegistry`] holds the instances created from the configuration
//! document at startup and keeps them for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::PluginEntry;
use crate::distribution::builtin;
use crate::distribution::plugin::{Distributor, Plugin, Transformer};
use crate::error::PluginError;

type Factory = Arc<dyn Fn() -> Result<Plugin, PluginError> + Send + Sync>;

/// Location → factory table.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, Factory>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the plugins shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(builtin::TEMPLATE_TRANSFORM, || {
            Ok(Plugin::Transformer(Arc::new(builtin::TemplateTransformer::new())))
        });
        catalog.register(builtin::WEBHOOK_DISTRIBUTOR, || {
            Ok(Plugin::Distributor(Arc::new(builtin::WebhookDistributor::new())))
        });
        catalog.register(builtin::LOG_DISTRIBUTOR, || {
            Ok(Plugin::Distributor(Arc::new(builtin::LogDistributor)))
        });
        catalog
    }

    /// Register a factory under a load location. Replaces any earlier entry.
    pub fn register<F>(&mut self, location: &str, factory: F)
    where
        F: Fn() -> Result<Plugin, PluginError> + Send + Sync + 'static,
    {
        self.factories.insert(location.to_string(), Arc::new(factory));
    }

    fn instantiate(&self, name: &str, location: &str) -> Result<Plugin, PluginError> {
        let factory = self
            .factories
            .get(location)
            .ok_or_else(|| PluginError::LoadFailed {
                name: name.to_string(),
                reason: format!("no plugin available at {location}"),
            })?;
        factory()
    }
}

/// Plugins loaded for this process, keyed by configured name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Plugin>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured plugin.
    ///
    /// An entry without a location is a startup error. Any other failure is
    /// logged and leaves that plugin out; the rest still load.
    pub fn load(
        entries: &HashMap<String, PluginEntry>,
        catalog: &PluginCatalog,
    ) -> Result<Self, PluginError> {
        let mut registry = Self::new();

        for (name, entry) in entries {
            if entry.url.trim().is_empty() {
                return Err(PluginError::MissingLocation { name: name.clone() });
            }

            let plugin = match catalog.instantiate(name, entry.url.trim()) {
                Ok(plugin) => plugin,
                Err(e) => {
                    error!(plugin = %name, location = %entry.url, error = %e, "Plugin failed to load");
                    continue;
                }
            };

            if plugin.kind() != entry.kind {
                let e = PluginError::WrongKind {
                    name: name.clone(),
                    expected: entry.kind.to_string(),
                    actual: plugin.kind().to_string(),
                };
                error!(plugin = %name, error = %e, "Plugin failed to load");
                continue;
            }

            debug!(plugin = %name, kind = %entry.kind, "Loaded plugin");
            registry.plugins.insert(name.clone(), plugin);
        }

        info!(loaded = registry.count(), declared = entries.len(), "Plugins loaded");
        Ok(registry)
    }

    /// Insert an already-built plugin.
    pub fn insert(&mut self, name: &str, plugin: Plugin) {
        self.plugins.insert(name.to_string(), plugin);
    }

    pub fn transformer(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        match self.plugins.get(name) {
            Some(Plugin::Transformer(t)) => Some(Arc::clone(t)),
            _ => None,
        }
    }

    pub fn distributor(&self, name: &str) -> Option<Arc<dyn Distributor>> {
        match self.plugins.get(name) {
            Some(Plugin::Distributor(d)) => Some(Arc::clone(d)),
            _ => None,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// All loaded plugin names.
    pub fn list(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.plugins.len()
    }

    /// Give every plugin a chance to release resources.
    pub async fn shutdown_all(&self) {
        for (name, plugin) in &self.plugins {
            if let Err(e) = plugin.shutdown().await {
                warn!(plugin = %name, error = %e, "Plugin shutdown failed");
            }
        }
    }
}
