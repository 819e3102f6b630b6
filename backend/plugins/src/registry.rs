//! Plugin set: the named capability factories a process exposes.
//!
//! Names are resolved once when serving starts; each factory yields a value
//! satisfying the capability contract.

use std::collections::HashMap;
use std::sync::Arc;

use runbridge_core::Capability;

/// Builds one capability instance.
pub type CapabilityFactory = Box<dyn Fn() -> Arc<dyn Capability> + Send + Sync>;

/// Default name under which single-plugin processes register.
pub const DEFAULT_PLUGIN_NAME: &str = "plugin";

#[derive(Default)]
pub struct PluginSet {
    factories: HashMap<String, CapabilityFactory>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding `factory` under [`DEFAULT_PLUGIN_NAME`].
    pub fn single<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Capability> + Send + Sync + 'static,
    {
        Self::new().register(DEFAULT_PLUGIN_NAME, factory)
    }

    /// Register a factory. A later registration under the same name replaces the earlier one.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Capability> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run every factory once.
    pub fn instantiate(&self) -> HashMap<String, Arc<dyn Capability>> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory()))
            .collect()
    }
}
