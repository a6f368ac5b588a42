//! Process-wide registry of named plugin factories.
//!
//! `Router::plug_named("logging", "print,enabled")` looks the name up here.
//! The built-in plugins are registered on first use; applications add their
//! own with [`register_plugin`].

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::RouterError;
use crate::plugin::Plugin;
use crate::plugins::{LoggingPlugin, PublishPlugin, TransactionPlugin, ValidationPlugin};

/// Builds a fresh plugin instance.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

static REGISTRY: Lazy<RwLock<IndexMap<String, PluginFactory>>> = Lazy::new(|| {
    let mut map: IndexMap<String, PluginFactory> = IndexMap::new();
    map.insert("validate".into(), Arc::new(|| Arc::new(ValidationPlugin::new())));
    map.insert("dbop".into(), Arc::new(|| Arc::new(TransactionPlugin::new())));
    map.insert("logging".into(), Arc::new(|| Arc::new(LoggingPlugin::new())));
    map.insert("publish".into(), Arc::new(|| Arc::new(PublishPlugin::new())));
    RwLock::new(map)
});

/// Registers (or replaces) a factory under `name`.
pub fn register_plugin<F>(name: impl Into<String>, factory: F)
where
    F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
{
    REGISTRY.write().insert(name.into(), Arc::new(factory));
}

/// Creates a plugin by name.
pub fn create_plugin(name: &str) -> Result<Arc<dyn Plugin>, RouterError> {
    let factory = REGISTRY.read().get(name).cloned();
    match factory {
        Some(factory) => Ok(factory()),
        None => Err(RouterError::UnknownPlugin {
            name: name.to_string(),
            available: registered_plugins(),
        }),
    }
}

/// Registered names, in registration order.
pub fn registered_plugins() -> Vec<String> {
    REGISTRY.read().keys().cloned().collect()
}
