//! The plugin contract.
//!
//! A plugin wraps the execution of every method on the routers it is plugged
//! into. The router composes the chain eagerly, at registration and at plug
//! time, by folding the plugin list from last-attached to first-attached:
//!
//! ```text
//! plugins = [validate, dbop, logging]
//!
//! call → validate → dbop → logging → method body
//!        (outermost)                 (innermost)
//! ```
//!
//! Before-behaviour therefore runs in attachment order and after/error
//! behaviour in reverse. Each layer is gated: when a plugin is disabled for
//! the calling instance and method, the router skips straight to the next
//! layer.
//!
//! # Lifecycle
//!
//! 1. [`Plugin::on_decore`] fires once per entry, in attachment order, when
//!    the entry is registered or when the plugin is plugged after the fact.
//!    It may mutate `entry.metadata`.
//! 2. [`Plugin::wrap_handler`] builds the plugin's layer around `next`.
//!    Errors surface here, never at call time.
//! 3. [`Plugin::describe_entry`] and [`Plugin::filter_entry`] feed
//!    introspection and channel filtering.
//!
//! # State
//!
//! Each plugin owns a [`PluginCore`]: its configuration (global plus
//! per-method overrides) and its runtime toggles, keyed by
//! ([`InstanceKey`], method). A toggle lives only as long as its handler.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::call::{Handler, InstanceKey, MethodFn};
use crate::config::{self, PluginConfig};
use crate::entry::MethodEntry;
use crate::error::RouterError;
use crate::resource::TransactionalResource;

/// What a plugin sees of the router it is working for.
pub struct PluginContext<'a> {
    pub router: &'a str,
    pub handler: &'a Arc<dyn Handler>,
}

impl<'a> PluginContext<'a> {
    pub fn instance(&self) -> InstanceKey {
        InstanceKey::of(self.handler)
    }

    pub fn resource(&self) -> Option<&dyn TransactionalResource> {
        self.handler.resource()
    }
}

/// A channel/scope view used to filter entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    /// Channel code, e.g. `CLI` or `HTTP`.
    pub channel: Option<String>,
    /// Scope tags; an entry must carry at least one of them.
    pub scopes: Vec<String>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn channel(code: impl Into<String>) -> Self {
        Self {
            channel: Some(code.into()),
            scopes: Vec::new(),
        }
    }

    pub fn scope(mut self, tag: impl Into<String>) -> Self {
        self.scopes.push(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_none() && self.scopes.is_empty()
    }
}

/// Runtime toggles for one handler instance.
///
/// The weak owner keeps the handler's address from being reused while the
/// entry exists; entries whose handler is gone are ignored and pruned.
struct InstanceToggles {
    owner: Weak<dyn Handler>,
    methods: HashMap<String, bool>,
}

impl InstanceToggles {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

type Toggles = HashMap<InstanceKey, InstanceToggles>;

/// Configuration and runtime toggle state shared by every plugin.
pub struct PluginCore {
    name: String,
    known_flags: Option<Vec<&'static str>>,
    config: RwLock<PluginConfig>,
    toggles: RwLock<Toggles>,
}

impl PluginCore {
    /// Creates a core with default config. `enabled` defaults to true unless
    /// the defaults say otherwise.
    pub fn new(name: impl Into<String>, defaults: Map<String, Value>) -> Self {
        let mut defaults = defaults;
        defaults.entry("enabled").or_insert(Value::Bool(true));
        Self {
            name: name.into(),
            known_flags: None,
            config: RwLock::new(PluginConfig::new(defaults)),
            toggles: RwLock::new(HashMap::new()),
        }
    }

    /// Restricts the flag names accepted by [`configure`](Self::configure).
    /// `enabled` is always accepted.
    pub fn with_known_flags(mut self, flags: &[&'static str]) -> Self {
        self.known_flags = Some(flags.to_vec());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, flags: &str) -> Result<Map<String, Value>, RouterError> {
        let parsed = config::parse_flags(flags)?;
        if let Some(known) = &self.known_flags {
            if let Some(bad) = parsed
                .keys()
                .find(|k| k.as_str() != "enabled" && !known.contains(&k.as_str()))
            {
                return Err(RouterError::InvalidFlags {
                    flags: flags.to_string(),
                    reason: format!(
                        "plugin '{}' has no flag '{}' (known: {})",
                        self.name,
                        bad,
                        known.join(", ")
                    ),
                });
            }
        }
        Ok(parsed)
    }

    /// Merges flags into the global config.
    pub fn configure(&self, flags: &str) -> Result<(), RouterError> {
        let parsed = self.parse(flags)?;
        self.config.write().set_global(&parsed);
        Ok(())
    }

    /// Merges flags into the override for a selector (`*`, a name, or a
    /// comma list of names).
    pub fn configure_method(&self, selector: &str, flags: &str) -> Result<(), RouterError> {
        let parsed = self.parse(flags)?;
        self.config.write().set_method(selector, &parsed);
        Ok(())
    }

    /// Sets a non-flag option, globally or for a selector.
    pub fn set_option(&self, selector: Option<&str>, key: &str, value: Value) {
        let mut values = Map::new();
        values.insert(key.to_string(), value);
        let mut config = self.config.write();
        match selector {
            Some(selector) => config.set_method(selector, &values),
            None => config.set_global(&values),
        }
    }

    /// Validates flags without applying them.
    pub fn check_flags(&self, flags: &str) -> Result<Map<String, Value>, RouterError> {
        self.parse(flags)
    }

    /// Effective config for a method, including a call-site override.
    pub fn config_for(&self, method: &str, call_site: Option<&Map<String, Value>>) -> Map<String, Value> {
        self.config.read().resolve(method, call_site)
    }

    pub fn flag(&self, method: &str, name: &str) -> bool {
        config::flag(&self.config_for(method, None), name)
    }

    /// Records a runtime toggle for one (handler, method) pair.
    ///
    /// Toggles left behind by dropped handlers are pruned here.
    pub fn set_enabled(&self, handler: &Arc<dyn Handler>, method: &str, enabled: bool) {
        let mut toggles = self.toggles.write();
        toggles.retain(|_, entry| entry.is_live());
        toggles
            .entry(InstanceKey::of(handler))
            .or_insert_with(|| InstanceToggles {
                owner: Arc::downgrade(handler),
                methods: HashMap::new(),
            })
            .methods
            .insert(method.to_string(), enabled);
    }

    /// Drops a runtime toggle so the static config applies again.
    pub fn clear_toggle(&self, instance: InstanceKey, method: &str) {
        if let Some(entry) = self.toggles.write().get_mut(&instance) {
            entry.methods.remove(method);
        }
    }

    /// A runtime toggle wins over the configured `enabled` flag.
    pub fn is_enabled(
        &self,
        instance: InstanceKey,
        method: &str,
        call_site: Option<&Map<String, Value>>,
    ) -> bool {
        if let Some(on) = self
            .toggles
            .read()
            .get(&instance)
            .filter(|entry| entry.is_live())
            .and_then(|entry| entry.methods.get(method))
        {
            return *on;
        }
        config::flag(&self.config_for(method, call_site), "enabled")
    }
}

impl std::fmt::Debug for PluginCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCore")
            .field("name", &self.name)
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}

/// A capability that wraps method execution.
pub trait Plugin: Send + Sync + 'static {
    fn core(&self) -> &PluginCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Fires once per entry. May enrich `entry.metadata`.
    fn on_decore(&self, _ctx: &PluginContext<'_>, _entry: &mut MethodEntry) -> Result<(), RouterError> {
        Ok(())
    }

    /// Builds this plugin's layer around `next`.
    fn wrap_handler(
        self: Arc<Self>,
        ctx: &PluginContext<'_>,
        entry: &MethodEntry,
        next: MethodFn,
    ) -> Result<MethodFn, RouterError>;

    /// Contribution to `describe()`, stored under the returned key.
    fn describe_entry(&self, _entry: &MethodEntry) -> Option<(String, Value)> {
        None
    }

    /// Whether the entry is visible under `filter`.
    fn filter_entry(&self, _entry: &MethodEntry, _filter: &EntryFilter) -> bool {
        true
    }

    fn enable(&self, handler: &Arc<dyn Handler>, method: &str) {
        self.core().set_enabled(handler, method, true);
    }

    fn disable(&self, handler: &Arc<dyn Handler>, method: &str) {
        self.core().set_enabled(handler, method, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn core() -> PluginCore {
        let mut defaults = Map::new();
        defaults.insert("enabled".into(), json!(false));
        PluginCore::new("logging", defaults).with_known_flags(&["print", "before"])
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let core = PluginCore::new("x", Map::new());
        assert!(core.is_enabled(InstanceKey::of(&Arc::new(())), "m", None));
    }

    #[test]
    fn test_configure_rejects_unknown_flag() {
        let core = core();
        let err = core.configure("print,colour").unwrap_err();
        assert!(err.to_string().contains("colour"));
        assert!(!core.flag("m", "print"));
    }

    fn handler() -> Arc<dyn Handler> {
        Arc::new(())
    }

    #[test]
    fn test_toggle_wins_over_config() {
        let core = core();
        let h = handler();
        let x = InstanceKey::of(&h);
        core.configure("enabled").unwrap();
        core.set_enabled(&h, "add", false);
        assert!(!core.is_enabled(x, "add", None));
        assert!(core.is_enabled(x, "list", None));
        core.clear_toggle(x, "add");
        assert!(core.is_enabled(x, "add", None));
    }

    #[test]
    fn test_toggles_of_dropped_handler_are_pruned() {
        let core = core();
        core.configure("enabled").unwrap();
        let gone = handler();
        let x = InstanceKey::of(&gone);
        core.set_enabled(&gone, "add", false);
        drop(gone);
        assert!(core.is_enabled(x, "add", None));

        let kept = handler();
        core.set_enabled(&kept, "add", false);
        let toggles = core.toggles.read();
        assert_eq!(toggles.len(), 1);
        assert!(toggles.contains_key(&InstanceKey::of(&kept)));
    }

    #[test]
    fn test_call_site_override_enables() {
        let core = core();
        let x = InstanceKey::of(&Arc::new(()));
        let mut call_site = Map::new();
        call_site.insert("enabled".into(), json!(true));
        assert!(!core.is_enabled(x, "add", None));
        assert!(core.is_enabled(x, "add", Some(&call_site)));
    }

    #[test]
    fn test_set_option_per_selector() {
        let core = core();
        core.set_option(Some("add"), "label", json!("write"));
        assert_eq!(core.config_for("add", None)["label"], "write");
        assert!(core.config_for("list", None).get("label").is_none());
    }

    #[test]
    fn test_entry_filter_builders() {
        assert!(EntryFilter::all().is_empty());
        let f = EntryFilter::channel("HTTP").scope("public");
        assert_eq!(f.channel.as_deref(), Some("HTTP"));
        assert_eq!(f.scopes, vec!["public"]);
    }
}
