//! Plugin configuration.
//!
//! Plugins are configured with a small flags language plus arbitrary JSON
//! options:
//!
//! ```text
//! "print,enabled"        -> {"print": true, "enabled": true}
//! "before:off,time:on"   -> {"before": false, "time": true}
//! ```
//!
//! Configuration is layered. For a call to method `m` the effective config is
//! the global config, overridden by the `*` selector, overridden by any
//! selector naming `m` (selectors may be comma lists such as `"add,remove"`),
//! overridden by the call-site override.

use serde_json::{Map, Value};

use crate::error::RouterError;

/// Parses a flags string into a map of booleans.
///
/// Empty segments are ignored. A flag with no suffix is `true`; `:on`,
/// `:true` and `:yes` are `true`; `:off`, `:false` and `:no` are `false`.
pub fn parse_flags(flags: &str) -> Result<Map<String, Value>, RouterError> {
    let invalid = |reason: String| RouterError::InvalidFlags {
        flags: flags.to_string(),
        reason,
    };

    let mut out = Map::new();
    for token in flags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (name, value) = match token.split_once(':') {
            None => (token, true),
            Some((name, state)) => match state.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" => (name.trim(), true),
                "off" | "false" | "no" => (name.trim(), false),
                other => return Err(invalid(format!("unknown state '{}' for '{}'", other, name))),
            },
        };
        if name.is_empty() {
            return Err(invalid("empty flag name".into()));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(format!("bad flag name '{}'", name)));
        }
        out.insert(name.to_string(), Value::Bool(value));
    }
    Ok(out)
}

/// Shallow-merges `overlay` into `base`.
pub fn merge_into(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Global config plus per-method overrides for one plugin.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    global: Map<String, Value>,
    methods: Vec<(Vec<String>, Map<String, Value>)>,
}

impl PluginConfig {
    pub fn new(defaults: Map<String, Value>) -> Self {
        Self {
            global: defaults,
            methods: Vec::new(),
        }
    }

    pub fn global(&self) -> &Map<String, Value> {
        &self.global
    }

    pub fn set_global(&mut self, values: &Map<String, Value>) {
        merge_into(&mut self.global, values);
    }

    /// Merges an override for a selector (`"*"`, `"add"` or `"add,remove"`).
    pub fn set_method(&mut self, selector: &str, values: &Map<String, Value>) {
        let names = split_selector(selector);
        if let Some((_, existing)) = self.methods.iter_mut().find(|(s, _)| *s == names) {
            merge_into(existing, values);
        } else {
            self.methods.push((names, values.clone()));
        }
    }

    /// Effective config for a method.
    pub fn resolve(&self, method: &str, call_site: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut out = self.global.clone();
        for (names, values) in &self.methods {
            if names.iter().any(|n| n == "*") {
                merge_into(&mut out, values);
            }
        }
        for (names, values) in &self.methods {
            if names.iter().any(|n| n == method) {
                merge_into(&mut out, values);
            }
        }
        if let Some(values) = call_site {
            merge_into(&mut out, values);
        }
        out
    }
}

fn split_selector(selector: &str) -> Vec<String> {
    let mut names: Vec<String> = selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    names.sort();
    names
}

/// Reads a boolean flag out of a resolved config.
pub fn flag(config: &Map<String, Value>, name: &str) -> bool {
    matches!(config.get(name), Some(Value::Bool(true)))
}
