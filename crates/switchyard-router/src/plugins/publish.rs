//! Scope and channel policy (`publish`).
//!
//! Entries carry scope tags (`internal`, `public`, `public_orders`, ...).
//! Each tag maps to the channel codes (`CLI`, `HTTP`, ...) it may be
//! published on. Channel adapters ask for a filtered view with an
//! [`EntryFilter`] and only see what the policy allows.
//!
//! Tags come from, in order of precedence: a per-method `scopes` option,
//! the entry's `scopes` metadata, the global `scopes` option. Channel maps
//! are merged global, then metadata, then per-method. A tag resolves to
//! channels by exact key, then glob pattern key, then `*`, then the
//! built-in rules:
//!
//! ```text
//! internal  → CLI, SYS_HTTP
//! public    → HTTP
//! public_*  → HTTP
//! ```
//!
//! Entries with no tags are unrestricted unless the `strict` flag is set.

use globset::Glob;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::call::MethodFn;
use crate::entry::MethodEntry;
use crate::error::RouterError;
use crate::plugin::{EntryFilter, Plugin, PluginContext, PluginCore};
use crate::router::Router;

/// Reference channel codes with descriptions.
pub const STANDARD_CHANNELS: &[(&str, &str)] = &[
    ("CLI", "Publisher CLI commands"),
    ("SYS_HTTP", "Shared publisher HTTP API"),
    ("SYS_WS", "Shared publisher WebSocket API"),
    ("HTTP", "Application HTTP API"),
    ("WS", "Application WebSocket API"),
    ("MCP", "Machine control protocol adapter"),
];

const DEFAULT_SCOPE_RULES: &[(&str, &[&str])] = &[
    ("internal", &["CLI", "SYS_HTTP"]),
    ("public", &["HTTP"]),
    ("public_*", &["HTTP"]),
];

/// Resolved tags and channels for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopePayload {
    pub tags: Vec<String>,
    pub channels: IndexMap<String, Vec<String>>,
}

impl ScopePayload {
    /// Every channel any tag allows.
    pub fn allowed_channels(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for codes in self.channels.values() {
            for code in codes {
                if !out.contains(&code.as_str()) {
                    out.push(code);
                }
            }
        }
        out
    }
}

type ChannelMap = IndexMap<String, Vec<String>>;

pub struct PublishPlugin {
    core: PluginCore,
}

impl Default for PublishPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishPlugin {
    pub fn new() -> Self {
        Self {
            core: PluginCore::new("publish", Map::new()).with_known_flags(&["strict"]),
        }
    }

    /// Sets scope tags globally (`None`) or for a method selector.
    pub fn set_scopes(&self, selector: Option<&str>, scopes: &str) -> Result<(), RouterError> {
        let tags = normalize_scopes(&Value::String(scopes.to_string()));
        self.core.set_option(selector, "scopes", json!(tags));
        Ok(())
    }

    /// Sets the channels allowed for one scope pattern.
    pub fn set_scope_channels(
        &self,
        selector: Option<&str>,
        scope: &str,
        channels: &str,
    ) -> Result<(), RouterError> {
        if scope.trim().is_empty() {
            return Err(self.invalid("scope name cannot be empty".into()));
        }
        let codes = normalize_channels(&Value::String(channels.to_string()))
            .map_err(|reason| self.invalid(reason))?;
        let mut map = self.option_map(selector);
        map.insert(scope.trim().to_string(), codes);
        self.core
            .set_option(selector, "scope_channels", json!(map));
        Ok(())
    }

    /// Shorthand for channels that apply to every scope (`*`).
    pub fn set_channels(&self, selector: Option<&str>, channels: &str) -> Result<(), RouterError> {
        self.set_scope_channels(selector, "*", channels)
    }

    fn invalid(&self, reason: String) -> RouterError {
        RouterError::InvalidConfig {
            plugin: self.core.name().to_string(),
            reason,
        }
    }

    fn option_map(&self, selector: Option<&str>) -> ChannelMap {
        let config = self.core.config_for(selector.unwrap_or(""), None);
        config
            .get("scope_channels")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    fn method_option(&self, method: &str, key: &str) -> Option<Value> {
        let global = self.core.config_for("", None);
        let resolved = self.core.config_for(method, None);
        match (global.get(key), resolved.get(key)) {
            (g, Some(m)) if g != Some(m) => Some(m.clone()),
            _ => None,
        }
    }

    /// Resolved scope payload, or `None` when the entry has no tags.
    pub fn payload(&self, entry: &MethodEntry) -> Option<ScopePayload> {
        let seeded = entry.metadata.get("publish");
        let tags = match self.method_option(&entry.name, "scopes") {
            Some(v) => normalize_scopes(&v),
            None => {
                let from_meta = seeded
                    .and_then(|p| p.get("scopes"))
                    .map(normalize_scopes)
                    .unwrap_or_default();
                if from_meta.is_empty() {
                    self.core
                        .config_for("", None)
                        .get("scopes")
                        .map(normalize_scopes)
                        .unwrap_or_default()
                } else {
                    from_meta
                }
            }
        };
        if tags.is_empty() {
            return None;
        }

        let mut merged = self.option_map(None);
        let layers = [
            seeded.and_then(|p| p.get("scope_channels")).cloned(),
            self.method_option(&entry.name, "scope_channels"),
        ];
        for layer in layers.into_iter().flatten() {
            if let Ok(map) = serde_json::from_value::<ChannelMap>(layer) {
                merged.extend(map);
            }
        }

        let channels = tags
            .iter()
            .map(|tag| (tag.clone(), channels_for_scope(tag, &merged)))
            .collect();
        Some(ScopePayload { tags, channels })
    }

    /// Entries of `router` exposed on `channel`, with the scopes that
    /// grant it.
    pub fn channel_map(&self, router: &Router, channel: &str) -> Result<IndexMap<String, Value>, RouterError> {
        let target = validate_code(channel).map_err(|reason| self.invalid(reason))?;
        if target.is_empty() {
            return Err(self.invalid("channel code cannot be empty".into()));
        }
        let mut out = IndexMap::new();
        for name in router.methods() {
            let Some(entry) = router.entry(&name) else {
                continue;
            };
            let Some(payload) = self.payload(&entry) else {
                continue;
            };
            let exposed: Vec<&String> = payload
                .channels
                .iter()
                .filter(|(_, codes)| codes.contains(&target))
                .map(|(scope, _)| scope)
                .collect();
            if !exposed.is_empty() {
                out.insert(
                    name,
                    json!({
                        "tags": payload.tags,
                        "channels": payload.channels,
                        "exposed_scopes": exposed,
                    }),
                );
            }
        }
        Ok(out)
    }
}

impl Plugin for PublishPlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    /// Normalizes `scopes` / `scope_channels` seeds from the entry metadata.
    fn on_decore(&self, _ctx: &PluginContext<'_>, entry: &mut MethodEntry) -> Result<(), RouterError> {
        let scopes = entry
            .metadata
            .get("scopes")
            .map(normalize_scopes)
            .unwrap_or_default();
        let channels = match entry.metadata.get("scope_channels") {
            None | Some(Value::Null) => ChannelMap::new(),
            Some(Value::Object(raw)) => {
                let mut map = ChannelMap::new();
                for (scope, codes) in raw {
                    if scope.trim().is_empty() {
                        return Err(self.invalid("scope name cannot be empty".into()));
                    }
                    let codes = normalize_channels(codes).map_err(|r| self.invalid(r))?;
                    map.insert(scope.clone(), codes);
                }
                map
            }
            Some(_) => {
                return Err(self.invalid(format!(
                    "scope_channels of '{}' must map scope -> channels",
                    entry.name
                )))
            }
        };
        entry.metadata.insert(
            "publish".into(),
            json!({ "scopes": scopes, "scope_channels": channels }),
        );
        Ok(())
    }

    fn wrap_handler(
        self: Arc<Self>,
        _ctx: &PluginContext<'_>,
        _entry: &MethodEntry,
        next: MethodFn,
    ) -> Result<MethodFn, RouterError> {
        Ok(next)
    }

    fn describe_entry(&self, entry: &MethodEntry) -> Option<(String, Value)> {
        let payload = self.payload(entry)?;
        serde_json::to_value(payload).ok().map(|v| ("scope".to_string(), v))
    }

    fn filter_entry(&self, entry: &MethodEntry, filter: &EntryFilter) -> bool {
        if filter.is_empty() {
            return true;
        }
        let payload = self.payload(entry);

        if !filter.scopes.is_empty() {
            let tagged = payload
                .as_ref()
                .is_some_and(|p| p.tags.iter().any(|t| filter.scopes.contains(t)));
            if !tagged {
                return false;
            }
        }

        if let Some(channel) = &filter.channel {
            let Some(payload) = payload else {
                return !self.core.flag(&entry.name, "strict");
            };
            let allowed = payload.allowed_channels();
            if allowed.is_empty() {
                return true;
            }
            return allowed.contains(&channel.as_str());
        }
        true
    }
}

fn channels_for_scope(scope: &str, mapping: &ChannelMap) -> Vec<String> {
    if let Some(codes) = mapping.get(scope) {
        return codes.clone();
    }
    for (pattern, codes) in mapping {
        if pattern == "*" || !pattern.contains(&['*', '?', '['][..]) {
            continue;
        }
        if glob_match(pattern, scope) {
            return codes.clone();
        }
    }
    if let Some(codes) = mapping.get("*").filter(|c| !c.is_empty()) {
        return codes.clone();
    }
    for (pattern, codes) in DEFAULT_SCOPE_RULES {
        if *pattern == scope || glob_match(pattern, scope) {
            return codes.iter().map(|c| c.to_string()).collect();
        }
    }
    Vec::new()
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(candidate))
        .unwrap_or(false)
}

fn split_tokens(raw: &Value) -> Vec<String> {
    let tokens: Vec<String> = match raw {
        Value::String(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => Vec::new(),
    };
    let mut out = Vec::new();
    for token in tokens {
        if !token.is_empty() && !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

fn normalize_scopes(raw: &Value) -> Vec<String> {
    split_tokens(raw)
}

fn normalize_channels(raw: &Value) -> Result<Vec<String>, String> {
    split_tokens(raw)
        .into_iter()
        .map(|code| validate_code(&code))
        .collect()
}

fn validate_code(code: &str) -> Result<String, String> {
    let code = code.trim();
    if code != code.to_uppercase() {
        return Err(format!(
            "channel code '{}' must be uppercase (e.g. CLI, SYS_HTTP)",
            code
        ));
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;
    use crate::params::MethodSpec;

    fn router(plugin: Arc<PublishPlugin>) -> Arc<Router> {
        Router::builder("shop")
            .plug(plugin)
            .method(
                MethodSpec::new("list").meta("scopes", "public"),
                |_: &(), _c: &mut Call| Ok::<_, anyhow::Error>(1),
            )
            .method(
                MethodSpec::new("purge").meta("scopes", "internal"),
                |_: &(), _c: &mut Call| Ok::<_, anyhow::Error>(2),
            )
            .method(
                MethodSpec::new("report")
                    .meta("scopes", "public_reports")
                    .meta("scope_channels", json!({"public_reports": ["HTTP", "MCP"]})),
                |_: &(), _c: &mut Call| Ok::<_, anyhow::Error>(3),
            )
            .method("ping", |_: &(), _c: &mut Call| Ok::<_, anyhow::Error>(4))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_rules() {
        let r = router(Arc::new(PublishPlugin::new()));
        let http = r.members(&EntryFilter::channel("HTTP")).methods;
        assert_eq!(http, vec!["list", "report", "ping"]);
        let cli = r.members(&EntryFilter::channel("CLI")).methods;
        assert_eq!(cli, vec!["purge", "ping"]);
    }

    #[test]
    fn test_strict_hides_untagged() {
        let plugin = Arc::new(PublishPlugin::new());
        plugin.core().configure("strict").unwrap();
        let r = router(plugin);
        let http = r.members(&EntryFilter::channel("HTTP")).methods;
        assert_eq!(http, vec!["list", "report"]);
    }

    #[test]
    fn test_scope_filter() {
        let r = router(Arc::new(PublishPlugin::new()));
        let internal = r.members(&EntryFilter::all().scope("internal")).methods;
        assert_eq!(internal, vec!["purge"]);
    }

    #[test]
    fn test_describe_contributes_scope() {
        let r = router(Arc::new(PublishPlugin::new()));
        let schema = r.schema();
        let scope = &schema.methods["report"].extra["scope"];
        assert_eq!(scope["tags"], json!(["public_reports"]));
        assert_eq!(scope["channels"]["public_reports"], json!(["HTTP", "MCP"]));
        assert!(schema.methods["ping"].extra.get("scope").is_none());
    }

    #[test]
    fn test_method_option_overrides_metadata() {
        let plugin = Arc::new(PublishPlugin::new());
        let r = router(plugin.clone());
        plugin.set_scopes(Some("list"), "internal").unwrap();
        let cli = r.members(&EntryFilter::channel("CLI")).methods;
        assert!(cli.contains(&"list".to_string()));
    }

    #[test]
    fn test_pattern_channels() {
        let plugin = Arc::new(PublishPlugin::new());
        plugin.set_scope_channels(None, "public_*", "WS").unwrap();
        let r = router(plugin);
        let ws = r.members(&EntryFilter::channel("WS")).methods;
        // report has an exact entry in its own metadata, so only untagged ping joins
        assert_eq!(ws, vec!["ping"]);
        let plugin = Arc::new(PublishPlugin::new());
        plugin.set_scope_channels(None, "pub*", "WS").unwrap();
        let r = router(plugin);
        assert_eq!(r.members(&EntryFilter::channel("WS")).methods, vec!["list", "ping"]);
    }

    #[test]
    fn test_lowercase_channel_rejected() {
        let plugin = PublishPlugin::new();
        let err = plugin.set_channels(None, "http").unwrap_err();
        assert!(err.to_string().contains("uppercase"));

        let err = Router::builder("r")
            .plug(Arc::new(PublishPlugin::new()))
            .method(
                MethodSpec::new("m").meta("scope_channels", json!({"public": "cli"})),
                |_: &(), _c: &mut Call| Ok::<_, anyhow::Error>(()),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidConfig { .. }));
    }

    #[test]
    fn test_channel_map() {
        let plugin = Arc::new(PublishPlugin::new());
        let r = router(plugin.clone());
        let map = plugin.channel_map(&r, "HTTP").unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["list", "report"]);
        assert_eq!(map["report"]["exposed_scopes"], json!(["public_reports"]));
        assert!(plugin.channel_map(&r, "").is_err());
    }
}
