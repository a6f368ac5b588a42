//! Transport channels.
//!
//! A channel translates one transport (argv, HTTP) into router calls. Each
//! has a lowercase name and an uppercase channel code; the code is what the
//! `publish` plugin's scope rules refer to.

pub mod cli;
pub mod http;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use switchyard_router::plugins::STANDARD_CHANNELS;

use crate::error::PublisherError;

pub use cli::{split_cli_args, CliChannel, CliOutcome};
pub use http::{HttpChannel, RequestMetrics};

pub trait Channel {
    /// Registry key, e.g. `cli`.
    const NAME: &'static str;
    /// Channel code used by scope rules, e.g. `CLI`.
    const CODE: &'static str;
    const DESCRIPTION: &'static str;

    fn info() -> ChannelInfo {
        ChannelInfo::new(Self::NAME, Self::CODE, Self::DESCRIPTION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub code: String,
    pub description: String,
}

impl ChannelInfo {
    pub fn new(name: impl Into<String>, code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            description: description.into(),
        }
    }
}

/// Channels known to a publisher.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: IndexMap<String, ChannelInfo>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in CLI and HTTP channels.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CliChannel::info());
        registry.register(HttpChannel::info());
        registry
    }

    pub fn register(&mut self, info: ChannelInfo) {
        self.channels.insert(info.name.clone(), info);
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Looks a channel up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Result<&ChannelInfo, PublisherError> {
        self.channels
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| PublisherError::UnknownChannel {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Listing returned by the `/channels` command.
    pub fn listing(&self) -> Value {
        let codes: IndexMap<&str, &str> = STANDARD_CHANNELS.iter().copied().collect();
        json!({
            "total": self.channels.len(),
            "channels": self.channels.values().collect::<Vec<_>>(),
            "codes": codes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry() {
        let registry = ChannelRegistry::standard();
        assert_eq!(registry.names(), vec!["cli", "http"]);
        assert_eq!(registry.get("HTTP").unwrap().code, "HTTP");
    }

    #[test]
    fn test_unknown_channel() {
        let err = ChannelRegistry::standard().get("ws").unwrap_err();
        assert_eq!(err.available(), ["cli", "http"]);
    }

    #[test]
    fn test_listing_includes_codes() {
        let listing = ChannelRegistry::standard().listing();
        assert_eq!(listing["total"], 2);
        assert_eq!(listing["channels"][0]["code"], "CLI");
        assert_eq!(listing["codes"]["SYS_HTTP"], "Shared publisher HTTP API");
    }
}
