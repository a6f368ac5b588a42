//! The publisher state document.
//!
//! ```json
//! {
//!   "version": 1,
//!   "autosave": false,
//!   "apps": [
//!     {"name": "shop", "spec": "shop", "args": [], "kwargs": {}}
//!   ]
//! }
//! ```
//!
//! Snapshots are produced and consumed as values; writing them anywhere is
//! the caller's business.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchyard_router::Args;

use crate::error::PublisherError;

pub const STATE_VERSION: u32 = 1;

/// How one application was added, enough to add it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    pub name: String,
    pub spec: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl AppRecord {
    pub fn new(name: impl Into<String>, spec: impl Into<String>, args: &Args) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
            args: args.positional.clone(),
            kwargs: args.keyword.clone(),
        }
    }

    /// The factory arguments this record was created with.
    pub fn factory_args(&self) -> Args {
        Args {
            positional: self.args.clone(),
            keyword: self.kwargs.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    #[serde(default)]
    pub autosave: bool,
    #[serde(default)]
    pub apps: Vec<AppRecord>,
}

impl StateSnapshot {
    pub fn new(autosave: bool, apps: Vec<AppRecord>) -> Self {
        Self {
            version: STATE_VERSION,
            autosave,
            apps,
        }
    }

    /// Parses and version-checks a state document.
    pub fn from_value(value: Value) -> Result<Self, PublisherError> {
        let snapshot: StateSnapshot = serde_json::from_value(value)?;
        if snapshot.version != STATE_VERSION {
            return Err(PublisherError::UnsupportedVersion {
                found: snapshot.version,
                expected: STATE_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_defaults() {
        let snapshot = StateSnapshot::from_value(json!({
            "version": 1,
            "apps": [{"name": "shop", "spec": "shop"}]
        }))
        .unwrap();
        assert!(!snapshot.autosave);
        assert_eq!(snapshot.apps[0].factory_args(), Args::new());
    }

    #[test]
    fn test_rejects_other_versions() {
        let err = StateSnapshot::from_value(json!({"version": 2, "apps": []})).unwrap_err();
        assert!(matches!(
            err,
            PublisherError::UnsupportedVersion { found: 2, .. }
        ));
    }

    #[test]
    fn test_rejects_malformed_document() {
        let err = StateSnapshot::from_value(json!({"apps": "shop"})).unwrap_err();
        assert!(matches!(err, PublisherError::InvalidState(_)));
    }

    #[test]
    fn test_document_shape() {
        let args = Args::new().arg("demo").kw("seed", true);
        let snapshot = StateSnapshot::new(true, vec![AppRecord::new("shop", "shop:Hierarchical", &args)]);
        assert_eq!(
            snapshot.to_value(),
            json!({
                "version": 1,
                "autosave": true,
                "apps": [{
                    "name": "shop",
                    "spec": "shop:Hierarchical",
                    "args": ["demo"],
                    "kwargs": {"seed": true}
                }]
            })
        );
    }
}
