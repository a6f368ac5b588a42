//! Publisher-level errors.

use switchyard_router::RouterError;
use thiserror::Error;

/// Errors raised while managing published applications.
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("unknown app spec '{spec}' (available: {})", list(.available))]
    UnknownSpec { spec: String, available: Vec<String> },

    #[error("app '{name}' is already published")]
    DuplicateApp { name: String },

    #[error("app '{name}' not found (available: {})", list(.available))]
    UnknownApp { name: String, available: Vec<String> },

    #[error("channel '{name}' not available (available: {})", list(.available))]
    UnknownChannel { name: String, available: Vec<String> },

    #[error("unsupported state version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("invalid state document: {0}")]
    InvalidState(#[from] serde_json::Error),

    #[error("app factory for '{spec}' failed: {source}")]
    Factory {
        spec: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("publisher root router has been dropped")]
    Detached,

    #[error("cannot route '{url}': {reason}")]
    InvalidRoute { url: String, reason: &'static str },

    #[error(transparent)]
    Router(#[from] RouterError),
}

impl PublisherError {
    /// Names a caller could have used instead, when the error has them.
    pub fn available(&self) -> &[String] {
        match self {
            PublisherError::UnknownSpec { available, .. }
            | PublisherError::UnknownApp { available, .. }
            | PublisherError::UnknownChannel { available, .. } => available,
            PublisherError::Router(err) => err.available(),
            _ => &[],
        }
    }
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_spec_lists_specs() {
        let err = PublisherError::UnknownSpec {
            spec: "crm".into(),
            available: vec!["shop".into(), "shop:Hierarchical".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown app spec 'crm' (available: shop, shop:Hierarchical)"
        );
        assert_eq!(err.available().len(), 2);
    }

    #[test]
    fn test_empty_available_reads_none() {
        let err = PublisherError::UnknownApp {
            name: "shop".into(),
            available: vec![],
        };
        assert_eq!(err.to_string(), "app 'shop' not found (available: none)");
    }

    #[test]
    fn test_version_message() {
        let err = PublisherError::UnsupportedVersion {
            found: 2,
            expected: 1,
        };
        assert_eq!(err.to_string(), "unsupported state version 2 (expected 1)");
    }
}
