//! Error types for routing.
//!
//! Two families of failure exist:
//!
//! - [`RouterError`]: raised while building routers (registration, plugging,
//!   attaching children) or while resolving a name. Registration errors are
//!   raised eagerly, never at call time.
//! - [`ValidationError`]: raised by the validation plugin before a method body
//!   runs. It carries one [`FieldError`] per failing argument.
//!
//! Business errors are not wrapped: they travel as `anyhow::Error` and can be
//! recovered with `downcast_ref`.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// What kind of name a resolution failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Method,
    Child,
    Plugin,
    Router,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Method => write!(f, "method"),
            NameKind::Child => write!(f, "child router"),
            NameKind::Plugin => write!(f, "plugin"),
            NameKind::Router => write!(f, "router"),
        }
    }
}

/// Error type for router construction and name resolution.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A method was registered without a name (or the prefix consumed it).
    #[error("cannot register a method with an empty name on router '{router}'")]
    EmptyName { router: String },

    /// A method, child or router name cannot be addressed by a dotted path.
    #[error("invalid {kind} name '{name}' on router '{router}': {reason}")]
    InvalidName {
        kind: NameKind,
        name: String,
        router: String,
        reason: &'static str,
    },

    /// Two methods on one router share a display name.
    #[error("duplicate method '{name}' on router '{router}'")]
    DuplicateName { router: String, name: String },

    /// Two children on one router share a name.
    #[error("duplicate child '{name}' on router '{router}'")]
    DuplicateChild { router: String, name: String },

    /// The child already has a parent.
    #[error("router '{child}' is already attached to '{parent}'")]
    AlreadyAttached { child: String, parent: String },

    /// Attaching would create a cycle.
    #[error("attaching '{child}' under '{parent}' would create a cycle")]
    CyclicAttach { child: String, parent: String },

    /// The same plugin name is plugged twice.
    #[error("plugin '{plugin}' is already plugged into router '{router}'")]
    DuplicatePlugin { router: String, plugin: String },

    /// A plugin needs a transactional resource the handler does not expose.
    #[error("plugin '{plugin}' requires a transactional resource on router '{router}'")]
    MissingResource { router: String, plugin: String },

    /// The flags mini-language could not be parsed.
    #[error("invalid flags '{flags}': {reason}")]
    InvalidFlags { flags: String, reason: String },

    /// A plugin configuration value was rejected.
    #[error("invalid configuration for plugin '{plugin}': {reason}")]
    InvalidConfig { plugin: String, reason: String },

    /// A name could not be resolved.
    #[error("{kind} '{name}' not found in '{router}' (available: {})", .available.join(", "))]
    NotFound {
        kind: NameKind,
        name: String,
        router: String,
        available: Vec<String>,
    },

    /// No plugin factory is registered under this name.
    #[error("unknown plugin '{name}' (available: {})", .available.join(", "))]
    UnknownPlugin {
        name: String,
        available: Vec<String>,
    },
}

impl RouterError {
    /// Returns true for name-resolution failures.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            RouterError::NotFound { .. } | RouterError::UnknownPlugin { .. }
        )
    }

    /// The names that would have resolved, if this is a resolution failure.
    pub fn available(&self) -> &[String] {
        match self {
            RouterError::NotFound { available, .. } | RouterError::UnknownPlugin { available, .. } => {
                available
            }
            _ => &[],
        }
    }

    /// Rejects names that are empty or contain the path separator.
    pub(crate) fn check_name(kind: NameKind, name: &str, router: &str) -> Result<(), Self> {
        let reason = if name.is_empty() {
            "name is empty"
        } else if name.contains('.') {
            "'.' separates path segments"
        } else {
            return Ok(());
        };
        Err(RouterError::InvalidName {
            kind,
            name: name.to_string(),
            router: router.to_string(),
            reason,
        })
    }

    pub(crate) fn not_found(
        kind: NameKind,
        name: impl Into<String>,
        router: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        RouterError::NotFound {
            kind,
            name: name.into(),
            router: router.into(),
            available,
        }
    }
}

/// A single failing argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Arguments failed validation. Every failing field is listed.
#[derive(Debug, Clone, Error, Serialize)]
#[error("validation failed for '{method}': {}", display_fields(.errors))]
pub struct ValidationError {
    pub method: String,
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Names of the failing fields, in report order.
    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }
}

fn display_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
