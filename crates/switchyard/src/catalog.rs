//! Application factories addressable by spec string.
//!
//! A spec is `path` or `path:Name`. Each catalog path holds one or more
//! named factories; a bare `path` selects the factory named `App`, or the
//! only factory when there is just one.
//!
//! ```rust
//! use switchyard::AppCatalog;
//! use switchyard_router::Router;
//!
//! let catalog = AppCatalog::new()
//!     .register("shop", |_args| Ok(Router::new("shop")))
//!     .register_named("shop", "Hierarchical", |_args| Ok(Router::new("shop")));
//!
//! assert_eq!(catalog.specs(), vec!["shop", "shop:Hierarchical"]);
//! assert!(catalog.resolve("shop:Hierarchical").is_ok());
//! ```

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use switchyard_router::{Args, Router};

use crate::error::PublisherError;

/// Builds a fresh application router from `/add` arguments.
pub type AppFactory = Arc<dyn Fn(&Args) -> anyhow::Result<Arc<Router>> + Send + Sync>;

/// Factory name selected by a bare path.
pub const DEFAULT_APP: &str = "App";

#[derive(Default, Clone)]
pub struct AppCatalog {
    entries: IndexMap<String, IndexMap<String, AppFactory>>,
}

impl AppCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the default factory for `path`.
    pub fn register<F>(self, path: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Arc<Router>> + Send + Sync + 'static,
    {
        self.register_named(path, DEFAULT_APP, factory)
    }

    /// Registers a named factory, selected with `path:name`.
    pub fn register_named<F>(mut self, path: impl Into<String>, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Arc<Router>> + Send + Sync + 'static,
    {
        self.entries
            .entry(path.into())
            .or_default()
            .insert(name.into(), Arc::new(factory));
        self
    }

    /// Every accepted spec, in registration order.
    pub fn specs(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(path, named)| {
                named.keys().map(move |name| {
                    if name == DEFAULT_APP {
                        path.clone()
                    } else {
                        format!("{}:{}", path, name)
                    }
                })
            })
            .collect()
    }

    pub fn resolve(&self, spec: &str) -> Result<AppFactory, PublisherError> {
        let (path, name) = match spec.split_once(':') {
            Some((path, name)) => (path, Some(name)),
            None => (spec, None),
        };
        let factory = self.entries.get(path).and_then(|named| match name {
            Some(name) => named.get(name),
            None => named
                .get(DEFAULT_APP)
                .or_else(|| (named.len() == 1).then(|| named.values().next()).flatten()),
        });
        factory.cloned().ok_or_else(|| PublisherError::UnknownSpec {
            spec: spec.to_string(),
            available: self.specs(),
        })
    }

    /// Resolves `spec` and runs the factory.
    pub fn build(&self, spec: &str, args: &Args) -> Result<Arc<Router>, PublisherError> {
        let factory = self.resolve(spec)?;
        factory(args).map_err(|source| PublisherError::Factory {
            spec: spec.to_string(),
            source,
        })
    }
}

impl fmt::Debug for AppCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCatalog")
            .field("specs", &self.specs())
            .finish()
    }
}
