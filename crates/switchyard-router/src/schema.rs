//! Introspection schema produced by [`Router::describe`](crate::Router::describe).
//!
//! CLI help, completion and OpenAPI generation read nothing but this
//! structure.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dispatch::join_path;
use crate::params::Param;

/// Schema of one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSchema {
    pub name: String,
    pub description: String,
    pub doc: String,
    pub params: Vec<Param>,
    /// Plugin contributions, one key per contributing plugin.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MethodSchema {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Schema of a router and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSchema {
    pub name: String,
    pub description: String,
    pub methods: IndexMap<String, MethodSchema>,
    pub children: IndexMap<String, RouterSchema>,
}

impl RouterSchema {
    pub fn method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.get(name)
    }

    /// Walks child names from this node.
    pub fn node(&self, path: &[String]) -> Option<&RouterSchema> {
        let mut current = self;
        for segment in path {
            current = current.children.get(segment)?;
        }
        Some(current)
    }

    /// True when no method is visible anywhere in the subtree.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.children.values().all(RouterSchema::is_empty)
    }

    /// Every method in the subtree with its dotted path, depth first,
    /// own methods before children.
    pub fn flatten(&self) -> Vec<(String, &MethodSchema)> {
        let mut out = Vec::new();
        self.collect("", &mut out);
        out
    }

    fn collect<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a MethodSchema)>) {
        for (name, method) in &self.methods {
            out.push((join_path(prefix, name), method));
        }
        for (name, child) in &self.children {
            child.collect(&join_path(prefix, name), out);
        }
    }
}
