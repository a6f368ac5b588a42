//! Method descriptors.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::call::MethodFn;
use crate::params::Param;

/// Descriptor for one registered method.
///
/// The display `name` never changes after registration. `metadata` is owned
/// by plugins, one top-level key per plugin, and is mutated only from
/// [`Plugin::on_decore`](crate::Plugin::on_decore).
#[derive(Clone)]
pub struct MethodEntry {
    /// Display name, unique within its router.
    pub name: String,
    /// Name the method was registered under, before prefix stripping.
    pub func_name: String,
    pub doc: String,
    pub params: Arc<Vec<Param>>,
    /// The raw method body.
    pub func: MethodFn,
    pub metadata: Map<String, Value>,
}

impl MethodEntry {
    /// First non-empty line of the doc text.
    pub fn description(&self) -> &str {
        self.doc
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("func_name", &self.func_name)
            .field("params", &self.params)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn entry(doc: &str) -> MethodEntry {
        MethodEntry {
            name: "list".into(),
            func_name: "list".into(),
            doc: doc.into(),
            params: Arc::new(vec![Param::integer("limit").default(10)]),
            func: Arc::new(|_| async { Ok(Value::Null) }.boxed()),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_description_is_first_line() {
        assert_eq!(entry("\n  List rows.\n\nLonger text.").description(), "List rows.");
        assert_eq!(entry("").description(), "");
    }

    #[test]
    fn test_param_lookup() {
        let e = entry("");
        assert!(e.param("limit").is_some());
        assert!(e.param("offset").is_none());
    }
}
