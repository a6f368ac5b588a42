//! The call model.
//!
//! Every invocation travels through a plugin chain as a single [`Call`]
//! value: the target method, the handler instance, the arguments, and a
//! typed [`Extensions`] map plugins use to inject per-call state.
//!
//! # Core Types
//!
//! - [`Handler`]: implemented by the object bound to a router
//! - [`Args`]: positional and keyword arguments as JSON values
//! - [`Call`]: one in-flight invocation
//! - [`MethodFn`]: a composed, callable layer of the chain
//! - [`IntoMethodResult`]: lets method bodies return any serializable value

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::extensions::Extensions;
use crate::resource::{Cursor, TransactionalResource};

/// Implemented by the object a router is bound to.
///
/// Handlers with a database override [`resource`](Handler::resource) so the
/// transaction plugin can open cursors and commit.
pub trait Handler: Any + Send + Sync {
    fn resource(&self) -> Option<&dyn TransactionalResource> {
        None
    }
}

impl Handler for () {}

/// Identity of a handler instance: the address of its `Arc`.
///
/// Runtime plugin toggles are keyed by this value, so two handlers of the
/// same type never share toggle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(usize);

impl InstanceKey {
    /// Key for the allocation behind `handler`.
    pub fn of<T: ?Sized>(handler: &Arc<T>) -> Self {
        InstanceKey(Arc::as_ptr(handler) as *const () as usize)
    }
}

/// Call arguments as they arrive from a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
}

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds keyword arguments from a JSON object.
    ///
    /// Anything that is not an object becomes a single positional argument,
    /// except arrays, which are spread as positionals.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(keyword) => Args {
                positional: Vec::new(),
                keyword,
            },
            Value::Array(positional) => Args {
                positional,
                keyword: Map::new(),
            },
            Value::Null => Args::default(),
            other => Args {
                positional: vec![other],
                keyword: Map::new(),
            },
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing any earlier value.
    pub fn kw(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Keyword argument by name. Positionals are not consulted.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    /// Truthiness of a keyword argument, with string forms from transports.
    pub fn is_truthy(&self, name: &str) -> bool {
        match self.keyword.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => {
                matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
            }
            _ => false,
        }
    }
}

/// Call-site plugin overrides, keyed by plugin name.
pub type Overrides = HashMap<String, Map<String, Value>>;

/// One in-flight invocation.
pub struct Call {
    /// Display name of the method.
    pub method: String,
    /// Dotted path the call was resolved through.
    pub path: String,
    pub instance: InstanceKey,
    pub handler: Arc<dyn Handler>,
    pub args: Args,
    /// Per-call values plugins hand to each other, such as the open cursor.
    pub extensions: Extensions,
    /// Call-site flag overrides, keyed by plugin name.
    pub overrides: Arc<Overrides>,
}

impl Call {
    /// A call whose path is just the method name.
    pub fn new(method: impl Into<String>, handler: Arc<dyn Handler>, args: Args) -> Self {
        let method = method.into();
        Self {
            path: method.clone(),
            method,
            instance: InstanceKey::of(&handler),
            handler,
            args,
            extensions: Extensions::new(),
            overrides: Arc::new(Overrides::new()),
        }
    }

    /// Deserializes a keyword argument. Missing arguments read as null, so
    /// `Option<T>` targets accept absence.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self.args.keyword.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("argument '{}' of '{}': {}", name, self.method, e))
    }

    /// Reads an optional argument; null and absence both give `None`.
    pub fn opt_arg<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.args.keyword.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.arg(name).map(Some),
        }
    }

    /// The injected cursor, downcast to the resource's concrete cursor type.
    pub fn cursor<C: 'static>(&self) -> anyhow::Result<&C> {
        let cursor = self.extensions.get_required::<Cursor>()?;
        cursor.downcast_ref::<C>().ok_or_else(|| {
            anyhow::anyhow!(
                "cursor for '{}' is not a {}",
                self.method,
                std::any::type_name::<C>()
            )
        })
    }

    /// Resolved call-site override for one plugin, if any.
    pub fn override_for(&self, plugin: &str) -> Option<&Map<String, Value>> {
        self.overrides.get(plugin)
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("instance", &self.instance)
            .field("args", &self.args)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// A callable layer of a method's chain.
pub type MethodFn = Arc<dyn Fn(Call) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Conversion of method-body return values into the chain's result type.
///
/// Implemented for `anyhow::Result<T>` and `Result<T, E>` with any error
/// convertible into `anyhow::Error`, where `T: Serialize`.
pub trait IntoMethodResult {
    fn into_method_result(self) -> anyhow::Result<Value>;
}

impl<T, E> IntoMethodResult for Result<T, E>
where
    T: Serialize,
    E: Into<anyhow::Error>,
{
    fn into_method_result(self) -> anyhow::Result<Value> {
        let data = self.map_err(Into::into)?;
        Ok(serde_json::to_value(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_with(args: Args) -> Call {
        Call::new("add", Arc::new(()), args)
    }

    #[test]
    fn test_args_from_value() {
        let args = Args::from_value(json!({"name": "books"}));
        assert_eq!(args.get("name"), Some(&json!("books")));
        assert!(args.positional.is_empty());

        let args = Args::from_value(json!([1, 2]));
        assert_eq!(args.positional, vec![json!(1), json!(2)]);

        assert_eq!(Args::from_value(Value::Null), Args::default());
    }

    #[test]
    fn test_is_truthy() {
        let args = Args::new()
            .kw("a", true)
            .kw("b", "yes")
            .kw("c", 0)
            .kw("d", "false");
        assert!(args.is_truthy("a"));
        assert!(args.is_truthy("b"));
        assert!(!args.is_truthy("c"));
        assert!(!args.is_truthy("d"));
        assert!(!args.is_truthy("missing"));
    }

    #[test]
    fn test_arg_deserializes() {
        let call = call_with(Args::new().kw("price", 9.5).kw("name", "pen"));
        let price: f64 = call.arg("price").unwrap();
        let name: String = call.arg("name").unwrap();
        assert_eq!(price, 9.5);
        assert_eq!(name, "pen");
    }

    #[test]
    fn test_arg_missing_errors_but_opt_arg_is_none() {
        let call = call_with(Args::new());
        assert!(call.arg::<String>("name").is_err());
        assert_eq!(call.opt_arg::<String>("name").unwrap(), None);
        assert_eq!(call.arg::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn test_cursor_downcast() {
        let mut call = call_with(Args::new());
        assert!(call.cursor::<u32>().is_err());
        call.extensions.insert(Cursor::new(7u32));
        assert_eq!(*call.cursor::<u32>().unwrap(), 7);
        assert!(call.cursor::<String>().is_err());
    }

    #[test]
    fn test_instance_key_distinguishes_handlers() {
        let a: Arc<()> = Arc::new(());
        let b: Arc<u8> = Arc::new(1);
        let c = a.clone();
        assert_eq!(InstanceKey::of(&a), InstanceKey::of(&c));
        assert_ne!(InstanceKey::of(&a), InstanceKey::of(&b));
    }

    #[test]
    fn test_into_method_result() {
        let ok: Result<Vec<u32>, std::io::Error> = Ok(vec![1, 2]);
        assert_eq!(ok.into_method_result().unwrap(), json!([1, 2]));

        let err: anyhow::Result<u32> = Err(anyhow::anyhow!("boom"));
        assert_eq!(err.into_method_result().unwrap_err().to_string(), "boom");
    }
}
