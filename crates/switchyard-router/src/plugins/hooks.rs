//! Closure-built plugins.
//!
//! [`HookPlugin`] runs ad-hoc code around every call without writing a
//! plugin type:
//!
//! ```text
//! call
//!   → BEFORE hooks   (may inspect or inject into the call, or abort)
//!   → inner chain
//!   → AFTER hooks    (may replace the result value)
//!   → ON-ERROR hooks (observe the failure; the error is returned unchanged)
//! ```
//!
//! Before hooks run in registration order; after hooks chain their
//! transformations in registration order.

use futures::FutureExt;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::call::{Args, Call, InstanceKey, MethodFn};
use crate::entry::MethodEntry;
use crate::error::RouterError;
use crate::plugin::{Plugin, PluginContext, PluginCore};

/// The hook phase at which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Before,
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => write!(f, "before"),
            HookPhase::After => write!(f, "after"),
        }
    }
}

/// Error returned by a hook.
#[derive(Debug, Error)]
#[error("hook error ({phase}): {message}")]
pub struct HookError {
    pub message: String,
    pub phase: HookPhase,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HookError {
    pub fn before(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            phase: HookPhase::Before,
            source: None,
        }
    }

    pub fn after(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            phase: HookPhase::After,
            source: None,
        }
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        self.source = Some(source.into());
        self
    }
}

/// What after and on-error hooks see of a finished call.
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub method: String,
    pub path: String,
    pub instance: InstanceKey,
    pub args: Args,
}

pub type BeforeFn = Arc<dyn Fn(&mut Call) -> Result<(), HookError> + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&CallInfo, Value) -> Result<Value, HookError> + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&CallInfo, &anyhow::Error) + Send + Sync>;

/// A plugin assembled from closures.
pub struct HookPlugin {
    core: PluginCore,
    before: Vec<BeforeFn>,
    after: Vec<AfterFn>,
    on_error: Vec<ErrorFn>,
}

impl HookPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: PluginCore::new(name, Map::new()),
            before: Vec::new(),
            after: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.on_error.is_empty()
    }

    /// Adds a before hook. It may inject into `call.extensions` or rewrite
    /// `call.args`; returning an error aborts the call.
    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Call) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(f));
        self
    }

    /// Adds an after hook. Its return value replaces the result.
    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallInfo, Value) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.after.push(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallInfo, &anyhow::Error) + Send + Sync + 'static,
    {
        self.on_error.push(Arc::new(f));
        self
    }
}

impl fmt::Debug for HookPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPlugin")
            .field("name", &self.core.name())
            .field("before_count", &self.before.len())
            .field("after_count", &self.after.len())
            .field("on_error_count", &self.on_error.len())
            .finish()
    }
}

impl Plugin for HookPlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn wrap_handler(
        self: Arc<Self>,
        _ctx: &PluginContext<'_>,
        _entry: &MethodEntry,
        next: MethodFn,
    ) -> Result<MethodFn, RouterError> {
        Ok(Arc::new(move |mut call: Call| {
            for hook in &self.before {
                if let Err(err) = hook(&mut call) {
                    return futures::future::ready(Err(err.into())).boxed();
                }
            }
            let info = CallInfo {
                method: call.method.clone(),
                path: call.path.clone(),
                instance: call.instance,
                args: call.args.clone(),
            };
            let this = self.clone();
            let fut = next(call);
            async move {
                match fut.await {
                    Ok(value) => this
                        .after
                        .iter()
                        .try_fold(value, |value, hook| hook(&info, value))
                        .map_err(anyhow::Error::from),
                    Err(err) => {
                        for hook in &this.on_error {
                            hook(&info, &err);
                        }
                        Err(err)
                    }
                }
            }
            .boxed()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Tenant(&'static str);

    fn trace_plugin(name: &str, trace: Arc<Mutex<Vec<String>>>) -> HookPlugin {
        let before = trace.clone();
        let after = trace;
        let (b, a) = (name.to_string(), name.to_string());
        HookPlugin::new(name)
            .before(move |_| {
                before.lock().push(format!("before:{}", b));
                Ok(())
            })
            .after(move |_, v| {
                after.lock().push(format!("after:{}", a));
                Ok(v)
            })
    }

    #[test]
    fn test_hook_error_display() {
        let err = HookError::before("denied");
        assert_eq!(err.phase, HookPhase::Before);
        assert_eq!(err.to_string(), "hook error (before): denied");
    }

    #[test]
    fn test_ordering_across_plugins() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let body_trace = trace.clone();
        let router = Router::builder("r")
            .plug(Arc::new(trace_plugin("A", trace.clone())))
            .plug(Arc::new(trace_plugin("B", trace.clone())))
            .method("m", move |_: &(), _c: &mut Call| {
                body_trace.lock().push("body".into());
                Ok::<_, anyhow::Error>(())
            })
            .build()
            .unwrap();
        router.call("m", Args::new()).wait().unwrap();
        assert_eq!(
            *trace.lock(),
            vec!["before:A", "before:B", "body", "after:B", "after:A"]
        );
    }

    #[test]
    fn test_before_injects_extension() {
        let router = Router::builder("r")
            .plug(Arc::new(HookPlugin::new("tenant").before(|call| {
                call.extensions.insert(Tenant("acme"));
                Ok(())
            })))
            .method("whoami", |_: &(), call: &mut Call| {
                Ok::<_, anyhow::Error>(call.extensions.get_required::<Tenant>()?.0)
            })
            .build()
            .unwrap();
        assert_eq!(router.call("whoami", Args::new()).wait().unwrap(), json!("acme"));
    }

    #[test]
    fn test_before_abort_skips_body() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let router = Router::builder("r")
            .plug(Arc::new(
                HookPlugin::new("auth").before(|_| Err(HookError::before("denied"))),
            ))
            .method("m", move |_: &(), _c: &mut Call| {
                *flag.lock() = true;
                Ok::<_, anyhow::Error>(())
            })
            .build()
            .unwrap();
        let err = router.call("m", Args::new()).wait().unwrap_err();
        assert!(err.downcast_ref::<HookError>().is_some());
        assert!(!*ran.lock());
    }

    #[test]
    fn test_after_transforms_and_on_error_observes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let router = Router::builder("r")
            .plug(Arc::new(
                HookPlugin::new("wrap")
                    .after(|_, v| Ok(json!({ "data": v })))
                    .on_error(move |info, err| sink.lock().push(format!("{}: {}", info.method, err))),
            ))
            .method("ok", |_: &(), _c: &mut Call| Ok::<_, anyhow::Error>(7))
            .method("bad", |_: &(), _c: &mut Call| Err::<(), _>(anyhow::anyhow!("nope")))
            .build()
            .unwrap();
        assert_eq!(router.call("ok", Args::new()).wait().unwrap(), json!({"data": 7}));
        assert!(router.call("bad", Args::new()).wait().is_err());
        assert_eq!(*seen.lock(), vec!["bad: nope"]);
    }
}
