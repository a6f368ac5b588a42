//! Builder for routers bound to a handler.
//!
//! ```rust
//! use std::sync::Arc;
//! use switchyard_router::{Args, Handler, MethodSpec, Param, Router};
//!
//! struct Calculator;
//! impl Handler for Calculator {}
//!
//! let router = Router::bind("calc", Arc::new(Calculator))
//!     .doc("Arithmetic.")
//!     .method(
//!         MethodSpec::new("add").param(Param::integer("a")).param(Param::integer("b")),
//!         |_calc: &Calculator, call| Ok::<_, anyhow::Error>(call.arg::<i64>("a")? + call.arg::<i64>("b")?),
//!     )
//!     .build()?;
//!
//! let sum = router.get("add")?.call(Args::new().arg(2).arg(3)).wait()?;
//! assert_eq!(sum, 5);
//! # Ok::<(), anyhow::Error>(())
//! ```

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

use crate::call::{Call, Handler, IntoMethodResult, MethodFn};
use crate::error::{NameKind, RouterError};
use crate::params::MethodSpec;
use crate::plugin::Plugin;
use crate::router::Router;

enum PlugSpec {
    Instance(Arc<dyn Plugin>),
    Named(String, String),
}

/// Collects plugins, methods and children, then builds an `Arc<Router>`.
///
/// Plugins are plugged before methods are registered, in the order given.
/// Errors are reported by [`build`](Self::build).
pub struct RouterBuilder<H> {
    name: String,
    doc: String,
    prefix: Option<String>,
    handler: Arc<H>,
    plugs: Vec<PlugSpec>,
    methods: Vec<(MethodSpec, MethodFn)>,
    children: Vec<(String, Arc<Router>)>,
}

impl Router {
    /// Starts a builder with no bound handler.
    pub fn builder(name: impl Into<String>) -> RouterBuilder<()> {
        RouterBuilder::new(name, Arc::new(()))
    }

    /// Starts a builder whose methods receive `handler`.
    pub fn bind<H: Handler>(name: impl Into<String>, handler: Arc<H>) -> RouterBuilder<H> {
        RouterBuilder::new(name, handler)
    }
}

impl<H: Handler> RouterBuilder<H> {
    pub fn new(name: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            prefix: None,
            handler,
            plugs: Vec::new(),
            methods: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Stripped from registered names: `handle_list` becomes `list`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn plug(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugs.push(PlugSpec::Instance(plugin));
        self
    }

    /// Plugs a registry plugin by name, configured with `flags`.
    pub fn plug_named(mut self, name: impl Into<String>, flags: impl Into<String>) -> Self {
        self.plugs.push(PlugSpec::Named(name.into(), flags.into()));
        self
    }

    /// Registers a synchronous method body.
    pub fn method<F, R>(mut self, spec: impl Into<MethodSpec>, body: F) -> Self
    where
        F: Fn(&H, &mut Call) -> R + Send + Sync + 'static,
        R: IntoMethodResult,
    {
        let handler = self.handler.clone();
        let func: MethodFn = Arc::new(move |mut call: Call| {
            let result = body(&handler, &mut call).into_method_result();
            futures::future::ready(result).boxed()
        });
        self.methods.push((spec.into(), func));
        self
    }

    /// Registers an async method body.
    pub fn async_method<F, Fut, R>(mut self, spec: impl Into<MethodSpec>, body: F) -> Self
    where
        F: Fn(Arc<H>, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoMethodResult,
    {
        let handler = self.handler.clone();
        let func: MethodFn = Arc::new(move |call: Call| {
            let fut = body(handler.clone(), call);
            async move { fut.await.into_method_result() }.boxed()
        });
        self.methods.push((spec.into(), func));
        self
    }

    pub fn child(mut self, child: Arc<Router>) -> Self {
        let name = child.name().to_string();
        self.children.push((name, child));
        self
    }

    pub fn child_as(mut self, name: impl Into<String>, child: Arc<Router>) -> Self {
        self.children.push((name.into(), child));
        self
    }

    pub fn build(self) -> Result<Arc<Router>, RouterError> {
        RouterError::check_name(NameKind::Router, &self.name, &self.name)?;
        let handler: Arc<dyn Handler> = self.handler;
        let router = Router::create(self.name, self.doc, self.prefix, handler);
        for plug in self.plugs {
            match plug {
                PlugSpec::Instance(plugin) => router.plug(plugin)?,
                PlugSpec::Named(name, flags) => {
                    router.plug_named(&name, &flags)?;
                }
            }
        }
        for (spec, func) in self.methods {
            router.register(spec, func)?;
        }
        for (name, child) in self.children {
            router.add_child_as(name, child)?;
        }
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Args;
    use crate::params::Param;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl Handler for Counter {}

    fn counter_router(counter: Arc<Counter>) -> Arc<Router> {
        Router::bind("counter", counter)
            .method("hit", |c: &Counter, _call: &mut Call| {
                Ok::<_, anyhow::Error>(c.hits.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .async_method(
                MethodSpec::new("double").param(Param::integer("n")),
                |_c: Arc<Counter>, call: Call| async move {
                    let n: i64 = call.arg("n")?;
                    Ok::<_, anyhow::Error>(n * 2)
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_sync_method_sees_handler() {
        let counter = Arc::new(Counter::default());
        let router = counter_router(counter.clone());
        router.call("hit", Args::new()).wait().unwrap();
        let out = router.call("hit", Args::new()).wait().unwrap();
        assert_eq!(out, json!(2));
        assert_eq!(counter.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_async_method_from_sync_context() {
        let router = counter_router(Arc::new(Counter::default()));
        let out = router.call("double", Args::new().arg(21)).wait().unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn test_async_method_awaited() {
        let router = counter_router(Arc::new(Counter::default()));
        let out = router.call("double", Args::new().kw("n", 4)).await.unwrap();
        assert_eq!(out, json!(8));
    }

    #[test]
    fn test_build_reports_unknown_plugin() {
        let err = Router::builder("r")
            .plug_named("nonexistent", "")
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::UnknownPlugin { .. }));
    }

    #[test]
    fn test_build_rejects_unaddressable_names() {
        let err = Router::builder("a.b").build().unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidName { kind: NameKind::Router, .. }
        ));
        assert!(matches!(
            Router::builder("").build(),
            Err(RouterError::InvalidName { .. })
        ));

        let err = Router::builder("outer")
            .child_as("x.y", Router::new("inner"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidName { kind: NameKind::Child, .. }
        ));
    }

    #[test]
    fn test_instance_key_matches_bound_handler() {
        let counter = Arc::new(Counter::default());
        let router = counter_router(counter.clone());
        assert_eq!(router.instance(), crate::InstanceKey::of(&counter));
    }
}
