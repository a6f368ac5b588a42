//! The method router.
//!
//! A [`Router`] binds method names to bodies, owns an ordered plugin list,
//! and may hold child routers, forming a tree addressed by dotted paths
//! (`"db.tables.product.list"`).
//!
//! # Composition
//!
//! Each entry's chain is composed eagerly whenever the entry is registered
//! or a plugin is plugged, so the hot path is a lookup plus an `Arc` clone:
//!
//! ```text
//! register("add") ─┬─ on_decore(validate) → on_decore(dbop) → ...
//!                  └─ compose: gate(validate, gate(dbop, ... base(add)))
//! ```
//!
//! # Ownership
//!
//! Routers are always shared as `Arc<Router>`. A child keeps a weak link to
//! its parent; the parent keeps the child alive. A router has at most one
//! parent and may never be attached beneath itself.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::call::{Args, Call, Handler, InstanceKey, MethodFn, Overrides};
use crate::config::{self, merge_into};
use crate::dispatch::{join_path, string_to_path};
use crate::entry::MethodEntry;
use crate::error::{NameKind, RouterError};
use crate::extensions::Extensions;
use crate::params::{MethodSpec, Param};
use crate::plugin::{EntryFilter, Plugin, PluginContext};
use crate::registry;
use crate::schema::{MethodSchema, RouterSchema};

struct Slot {
    entry: MethodEntry,
    chain: MethodFn,
}

#[derive(Default)]
struct State {
    entries: IndexMap<String, Slot>,
    plugins: Vec<Arc<dyn Plugin>>,
    children: IndexMap<String, Arc<Router>>,
}

/// Registry of methods, plugins and child routers.
pub struct Router {
    name: String,
    doc: String,
    prefix: Option<String>,
    handler: Arc<dyn Handler>,
    state: RwLock<State>,
    parent: Mutex<Option<Weak<Router>>>,
}

impl Router {
    /// A router with no bound handler.
    pub fn new(name: impl Into<String>) -> Arc<Router> {
        Self::create(name.into(), String::new(), None, Arc::new(()))
    }

    /// A router bound to `handler`.
    pub fn with_handler(name: impl Into<String>, handler: Arc<dyn Handler>) -> Arc<Router> {
        Self::create(name.into(), String::new(), None, handler)
    }

    pub(crate) fn create(
        name: String,
        doc: String,
        prefix: Option<String>,
        handler: Arc<dyn Handler>,
    ) -> Arc<Router> {
        Arc::new(Router {
            name,
            doc,
            prefix,
            handler,
            state: RwLock::new(State::default()),
            parent: Mutex::new(None),
        })
    }

    /// Name this router was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full doc text.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// First non-empty line of the doc text.
    pub fn description(&self) -> &str {
        self.doc
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }

    /// The handler every method body receives.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Key that runtime plugin toggles are stored under.
    pub fn instance(&self) -> InstanceKey {
        InstanceKey::of(&self.handler)
    }

    fn ctx(&self) -> PluginContext<'_> {
        PluginContext {
            router: &self.name,
            handler: &self.handler,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers a method body under `spec.name` (minus the router prefix).
    pub fn register(&self, spec: impl Into<MethodSpec>, func: MethodFn) -> Result<(), RouterError> {
        let spec = spec.into();
        let name = match &self.prefix {
            Some(prefix) => spec
                .name
                .strip_prefix(prefix.as_str())
                .unwrap_or(&spec.name)
                .to_string(),
            None => spec.name.clone(),
        };
        if name.is_empty() {
            return Err(RouterError::EmptyName {
                router: self.name.clone(),
            });
        }
        RouterError::check_name(NameKind::Method, &name, &self.name)?;

        let mut state = self.state.write();
        if state.entries.contains_key(&name) {
            return Err(RouterError::DuplicateName {
                router: self.name.clone(),
                name,
            });
        }

        let mut entry = MethodEntry {
            name: name.clone(),
            func_name: spec.name,
            doc: spec.doc,
            params: Arc::new(spec.params),
            func,
            metadata: spec.metadata,
        };
        let ctx = self.ctx();
        for plugin in &state.plugins {
            plugin.on_decore(&ctx, &mut entry)?;
        }
        let chain = compose(&ctx, &state.plugins, &entry)?;
        state.entries.insert(name.clone(), Slot { entry, chain });

        tracing::debug!(router = %self.name, method = %name, "registered method");
        Ok(())
    }

    /// Appends a plugin to the chain.
    ///
    /// Existing entries are decorated retroactively and every chain is
    /// recomposed. Nothing changes if any step fails.
    pub fn plug(&self, plugin: Arc<dyn Plugin>) -> Result<(), RouterError> {
        let mut state = self.state.write();
        if state.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(RouterError::DuplicatePlugin {
                router: self.name.clone(),
                plugin: plugin.name().to_string(),
            });
        }

        let mut plugins = state.plugins.clone();
        plugins.push(plugin.clone());

        let ctx = self.ctx();
        let mut rebuilt = IndexMap::with_capacity(state.entries.len());
        for (name, slot) in &state.entries {
            let mut entry = slot.entry.clone();
            plugin.on_decore(&ctx, &mut entry)?;
            let chain = compose(&ctx, &plugins, &entry)?;
            rebuilt.insert(name.clone(), Slot { entry, chain });
        }

        state.plugins = plugins;
        state.entries = rebuilt;
        tracing::debug!(router = %self.name, plugin = %plugin.name(), "plugged");
        Ok(())
    }

    /// Creates a plugin from the named registry, configures it with `flags`,
    /// and plugs it.
    pub fn plug_named(&self, name: &str, flags: &str) -> Result<Arc<dyn Plugin>, RouterError> {
        let plugin = registry::create_plugin(name)?;
        plugin.core().configure(flags)?;
        self.plug(plugin.clone())?;
        Ok(plugin)
    }

    /// Names of attached plugins, in attachment order.
    pub fn plugins(&self) -> Vec<String> {
        self.state
            .read()
            .plugins
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Looks up an attached plugin by name.
    pub fn plugin(&self, name: &str) -> Result<Arc<dyn Plugin>, RouterError> {
        let state = self.state.read();
        state
            .plugins
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| {
                RouterError::not_found(
                    NameKind::Plugin,
                    name,
                    &self.name,
                    state.plugins.iter().map(|p| p.name().to_string()).collect(),
                )
            })
    }

    /// Merges flags into a plugin's global config.
    pub fn configure(&self, plugin: &str, flags: &str) -> Result<(), RouterError> {
        self.plugin(plugin)?.core().configure(flags)
    }

    /// Merges flags into a plugin's override for a method selector.
    pub fn configure_method(&self, plugin: &str, selector: &str, flags: &str) -> Result<(), RouterError> {
        self.plugin(plugin)?.core().configure_method(selector, flags)
    }

    /// Turns a plugin on for one method of this router's handler instance.
    pub fn enable(&self, plugin: &str, method: &str) -> Result<(), RouterError> {
        self.plugin(plugin)?.enable(&self.handler, method);
        Ok(())
    }

    /// Turns a plugin off for one method of this router's handler instance.
    pub fn disable(&self, plugin: &str, method: &str) -> Result<(), RouterError> {
        self.plugin(plugin)?.disable(&self.handler, method);
        Ok(())
    }

    /// A copy of the decorated entry for `name`.
    pub fn entry(&self, name: &str) -> Option<MethodEntry> {
        self.state.read().entries.get(name).map(|s| s.entry.clone())
    }

    /// Method names in registration order.
    pub fn methods(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Attaches `child` under its own name.
    pub fn add_child(self: &Arc<Self>, child: Arc<Router>) -> Result<(), RouterError> {
        let name = child.name.clone();
        self.add_child_as(name, child)
    }

    /// Attaches `child` under `name`.
    pub fn add_child_as(self: &Arc<Self>, name: impl Into<String>, child: Arc<Router>) -> Result<(), RouterError> {
        let name = name.into();
        RouterError::check_name(NameKind::Child, &name, &self.name)?;
        if Arc::ptr_eq(self, &child) || self.has_ancestor(&child) {
            return Err(RouterError::CyclicAttach {
                child: child.name.clone(),
                parent: self.name.clone(),
            });
        }
        if let Some(parent) = child.parent() {
            return Err(RouterError::AlreadyAttached {
                child: child.name.clone(),
                parent: parent.name.clone(),
            });
        }

        let mut state = self.state.write();
        if state.children.contains_key(&name) {
            return Err(RouterError::DuplicateChild {
                router: self.name.clone(),
                name,
            });
        }
        *child.parent.lock() = Some(Arc::downgrade(self));
        state.children.insert(name.clone(), child);
        tracing::debug!(router = %self.name, child = %name, "attached child");
        Ok(())
    }

    /// Detaches a child, returning it.
    pub fn remove_child(&self, name: &str) -> Option<Arc<Router>> {
        let child = self.state.write().children.shift_remove(name)?;
        *child.parent.lock() = None;
        Some(child)
    }

    /// Direct child attached under `name`.
    pub fn child(&self, name: &str) -> Option<Arc<Router>> {
        self.state.read().children.get(name).cloned()
    }

    /// Child names in attachment order.
    pub fn children(&self) -> Vec<String> {
        self.state.read().children.keys().cloned().collect()
    }

    /// The router this one is attached to, if it is still alive.
    pub fn parent(&self) -> Option<Arc<Router>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    fn has_ancestor(&self, candidate: &Arc<Router>) -> bool {
        let mut current = self.parent();
        while let Some(router) = current {
            if Arc::ptr_eq(&router, candidate) {
                return true;
            }
            current = router.parent();
        }
        false
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolves a child router by dotted path. The empty path is `self`.
    pub fn node(self: &Arc<Self>, path: &str) -> Result<Arc<Router>, RouterError> {
        self.walk(&string_to_path(path))
    }

    fn walk(self: &Arc<Self>, hops: &[String]) -> Result<Arc<Router>, RouterError> {
        let mut current = self.clone();
        for hop in hops {
            let next = current.child(hop).ok_or_else(|| {
                RouterError::not_found(NameKind::Child, hop.as_str(), &current.name, current.children())
            })?;
            current = next;
        }
        Ok(current)
    }

    /// Resolves a dotted path to a bound, fully wrapped callable.
    pub fn get(self: &Arc<Self>, path: &str) -> Result<Bound, RouterError> {
        let segments = string_to_path(path);
        let Some((method, hops)) = segments.split_last() else {
            return Err(RouterError::not_found(
                NameKind::Method,
                "",
                &self.name,
                self.methods(),
            ));
        };
        let node = self.walk(hops)?;
        node.bind_method(method, path)
    }

    fn bind_method(&self, method: &str, path: &str) -> Result<Bound, RouterError> {
        let state = self.state.read();
        let slot = state.entries.get(method).ok_or_else(|| {
            RouterError::not_found(
                NameKind::Method,
                method,
                &self.name,
                state.entries.keys().cloned().collect(),
            )
        })?;
        Ok(Bound {
            path: path.to_string(),
            method: slot.entry.name.clone(),
            handler: self.handler.clone(),
            chain: slot.chain.clone(),
            overrides: Overrides::new(),
        })
    }

    /// Resolves and invokes in one step. Resolution failures surface from
    /// the returned future as a [`RouterError`] inside `anyhow::Error`.
    pub fn call(self: &Arc<Self>, path: &str, args: Args) -> PendingCall {
        match self.get(path) {
            Ok(bound) => bound.call(args),
            Err(err) => PendingCall(futures::future::ready(Err(err.into())).boxed()),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    fn visible(plugins: &[Arc<dyn Plugin>], entry: &MethodEntry, filter: &EntryFilter) -> bool {
        filter.is_empty() || plugins.iter().all(|p| p.filter_entry(entry, filter))
    }

    /// Method and child names of the whole subtree, filtered.
    pub fn members(&self, filter: &EntryFilter) -> Members {
        let state = self.state.read();
        let methods = state
            .entries
            .values()
            .filter(|slot| Self::visible(&state.plugins, &slot.entry, filter))
            .map(|slot| slot.entry.name.clone())
            .collect();
        let children = state
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.members(filter)))
            .filter(|(_, m)| filter.is_empty() || !m.is_empty())
            .collect();
        Members {
            name: self.name.clone(),
            methods,
            children,
        }
    }

    /// Full introspection schema of the subtree, filtered.
    pub fn describe(&self, filter: &EntryFilter) -> RouterSchema {
        let state = self.state.read();
        let methods = state
            .entries
            .values()
            .filter(|slot| Self::visible(&state.plugins, &slot.entry, filter))
            .map(|slot| {
                let schema = describe_entry(&state.plugins, &slot.entry);
                (slot.entry.name.clone(), schema)
            })
            .collect();
        let children = state
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.describe(filter)))
            .filter(|(_, schema)| filter.is_empty() || !schema.is_empty())
            .collect();
        RouterSchema {
            name: self.name.clone(),
            description: self.description().to_string(),
            methods,
            children,
        }
    }

    /// Unfiltered schema.
    pub fn schema(&self) -> RouterSchema {
        self.describe(&EntryFilter::all())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Router")
            .field("name", &self.name)
            .field("methods", &state.entries.keys().collect::<Vec<_>>())
            .field(
                "plugins",
                &state.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("children", &state.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Names visible in a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Members {
    pub name: String,
    pub methods: Vec<String>,
    pub children: IndexMap<String, Members>,
}

impl Members {
    /// True when no method is reachable from this level.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.children.values().all(Members::is_empty)
    }

    /// Every method path in the subtree.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect("", &mut out);
        out
    }

    fn collect(&self, prefix: &str, out: &mut Vec<String>) {
        out.extend(self.methods.iter().map(|m| join_path(prefix, m)));
        for (name, child) in &self.children {
            child.collect(&join_path(prefix, name), out);
        }
    }
}

fn describe_entry(plugins: &[Arc<dyn Plugin>], entry: &MethodEntry) -> MethodSchema {
    // Validation stores its compiled table; prefer it over the raw one.
    let params = entry
        .metadata
        .get("validate")
        .and_then(|v| v.get("params"))
        .and_then(|v| serde_json::from_value::<Vec<Param>>(v.clone()).ok())
        .unwrap_or_else(|| entry.params.as_ref().clone());

    let mut extra = Map::new();
    for plugin in plugins {
        if let Some((key, value)) = plugin.describe_entry(entry) {
            extra.insert(key, value);
        }
    }

    MethodSchema {
        name: entry.name.clone(),
        description: entry.description().to_string(),
        doc: entry.doc.clone(),
        params,
        extra,
    }
}

// ----------------------------------------------------------------------
// Chain composition
// ----------------------------------------------------------------------

fn compose(
    ctx: &PluginContext<'_>,
    plugins: &[Arc<dyn Plugin>],
    entry: &MethodEntry,
) -> Result<MethodFn, RouterError> {
    let mut next = base_fn(entry);
    for plugin in plugins.iter().rev() {
        let wrapped = plugin.clone().wrap_handler(ctx, entry, next.clone())?;
        next = gate(plugin.clone(), wrapped, next);
    }
    Ok(next)
}

fn gate(plugin: Arc<dyn Plugin>, wrapped: MethodFn, inner: MethodFn) -> MethodFn {
    Arc::new(move |call: Call| {
        let on = plugin
            .core()
            .is_enabled(call.instance, &call.method, call.override_for(plugin.name()));
        if on {
            wrapped(call)
        } else {
            inner(call)
        }
    })
}

/// The innermost layer: maps positionals onto declared names, fills
/// defaults, then runs the body.
fn base_fn(entry: &MethodEntry) -> MethodFn {
    let func = entry.func.clone();
    let params = entry.params.clone();
    Arc::new(move |mut call: Call| {
        bind_positional(&params, &mut call.args);
        for param in params.iter() {
            if let Some(default) = &param.default {
                call.args
                    .keyword
                    .entry(param.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        func(call)
    })
}

pub(crate) fn bind_positional(params: &[Param], args: &mut Args) {
    if args.positional.is_empty() {
        return;
    }
    let positional = std::mem::take(&mut args.positional);
    let mut rest = Vec::new();
    for (i, value) in positional.into_iter().enumerate() {
        match params.get(i) {
            Some(param) if !args.keyword.contains_key(&param.name) => {
                args.keyword.insert(param.name.clone(), value);
            }
            _ => rest.push(value),
        }
    }
    args.positional = rest;
}

// ----------------------------------------------------------------------
// Bound calls
// ----------------------------------------------------------------------

/// A resolved method, ready to invoke.
#[derive(Clone)]
pub struct Bound {
    path: String,
    method: String,
    handler: Arc<dyn Handler>,
    chain: MethodFn,
    overrides: Overrides,
}

impl Bound {
    /// Dotted path the method was resolved through.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Display name of the resolved method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Toggle key of the handler that owns the method.
    pub fn instance(&self) -> InstanceKey {
        InstanceKey::of(&self.handler)
    }

    /// Adds a call-site flag override for one plugin. Highest precedence.
    pub fn configure(mut self, plugin: &str, flags: &str) -> Result<Self, RouterError> {
        let parsed = config::parse_flags(flags)?;
        merge_into(self.overrides.entry(plugin.to_string()).or_default(), &parsed);
        Ok(self)
    }

    /// Adds a call-site option override for one plugin.
    pub fn option(mut self, plugin: &str, key: &str, value: impl Into<Value>) -> Self {
        self.overrides
            .entry(plugin.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Invokes the composed chain with `args`.
    pub fn call(&self, args: Args) -> PendingCall {
        self.call_with(args, Extensions::new())
    }

    /// Invokes with caller-supplied extensions (a caller-owned cursor, for
    /// instance).
    pub fn call_with(&self, args: Args, extensions: Extensions) -> PendingCall {
        let mut call = Call::new(self.method.clone(), self.handler.clone(), args);
        call.path = self.path.clone();
        call.extensions = extensions;
        call.overrides = Arc::new(self.overrides.clone());
        PendingCall((self.chain)(call))
    }
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("path", &self.path)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// The result of invoking a [`Bound`].
///
/// Await it from async code, or call [`wait`](PendingCall::wait) from
/// synchronous code.
#[must_use = "a pending call does nothing until awaited or waited on"]
pub struct PendingCall(BoxFuture<'static, anyhow::Result<Value>>);

impl PendingCall {
    /// Drives the call to completion on the current thread.
    pub fn wait(self) -> anyhow::Result<Value> {
        futures::executor::block_on(self.0)
    }
}

impl std::future::Future for PendingCall {
    type Output = anyhow::Result<Value>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}
