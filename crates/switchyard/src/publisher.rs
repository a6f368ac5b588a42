//! The publisher: one root router, the applications mounted under it, and
//! the root commands that manage them.
//!
//! Applications are child routers of the root. Each one is either built
//! from an [`AppCatalog`] spec (and so appears in state snapshots) or
//! mounted directly with [`Publisher::mount`].
//!
//! Root commands are ordinary methods on the root router, tagged with the
//! `internal` scope so the `publish` plugin shows them to the CLI (as
//! `/add`, `/list`, ...) and the shared publisher HTTP API, never to the
//! application HTTP API.
//!
//! ```rust
//! use switchyard::{AppCatalog, Publisher};
//! use switchyard_router::{Args, Router};
//!
//! let catalog = AppCatalog::new().register("shop", |_| Ok(Router::new("shop")));
//! let publisher = Publisher::new("demo", catalog)?;
//!
//! publisher.add_app("shop", "shop", Args::new())?;
//! assert_eq!(publisher.apps(), vec!["shop"]);
//!
//! let listing = publisher.call("list", Args::new()).wait()?;
//! assert_eq!(listing["total"], 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use switchyard_router::{
    Args, Call, EntryFilter, Handler, MethodSpec, Param, PendingCall, Router, RouterError,
    RouterSchema,
};

use crate::catalog::AppCatalog;
use crate::channels::ChannelRegistry;
use crate::error::PublisherError;
use crate::state::{AppRecord, StateSnapshot};

/// Scope tag carried by every root command.
pub const ROOT_SCOPE: &str = "internal";

/// Root command names, in help order.
pub const ROOT_COMMANDS: &[&str] = &[
    "add",
    "remove",
    "list",
    "getapp",
    "savestate",
    "loadstate",
    "channels",
];

/// State behind the root commands. Bound to the root router as its handler.
pub struct AppRegistry {
    catalog: AppCatalog,
    /// Mounted applications by name; `None` for routers mounted without a spec.
    apps: RwLock<IndexMap<String, Option<AppRecord>>>,
    root: OnceCell<Weak<Router>>,
    channels: ChannelRegistry,
    autosave: AtomicBool,
    saved: RwLock<Option<StateSnapshot>>,
}

impl Handler for AppRegistry {}

impl AppRegistry {
    fn new(catalog: AppCatalog) -> Self {
        Self {
            catalog,
            apps: RwLock::new(IndexMap::new()),
            root: OnceCell::new(),
            channels: ChannelRegistry::standard(),
            autosave: AtomicBool::new(false),
            saved: RwLock::new(None),
        }
    }

    fn root(&self) -> Result<Arc<Router>, PublisherError> {
        self.root
            .get()
            .and_then(Weak::upgrade)
            .ok_or(PublisherError::Detached)
    }

    pub fn catalog(&self) -> &AppCatalog {
        &self.catalog
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.read().keys().cloned().collect()
    }

    fn snapshot_of(&self, apps: &IndexMap<String, Option<AppRecord>>) -> StateSnapshot {
        let records = apps.values().flatten().cloned().collect();
        StateSnapshot::new(self.autosave.load(Ordering::SeqCst), records)
    }

    fn autosave_from(&self, apps: &IndexMap<String, Option<AppRecord>>) {
        if self.autosave.load(Ordering::SeqCst) {
            *self.saved.write() = Some(self.snapshot_of(apps));
        }
    }

    fn unknown_app(&self, name: &str, apps: &IndexMap<String, Option<AppRecord>>) -> PublisherError {
        PublisherError::UnknownApp {
            name: name.to_string(),
            available: apps.keys().cloned().collect(),
        }
    }

    /// Builds `spec` from the catalog and mounts it as `name`.
    pub fn add(&self, name: &str, spec: &str, args: &Args) -> Result<Value, PublisherError> {
        let root = self.root()?;
        let mut apps = self.apps.write();
        if apps.contains_key(name) || root.child(name).is_some() {
            return Err(PublisherError::DuplicateApp {
                name: name.to_string(),
            });
        }
        let router = self.catalog.build(spec, args)?;
        root.add_child_as(name, router)?;
        apps.insert(name.to_string(), Some(AppRecord::new(name, spec, args)));
        self.autosave_from(&apps);
        tracing::info!(app = %name, %spec, "added app");
        Ok(json!({"status": "added", "name": name, "spec": spec}))
    }

    fn mount(&self, name: &str, router: Arc<Router>) -> Result<(), PublisherError> {
        let root = self.root()?;
        let mut apps = self.apps.write();
        if apps.contains_key(name) || root.child(name).is_some() {
            return Err(PublisherError::DuplicateApp {
                name: name.to_string(),
            });
        }
        root.add_child_as(name, router)?;
        apps.insert(name.to_string(), None);
        tracing::debug!(app = %name, "mounted router");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<Value, PublisherError> {
        let root = self.root()?;
        let mut apps = self.apps.write();
        let Some(record) = apps.shift_remove(name) else {
            return Err(self.unknown_app(name, &apps));
        };
        root.remove_child(name);
        self.autosave_from(&apps);
        tracing::info!(app = %name, "removed app");
        Ok(json!({
            "status": "removed",
            "name": name,
            "spec": record.map(|r| r.spec),
        }))
    }

    pub fn list(&self) -> Value {
        let apps = self.apps.read();
        let listing: IndexMap<&String, Value> = apps
            .iter()
            .map(|(name, record)| (name, record_summary(record.as_ref())))
            .collect();
        json!({"total": apps.len(), "apps": listing})
    }

    pub fn getapp(&self, name: &str) -> Result<Value, PublisherError> {
        let root = self.root()?;
        let apps = self.apps.read();
        let Some(record) = apps.get(name) else {
            return Err(self.unknown_app(name, &apps));
        };
        let router = root
            .child(name)
            .ok_or_else(|| self.unknown_app(name, &apps))?;
        let mut info = json!({
            "name": name,
            "description": router.description(),
            "methods": router.methods(),
            "children": router.children(),
            "plugins": router.plugins(),
        });
        if let (Value::Object(out), Value::Object(summary)) = (&mut info, record_summary(record.as_ref())) {
            out.extend(summary);
        }
        Ok(info)
    }

    /// Snapshot of every spec-built app; also kept as the saved state.
    pub fn save(&self) -> StateSnapshot {
        let snapshot = self.snapshot_of(&self.apps.read());
        *self.saved.write() = Some(snapshot.clone());
        snapshot
    }

    /// Replaces every spec-built app with the snapshot's apps.
    ///
    /// All routers are built before anything is unmounted; a failing
    /// factory or a name clash leaves the publisher unchanged.
    pub fn load(&self, snapshot: StateSnapshot) -> Result<Value, PublisherError> {
        let root = self.root()?;
        let mut apps = self.apps.write();

        let mut built: Vec<(&AppRecord, Arc<Router>)> = Vec::with_capacity(snapshot.apps.len());
        for record in &snapshot.apps {
            let clashes = built.iter().any(|(r, _)| r.name == record.name)
                || matches!(apps.get(&record.name), Some(None))
                || (!apps.contains_key(&record.name) && root.child(&record.name).is_some());
            if clashes {
                return Err(PublisherError::DuplicateApp {
                    name: record.name.clone(),
                });
            }
            let router = self.catalog.build(&record.spec, &record.factory_args())?;
            built.push((record, router));
        }

        let replaced: Vec<String> = apps
            .iter()
            .filter(|(_, record)| record.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &replaced {
            root.remove_child(name);
            apps.shift_remove(name);
        }
        for (record, router) in built {
            root.add_child_as(record.name.as_str(), router)?;
            apps.insert(record.name.clone(), Some(record.clone()));
        }

        self.autosave.store(snapshot.autosave, Ordering::SeqCst);
        self.autosave_from(&apps);
        tracing::info!(apps = snapshot.apps.len(), "loaded state");
        let names: Vec<&String> = snapshot.apps.iter().map(|r| &r.name).collect();
        Ok(json!({"status": "loaded", "apps": names}))
    }
}

fn record_summary(record: Option<&AppRecord>) -> Value {
    match record {
        Some(record) => json!({
            "spec": record.spec,
            "args": record.args,
            "kwargs": record.kwargs,
        }),
        None => json!({"spec": null, "mounted": true}),
    }
}

fn root_router(name: &str, registry: Arc<AppRegistry>) -> Result<Arc<Router>, RouterError> {
    let internal = |spec: MethodSpec| spec.meta("scopes", ROOT_SCOPE);
    Router::bind(name, registry)
        .doc(format!("{} publisher.", name))
        .plug_named("validate", "")
        .plug_named("publish", "")
        .method(
            internal(
                MethodSpec::new("add")
                    .doc("Build an app from the catalog and publish it.")
                    .param(Param::string("name").describe("name the app is published under"))
                    .param(Param::string("spec").describe("catalog spec, `path` or `path:Name`"))
                    .param(Param::array("args").default(json!([])))
                    .param(Param::object("kwargs").default(json!({}))),
            ),
            |reg: &AppRegistry, call: &mut Call| {
                let args = Args {
                    positional: call.arg("args")?,
                    keyword: call.arg("kwargs")?,
                };
                reg.add(&call.arg::<String>("name")?, &call.arg::<String>("spec")?, &args)
                    .map_err(anyhow::Error::from)
            },
        )
        .method(
            internal(
                MethodSpec::new("remove")
                    .doc("Unpublish an app.")
                    .param(Param::string("name")),
            ),
            |reg: &AppRegistry, call: &mut Call| reg.remove(&call.arg::<String>("name")?).map_err(anyhow::Error::from),
        )
        .method(
            internal(MethodSpec::new("list").doc("List published apps.")),
            |reg: &AppRegistry, _call: &mut Call| Ok::<_, anyhow::Error>(reg.list()),
        )
        .method(
            internal(
                MethodSpec::new("getapp")
                    .doc("Show one published app.")
                    .param(Param::string("name")),
            ),
            |reg: &AppRegistry, call: &mut Call| reg.getapp(&call.arg::<String>("name")?).map_err(anyhow::Error::from),
        )
        .method(
            internal(MethodSpec::new("savestate").doc("Snapshot the published apps.")),
            |reg: &AppRegistry, _call: &mut Call| Ok::<_, anyhow::Error>(reg.save().to_value()),
        )
        .method(
            internal(
                MethodSpec::new("loadstate")
                    .doc("Replace the published apps with a snapshot.")
                    .param(Param::object("state")),
            ),
            |reg: &AppRegistry, call: &mut Call| {
                let snapshot = StateSnapshot::from_value(call.arg("state")?)?;
                reg.load(snapshot).map_err(anyhow::Error::from)
            },
        )
        .method(
            internal(MethodSpec::new("channels").doc("List the available channels.")),
            |reg: &AppRegistry, _call: &mut Call| Ok::<_, anyhow::Error>(reg.channels().listing()),
        )
        .build()
}

/// Owns the root router and everything published under it.
pub struct Publisher {
    name: String,
    root: Arc<Router>,
    registry: Arc<AppRegistry>,
}

impl Publisher {
    pub fn new(name: impl Into<String>, catalog: AppCatalog) -> Result<Self, RouterError> {
        let name = name.into();
        let registry = Arc::new(AppRegistry::new(catalog));
        let root = root_router(&name, registry.clone())?;
        let _ = registry.root.set(Arc::downgrade(&root));
        Ok(Self {
            name,
            root,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Arc<Router> {
        &self.root
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelRegistry {
        self.registry.channels()
    }

    pub fn add_app(&self, name: &str, spec: &str, args: Args) -> Result<Value, PublisherError> {
        self.registry.add(name, spec, &args)
    }

    pub fn remove_app(&self, name: &str) -> Result<Value, PublisherError> {
        self.registry.remove(name)
    }

    /// Publishes a prebuilt router. It is left out of state snapshots.
    pub fn mount(&self, name: &str, router: Arc<Router>) -> Result<(), PublisherError> {
        self.registry.mount(name, router)
    }

    /// Published app names in mount order.
    pub fn apps(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Resolves and invokes a dotted path from the root, e.g. `shop.articles.add`
    /// or the root command `list`.
    pub fn call(&self, path: &str, args: Args) -> PendingCall {
        self.root.call(path, args)
    }

    pub fn describe(&self, filter: &EntryFilter) -> RouterSchema {
        self.root.describe(filter)
    }

    /// App names visible on a channel.
    pub fn handlers(&self, channel: &str) -> Vec<String> {
        self.describe(&EntryFilter::channel(channel))
            .children
            .into_keys()
            .collect()
    }

    pub fn save_state(&self) -> StateSnapshot {
        self.registry.save()
    }

    pub fn load_state(&self, snapshot: StateSnapshot) -> Result<Value, PublisherError> {
        self.registry.load(snapshot)
    }

    /// With autosave on, every add and remove refreshes the saved snapshot.
    pub fn set_autosave(&self, enabled: bool) {
        self.registry.autosave.store(enabled, Ordering::SeqCst);
    }

    pub fn autosave(&self) -> bool {
        self.registry.autosave.load(Ordering::SeqCst)
    }

    /// The last snapshot taken by `/savestate`, `/loadstate` or autosave.
    pub fn saved_state(&self) -> Option<StateSnapshot> {
        self.registry.saved.read().clone()
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("apps", &self.apps())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_router::ValidationError;

    fn catalog() -> AppCatalog {
        AppCatalog::new()
            .register("shop", |_| {
                Router::builder("shop")
                    .doc("A shop.")
                    .method("ping", |_: &(), _call: &mut Call| Ok::<_, anyhow::Error>("pong"))
                    .build()
                    .map_err(anyhow::Error::from)
            })
            .register("broken", |_| anyhow::bail!("no database"))
    }

    fn publisher() -> Publisher {
        Publisher::new("demo", catalog()).unwrap()
    }

    #[test]
    fn test_add_then_call_through_root() {
        let publisher = publisher();
        publisher.add_app("shop", "shop", Args::new()).unwrap();
        let out = publisher.call("shop.ping", Args::new()).wait().unwrap();
        assert_eq!(out, "pong");
    }

    #[test]
    fn test_duplicate_app_name() {
        let publisher = publisher();
        publisher.add_app("shop", "shop", Args::new()).unwrap();
        let err = publisher.add_app("shop", "shop", Args::new()).unwrap_err();
        assert!(matches!(err, PublisherError::DuplicateApp { .. }));
    }

    #[test]
    fn test_failing_factory_mounts_nothing() {
        let publisher = publisher();
        assert!(publisher.add_app("db", "broken", Args::new()).is_err());
        assert!(publisher.apps().is_empty());
        assert!(publisher.root().children().is_empty());
    }

    #[test]
    fn test_remove_unknown_lists_apps() {
        let publisher = publisher();
        publisher.add_app("shop", "shop", Args::new()).unwrap();
        let err = publisher.remove_app("crm").unwrap_err();
        assert_eq!(err.available(), ["shop"]);
    }

    #[test]
    fn test_root_commands_validate_arguments() {
        let publisher = publisher();
        let err = publisher.call("add", Args::new().kw("name", "shop")).wait().unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().unwrap();
        assert_eq!(validation.fields(), vec!["spec"]);
    }

    #[test]
    fn test_root_commands_hidden_from_app_http() {
        let publisher = publisher();
        assert!(publisher.describe(&EntryFilter::channel("HTTP")).methods.is_empty());
        let cli = publisher.describe(&EntryFilter::channel("CLI"));
        let names: Vec<String> = cli.methods.keys().cloned().collect();
        assert_eq!(names, ROOT_COMMANDS);
    }

    #[test]
    fn test_mounted_router_is_not_saved() {
        let publisher = publisher();
        publisher.mount("ops", Router::new("ops")).unwrap();
        publisher.add_app("shop", "shop", Args::new().kw("seed", 1)).unwrap();
        let snapshot = publisher.save_state();
        assert_eq!(snapshot.apps.len(), 1);
        assert_eq!(snapshot.apps[0].kwargs["seed"], 1);
        assert_eq!(publisher.saved_state(), Some(snapshot));
    }

    #[test]
    fn test_load_state_replaces_spec_apps() {
        let publisher = publisher();
        publisher.add_app("old", "shop", Args::new()).unwrap();
        let snapshot = StateSnapshot::new(true, vec![AppRecord::new("new", "shop", &Args::new())]);
        publisher.load_state(snapshot).unwrap();
        assert_eq!(publisher.apps(), vec!["new"]);
        assert!(publisher.autosave());
        assert!(publisher.root().child("old").is_none());
    }

    #[test]
    fn test_failed_load_changes_nothing() {
        let publisher = publisher();
        publisher.add_app("shop", "shop", Args::new()).unwrap();
        let snapshot = StateSnapshot::new(
            false,
            vec![
                AppRecord::new("a", "shop", &Args::new()),
                AppRecord::new("b", "broken", &Args::new()),
            ],
        );
        assert!(publisher.load_state(snapshot).is_err());
        assert_eq!(publisher.apps(), vec!["shop"]);
    }

    #[test]
    fn test_autosave_tracks_changes() {
        let publisher = publisher();
        publisher.set_autosave(true);
        publisher.add_app("shop", "shop", Args::new()).unwrap();
        assert_eq!(publisher.saved_state().unwrap().apps.len(), 1);
        publisher.remove_app("shop").unwrap();
        assert!(publisher.saved_state().unwrap().apps.is_empty());
    }
}
