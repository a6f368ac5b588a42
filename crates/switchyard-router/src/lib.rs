//! Method routing with composable plugin chains.
//!
//! `switchyard-router` is the core of switchyard: business handlers register
//! methods on a [`Router`], plugins wrap every call with cross-cutting
//! concerns, and channel adapters (CLI, HTTP) consume the same
//! [`RouterSchema`] to expose those methods without duplicating argument
//! handling.
//!
//! # Dispatch Flow
//!
//! ```text
//! router.get("db.tables.product.list")     resolve the dotted path
//!   → Bound                                  pre-composed chain + handler
//!   → call(args)
//!       → validate (outermost)               bind, coerce, check
//!       → dbop                               cursor, commit / rollback
//!       → logging                            → method / ← method
//!       → method body (innermost)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use switchyard_router::{Args, Call, MethodSpec, Param, Router};
//!
//! let router = Router::builder("greeter")
//!     .plug_named("validate", "")
//!     .method(
//!         MethodSpec::new("hello").param(Param::string("name").default("world")),
//!         |_: &(), call: &mut Call| Ok::<_, anyhow::Error>(format!("hello {}", call.arg::<String>("name")?)),
//!     )
//!     .build()?;
//!
//! let out = router.call("hello", Args::new()).wait()?;
//! assert_eq!(out, "hello world");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Core Types
//!
//! - [`Router`] / [`RouterBuilder`]: registration, plugging, hierarchy, resolution
//! - [`MethodEntry`] / [`MethodSpec`] / [`Param`]: method descriptors and parameter tables
//! - [`Plugin`] / [`PluginCore`]: the plugin contract and its config/toggle state
//! - [`Call`] / [`Args`] / [`Extensions`]: the in-flight call
//! - [`Bound`] / [`PendingCall`]: resolved callables, awaitable or blocking
//! - [`RouterSchema`]: introspection output

mod builder;
mod call;
pub mod config;
pub mod dispatch;
mod entry;
mod error;
mod extensions;
mod params;
mod plugin;
pub mod plugins;
mod registry;
mod resource;
mod router;
mod schema;

pub use builder::RouterBuilder;
pub use call::{Args, Call, Handler, InstanceKey, IntoMethodResult, MethodFn, Overrides};
pub use config::{parse_flags, PluginConfig};
pub use dispatch::{join_path, path_to_string, string_to_path};
pub use entry::MethodEntry;
pub use error::{FieldError, NameKind, RouterError, ValidationError};
pub use extensions::Extensions;
pub use params::{Constraints, MethodSpec, Param, ParamType};
pub use plugin::{EntryFilter, Plugin, PluginContext, PluginCore};
pub use registry::{create_plugin, register_plugin, registered_plugins, PluginFactory};
pub use resource::{Cursor, TransactionalResource};
pub use router::{Bound, Members, PendingCall, Router};
pub use schema::{MethodSchema, RouterSchema};
