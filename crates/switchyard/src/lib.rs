//! # Switchyard - Publish Routed Methods over CLI and HTTP
//!
//! Switchyard takes business handlers written against
//! [`switchyard_router`] and publishes them through thin channels. The
//! channels never parse or validate arguments themselves: they read the
//! router schema and hand raw values to the plugin chain.
//!
//! - [`Publisher`]: one root router, apps mounted under it, root commands
//! - [`AppCatalog`]: app factories addressed by spec (`shop`, `shop:Hierarchical`)
//! - [`StateSnapshot`]: the JSON document `/savestate` produces and `/loadstate` consumes
//! - [`CliChannel`] / [`HttpChannel`]: argv and axum front ends
//! - [`OutputFormat`]: JSON or YAML rendering of call results
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use switchyard::{AppCatalog, CliChannel, Publisher};
//! use switchyard_router::{Call, MethodSpec, Param, Router};
//!
//! let catalog = AppCatalog::new().register("calc", |_| {
//!     Ok(Router::builder("calc")
//!         .plug_named("validate", "")
//!         .method(
//!             MethodSpec::new("add").param(Param::integer("a")).param(Param::integer("b")),
//!             |_: &(), call: &mut Call| Ok::<_, anyhow::Error>(call.arg::<i64>("a")? + call.arg::<i64>("b")?),
//!         )
//!         .build()?)
//! });
//!
//! let publisher = Arc::new(Publisher::new("demo", catalog)?);
//! publisher.add_app("calc", "calc", Default::default())?;
//!
//! let cli = CliChannel::new(publisher);
//! let argv: Vec<String> = ["calc", "add", "--a", "2", "--b", "3"].map(String::from).into();
//! let outcome = cli.run(&argv);
//! assert_eq!(outcome.stdout, "5");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Channels and Scopes
//!
//! Each channel has a code (`CLI`, `HTTP`, ...). Channels ask the router for
//! a view filtered by their code; the `publish` plugin decides what each
//! view contains. Root commands carry the `internal` scope, so they show up
//! on the CLI and the shared publisher API but never on an app's HTTP API.

pub mod catalog;
pub mod channels;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod publisher;
pub mod state;

pub use catalog::{AppCatalog, AppFactory};
pub use channels::{split_cli_args, Channel, ChannelInfo, ChannelRegistry, CliChannel, CliOutcome, HttpChannel};
pub use config::{PublisherArgs, PublisherConfig};
pub use error::PublisherError;
pub use format::OutputFormat;
pub use logging::init_tracing;
pub use publisher::{AppRegistry, Publisher};
pub use state::{AppRecord, StateSnapshot};
