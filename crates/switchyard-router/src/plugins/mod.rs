//! Built-in plugins.
//!
//! | name       | type                 | concern |
//! |------------|----------------------|---------|
//! | `validate` | [`ValidationPlugin`] | argument binding, coercion, constraints |
//! | `dbop`     | [`TransactionPlugin`]| cursor injection, commit, rollback |
//! | `logging`  | [`LoggingPlugin`]    | call tracing |
//! | `publish`  | [`PublishPlugin`]    | scope tags and channel filtering |
//!
//! [`HookPlugin`] builds one-off plugins from closures.

mod hooks;
mod logging;
mod publish;
mod transaction;
mod validate;

pub use hooks::{AfterFn, BeforeFn, CallInfo, ErrorFn, HookError, HookPhase, HookPlugin};
pub use logging::{render_args, LogSink, LoggingPlugin};
pub use publish::{PublishPlugin, ScopePayload, STANDARD_CHANNELS};
pub use transaction::TransactionPlugin;
pub use validate::{coerce, validate_args, ValidationPlugin};
