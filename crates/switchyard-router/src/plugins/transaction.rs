//! Cursor injection and transaction management (`dbop`).
//!
//! Before the inner call the plugin injects a [`Cursor`] from the handler's
//! [`TransactionalResource`] unless the caller already supplied one. After a
//! successful call it commits when the `autocommit` argument is truthy (the
//! declared default applies when the argument is absent). When the inner
//! call fails it rolls back and returns the original error; a failing
//! rollback is logged and swallowed.

use futures::FutureExt;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::call::{Call, MethodFn};
use crate::entry::MethodEntry;
use crate::error::RouterError;
use crate::plugin::{Plugin, PluginContext, PluginCore};
use crate::resource::Cursor;

pub struct TransactionPlugin {
    core: PluginCore,
}

impl Default for TransactionPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionPlugin {
    pub fn new() -> Self {
        Self {
            core: PluginCore::new("dbop", Map::new()).with_known_flags(&[]),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        _ => false,
    }
}

impl Plugin for TransactionPlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn on_decore(&self, ctx: &PluginContext<'_>, _entry: &mut MethodEntry) -> Result<(), RouterError> {
        if ctx.resource().is_none() {
            return Err(RouterError::MissingResource {
                router: ctx.router.to_string(),
                plugin: self.core.name().to_string(),
            });
        }
        Ok(())
    }

    fn wrap_handler(
        self: Arc<Self>,
        ctx: &PluginContext<'_>,
        entry: &MethodEntry,
        next: MethodFn,
    ) -> Result<MethodFn, RouterError> {
        if ctx.resource().is_none() {
            return Err(RouterError::MissingResource {
                router: ctx.router.to_string(),
                plugin: self.core.name().to_string(),
            });
        }
        let autocommit_default = entry
            .param("autocommit")
            .and_then(|p| p.default.as_ref())
            .is_some_and(truthy);

        Ok(Arc::new(move |call: Call| {
            transact(call, next.clone(), autocommit_default).boxed()
        }))
    }
}

async fn transact(mut call: Call, next: MethodFn, autocommit_default: bool) -> anyhow::Result<Value> {
    let handler = call.handler.clone();
    let resource = handler.resource().ok_or_else(|| {
        anyhow::anyhow!("handler for '{}' exposes no transactional resource", call.method)
    })?;
    let autocommit = call
        .args
        .get("autocommit")
        .map(truthy)
        .unwrap_or(autocommit_default);
    let method = call.method.clone();

    if !call.extensions.contains::<Cursor>() {
        call.extensions.insert(resource.cursor()?);
    }

    let outcome = match next(call).await {
        Ok(value) if autocommit => resource.commit().map(|()| value),
        other => other,
    };
    match outcome {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(rollback) = resource.rollback() {
                tracing::warn!(method = %method, error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Args, Handler};
    use crate::resource::TransactionalResource;
    use crate::router::Router;
    use crate::MethodSpec;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
        fail_rollback: bool,
    }

    impl TransactionalResource for Journal {
        fn cursor(&self) -> anyhow::Result<Cursor> {
            self.events.lock().push("cursor".into());
            Ok(Cursor::new(()))
        }
        fn commit(&self) -> anyhow::Result<()> {
            self.events.lock().push("commit".into());
            Ok(())
        }
        fn rollback(&self) -> anyhow::Result<()> {
            self.events.lock().push("rollback".into());
            if self.fail_rollback {
                anyhow::bail!("connection lost");
            }
            Ok(())
        }
    }

    impl Handler for Journal {
        fn resource(&self) -> Option<&dyn TransactionalResource> {
            Some(self)
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("insert failed")]
    struct InsertFailed;

    fn router(journal: Arc<Journal>) -> Arc<Router> {
        Router::bind("rows", journal)
            .plug(Arc::new(TransactionPlugin::new()))
            .method(
                MethodSpec::new("write").param(crate::Param::boolean("autocommit").default(false)),
                |_j: &Journal, call: &mut Call| {
                    call.cursor::<()>()?;
                    Ok::<_, anyhow::Error>("ok")
                },
            )
            .method("fail", |_j: &Journal, _call: &mut Call| {
                Err::<(), _>(InsertFailed)
            })
            .build()
            .unwrap()
    }

    fn events(journal: &Journal) -> Vec<String> {
        journal.events.lock().clone()
    }

    #[test]
    fn test_cursor_injected_without_commit() {
        let journal = Arc::new(Journal::default());
        router(journal.clone()).call("write", Args::new()).wait().unwrap();
        assert_eq!(events(&journal), vec!["cursor"]);
    }

    #[test]
    fn test_autocommit_commits() {
        let journal = Arc::new(Journal::default());
        router(journal.clone())
            .call("write", Args::new().kw("autocommit", true))
            .wait()
            .unwrap();
        assert_eq!(events(&journal), vec!["cursor", "commit"]);
    }

    #[test]
    fn test_error_rolls_back_and_keeps_original() {
        let journal = Arc::new(Journal::default());
        let err = router(journal.clone()).call("fail", Args::new()).wait().unwrap_err();
        assert!(err.downcast_ref::<InsertFailed>().is_some());
        assert_eq!(events(&journal), vec!["cursor", "rollback"]);
    }

    #[test]
    fn test_rollback_failure_is_swallowed() {
        let journal = Arc::new(Journal {
            fail_rollback: true,
            ..Default::default()
        });
        let err = router(journal.clone()).call("fail", Args::new()).wait().unwrap_err();
        assert!(err.downcast_ref::<InsertFailed>().is_some());
    }

    #[test]
    fn test_caller_cursor_is_reused() {
        let journal = Arc::new(Journal::default());
        let mut ext = crate::Extensions::new();
        ext.insert(Cursor::new(()));
        router(journal.clone())
            .get("write")
            .unwrap()
            .call_with(Args::new(), ext)
            .wait()
            .unwrap();
        assert!(events(&journal).is_empty());
    }

    #[test]
    fn test_requires_resource() {
        let err = Router::builder("plain")
            .plug(Arc::new(TransactionPlugin::new()))
            .method("m", |_: &(), _call: &mut Call| Ok::<_, anyhow::Error>(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::MissingResource { .. }));
    }
}
