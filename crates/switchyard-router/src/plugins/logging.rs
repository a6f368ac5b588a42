//! Call logging.
//!
//! Flags:
//!
//! | flag      | default | effect |
//! |-----------|---------|--------|
//! | `enabled` | off     | the plugin does nothing until enabled |
//! | `before`  | on      | `→ method(args)` before the call |
//! | `after`   | off     | `← method` after success, `✗ method: error` after failure |
//! | `time`    | off     | adds the elapsed seconds to the after line, ` (0.0012s)` |
//! | `print`   | off     | write lines to the sink (stdout by default) instead of `tracing` |
//!
//! Without `print`, lines are emitted as `tracing` events on the
//! `switchyard::calls` target.

use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::call::{Args, Call, MethodFn};
use crate::config::flag;
use crate::entry::MethodEntry;
use crate::error::RouterError;
use crate::plugin::{Plugin, PluginContext, PluginCore};

/// Receives printed log lines.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

pub struct LoggingPlugin {
    core: PluginCore,
    sink: Option<LogSink>,
}

impl Default for LoggingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingPlugin {
    pub fn new() -> Self {
        Self::named("logging")
    }

    /// A logging plugin registered under another name, so two can coexist
    /// on one router.
    pub fn named(name: impl Into<String>) -> Self {
        let defaults = json!({
            "enabled": false,
            "before": true,
            "after": false,
            "time": false,
            "print": false,
        });
        let defaults = match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            core: PluginCore::new(name, defaults)
                .with_known_flags(&["print", "before", "after", "time"]),
            sink: None,
        }
    }

    /// Routes printed lines to `sink` instead of stdout.
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    fn emit(&self, print: bool, line: &str) {
        if !print {
            tracing::info!(target: "switchyard::calls", plugin = %self.core.name(), "{}", line);
            return;
        }
        match &self.sink {
            Some(sink) => sink(line),
            None => println!("{}", line),
        }
    }
}

/// Renders arguments as `a, b, key=value`.
pub fn render_args(args: &Args) -> String {
    args.positional
        .iter()
        .map(ToString::to_string)
        .chain(args.keyword.iter().map(|(k, v)| format!("{}={}", k, v)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Plugin for LoggingPlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn wrap_handler(
        self: Arc<Self>,
        _ctx: &PluginContext<'_>,
        _entry: &MethodEntry,
        next: MethodFn,
    ) -> Result<MethodFn, RouterError> {
        Ok(Arc::new(move |call: Call| {
            let config = self
                .core
                .config_for(&call.method, call.override_for(self.core.name()));
            let print = flag(&config, "print");
            let timed = flag(&config, "time");
            let after = flag(&config, "after") || timed;
            if flag(&config, "before") {
                self.emit(print, &format!("→ {}({})", call.method, render_args(&call.args)));
            }

            let method = call.method.clone();
            let this = self.clone();
            let start = Instant::now();
            let fut = next(call);
            async move {
                let result = fut.await;
                if after {
                    let line = match &result {
                        Ok(_) if timed => {
                            format!("← {} ({:.4}s)", method, start.elapsed().as_secs_f64())
                        }
                        Ok(_) => format!("← {}", method),
                        Err(err) => format!("✗ {}: {}", method, err),
                    };
                    this.emit(print, &line);
                }
                result
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

    fn capture() -> (Arc<Mutex<Vec<String>>>, LoggingPlugin) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let plugin = LoggingPlugin::new().with_sink(move |line| sink.lock().push(line.to_string()));
        (lines, plugin)
    }

    fn router(plugin: LoggingPlugin) -> Arc<Router> {
        Router::builder("calc")
            .plug(Arc::new(plugin))
            .method(
                crate::MethodSpec::new("add")
                    .param(crate::Param::integer("a"))
                    .param(crate::Param::integer("b")),
                |_: &(), call: &mut Call| {
                    Ok::<_, anyhow::Error>(call.arg::<i64>("a")? + call.arg::<i64>("b")?)
                },
            )
            .method("boom", |_: &(), _call: &mut Call| {
                Err::<(), _>(anyhow::anyhow!("kaput"))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_disabled_by_default() {
        let (lines, plugin) = capture();
        plugin.core().configure("print").unwrap();
        router(plugin).call("add", Args::new().arg(1).arg(2)).wait().unwrap();
        assert!(lines.lock().is_empty());
    }

    #[test]
    fn test_before_line() {
        let (lines, plugin) = capture();
        plugin.core().configure("print,enabled").unwrap();
        router(plugin)
            .call("add", Args::new().kw("a", 1).kw("b", 2))
            .wait()
            .unwrap();
        assert_eq!(*lines.lock(), vec!["→ add(a=1, b=2)"]);
    }

    #[test]
    fn test_after_with_time() {
        let (lines, plugin) = capture();
        plugin.core().configure("print,enabled,before:off,after,time").unwrap();
        router(plugin).call("add", Args::new().arg(1).arg(2)).wait().unwrap();
        let lines = lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("← add ("));
        assert!(lines[0].ends_with("s)"));
    }

    #[test]
    fn test_error_line() {
        let (lines, plugin) = capture();
        plugin.core().configure("print,enabled,before:off,after").unwrap();
        let err = router(plugin).call("boom", Args::new()).wait().unwrap_err();
        assert_eq!(err.to_string(), "kaput");
        assert_eq!(*lines.lock(), vec!["✗ boom: kaput"]);
    }

    #[test]
    fn test_method_override_off() {
        let (lines, plugin) = capture();
        plugin.core().configure("print,enabled").unwrap();
        plugin.core().configure_method("add", "enabled:off").unwrap();
        let r = router(plugin);
        r.call("add", Args::new().arg(1).arg(2)).wait().unwrap();
        let _ = r.call("boom", Args::new()).wait();
        assert_eq!(*lines.lock(), vec!["→ boom()"]);
    }

    #[test]
    fn test_call_site_override() {
        let (lines, plugin) = capture();
        plugin.core().configure("print").unwrap();
        let r = router(plugin);
        r.get("add")
            .unwrap()
            .configure("logging", "enabled")
            .unwrap()
            .call(Args::new().arg(1).arg(2))
            .wait()
            .unwrap();
        assert_eq!(lines.lock().len(), 1);
    }

    #[test]
    fn test_render_args() {
        let args = Args::new().arg("x").kw("n", 2);
        assert_eq!(render_args(&args), "\"x\", n=2");
    }
}
