//! The CLI channel.
//!
//! ```text
//! <prog>                                   general help
//! <prog> <handler> [<child> ...]           handler help
//! <prog> <handler> [<child> ...] <method> [args]
//! <prog> /<command> [args]                 root command
//! <prog> --complete <shell> [cursor] tokens...
//! ```
//!
//! Arguments are `--key value`, `--key=value` or bare positionals; every
//! token after `--` is positional. `--help` or `-h` before `--` shows help
//! instead of dispatching. Values reach the router as strings and are
//! coerced by the `validate` plugin.
//!
//! [`CliChannel::run`] never prints. It returns a [`CliOutcome`] the binary
//! writes out and exits with.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use switchyard_router::{
    Args, EntryFilter, MethodSchema, RouterError, RouterSchema, ValidationError,
};

use super::Channel;
use crate::error::PublisherError;
use crate::format::{format_error, format_help, format_method_help, param_signature, OutputFormat};
use crate::publisher::Publisher;

/// What a CLI invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CliOutcome {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn error(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: 1,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Splits argument tokens into positional and keyword arguments.
pub fn split_cli_args(tokens: &[String]) -> Result<(Vec<Value>, Map<String, Value>), String> {
    let mut positional = Vec::new();
    let mut keyword = Map::new();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        if token == "--" {
            positional.extend(iter.by_ref().map(|t| Value::String(t.clone())));
            break;
        }
        let Some(option) = token.strip_prefix("--") else {
            positional.push(Value::String(token.clone()));
            continue;
        };
        let (key, value) = match option.split_once('=') {
            Some((key, value)) => (key, value.to_string()),
            None => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("Missing value for option '--{}'", option))?;
                (option, value.clone())
            }
        };
        if key.is_empty() {
            return Err("Option name cannot be empty".to_string());
        }
        keyword.insert(key.to_string(), Value::String(value));
    }
    Ok((positional, keyword))
}

fn wants_help(tokens: &[String]) -> bool {
    tokens
        .iter()
        .take_while(|t| t.as_str() != "--")
        .any(|t| t == "--help" || t == "-h")
}

fn without_help(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut passthrough = false;
    for token in tokens {
        if token == "--" {
            passthrough = true;
        }
        if passthrough || (token != "--help" && token != "-h") {
            out.push(token.clone());
        }
    }
    out
}

fn matches_fragment(name: &str, fragment: &str) -> bool {
    fragment.is_empty() || name.to_lowercase().starts_with(&fragment.to_lowercase())
}

/// Renders errors from a dispatched call.
fn describe_failure(err: &anyhow::Error) -> String {
    if let Some(err) = err.downcast_ref::<RouterError>() {
        return format_error(&err.to_string(), &[]);
    }
    if let Some(err) = err.downcast_ref::<PublisherError>() {
        return format_error(&err.to_string(), &[]);
    }
    if let Some(err) = err.downcast_ref::<ValidationError>() {
        let mut out = format_error(&err.to_string(), &[]);
        for field in &err.errors {
            out.push_str(&format!("\n  --{}: {}", field.field, field.message));
        }
        return out;
    }
    format_error(&format!("{:#}", err), &[])
}

/// Dispatches argv to a [`Publisher`].
#[derive(Debug, Clone)]
pub struct CliChannel {
    publisher: Arc<Publisher>,
    format: OutputFormat,
    prog: String,
}

impl Channel for CliChannel {
    const NAME: &'static str = "cli";
    const CODE: &'static str = "CLI";
    const DESCRIPTION: &'static str = "Command-line dispatch of handler methods and root commands";
}

impl CliChannel {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        let prog = publisher.name().to_string();
        Self {
            publisher,
            format: OutputFormat::default(),
            prog,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Program name shown in usage lines.
    pub fn with_prog(mut self, prog: impl Into<String>) -> Self {
        self.prog = prog.into();
        self
    }

    fn schema(&self) -> RouterSchema {
        self.publisher.describe(&EntryFilter::channel(Self::CODE))
    }

    /// Runs one command line (without the program name).
    pub fn run(&self, args: &[String]) -> CliOutcome {
        let Some(first) = args.first() else {
            return CliOutcome::ok(self.general_help());
        };
        if first == "--complete" {
            return CliOutcome::ok(self.complete(&args[1..]).to_string());
        }
        if first == "--help" || first == "-h" {
            return CliOutcome::ok(self.general_help());
        }
        if let Some(command) = first.strip_prefix('/') {
            return self.run_root(command, &args[1..]);
        }
        self.run_handler(args)
    }

    /// Root methods listed with their `/` prefix, followed by the handlers.
    pub fn general_help(&self) -> String {
        let mut schema = self.schema();
        schema.methods = schema
            .methods
            .into_iter()
            .map(|(name, mut method)| {
                method.name = format!("/{}", name);
                (method.name.clone(), method)
            })
            .collect();
        schema.name = self.prog.clone();
        format_help(&schema)
    }

    fn run_root(&self, command: &str, tokens: &[String]) -> CliOutcome {
        let schema = self.schema();
        let Some(method) = schema.method(command) else {
            let available: Vec<String> = schema.methods.keys().map(|m| format!("/{}", m)).collect();
            return CliOutcome::error(format_error(&format!("Unknown command '/{}'", command), &available));
        };
        if wants_help(tokens) {
            let usage = format!("{} /{}", self.prog, command);
            return CliOutcome::ok(format_method_help(&usage, method));
        }
        self.invoke(command, tokens)
    }

    fn run_handler(&self, args: &[String]) -> CliOutcome {
        let schema = self.schema();
        let help = wants_help(args);
        let tokens = without_help(args);

        let handler = &tokens[0];
        let Some(mut node) = schema.children.get(handler) else {
            let available: Vec<String> = schema.children.keys().cloned().collect();
            return CliOutcome::error(format_error(&format!("Handler '{}' not found", handler), &available));
        };
        let mut path = vec![handler.clone()];
        let mut rest = &tokens[1..];
        while let Some(next) = rest.first() {
            match node.children.get(next) {
                Some(child) => {
                    node = child;
                    path.push(next.clone());
                    rest = &rest[1..];
                }
                None => break,
            }
        }

        let method_name = match rest.first() {
            Some(token) if !token.starts_with('-') => token,
            _ => return CliOutcome::ok(self.node_help(node, &path)),
        };
        let Some(method) = node.method(method_name) else {
            let mut available: Vec<String> = node.methods.keys().cloned().collect();
            available.extend(node.children.keys().cloned());
            return CliOutcome::error(format_error(&format!("Method '{}' not found", method_name), &available));
        };
        if help {
            let usage = format!("{} {} {}", self.prog, path.join(" "), method.name);
            return CliOutcome::ok(format_method_help(&usage, method));
        }

        path.push(method_name.clone());
        self.invoke(&path.join("."), &rest[1..])
    }

    fn node_help(&self, node: &RouterSchema, path: &[String]) -> String {
        let mut node = node.clone();
        node.name = format!("{} {}", self.prog, path.join(" "));
        format_help(&node)
    }

    fn invoke(&self, path: &str, tokens: &[String]) -> CliOutcome {
        let (positional, keyword) = match split_cli_args(tokens) {
            Ok(split) => split,
            Err(message) => return CliOutcome::error(format_error(&message, &[])),
        };
        tracing::debug!(%path, "cli dispatch");
        let result = self
            .publisher
            .call(path, Args { positional, keyword })
            .wait();
        match result {
            Ok(value) => match self.format.render(&value) {
                Ok(text) => CliOutcome::ok(text),
                Err(err) => CliOutcome::error(format_error(&err.to_string(), &[])),
            },
            Err(err) => CliOutcome::error(describe_failure(&err)),
        }
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Completion payload for `--complete <shell> [cursor] tokens...`.
    pub fn complete(&self, args: &[String]) -> Value {
        let Some(shell) = args.first() else {
            return json!({"error": "missing shell identifier", "suggestions": []});
        };
        let mut rest = &args[1..];
        let mut cursor = None;
        if let Some(position) = rest.first().and_then(|t| t.parse::<u64>().ok()) {
            cursor = Some(position);
            rest = &rest[1..];
        }

        let (completed, fragment) = match rest.split_last() {
            None => (&rest[..0], ""),
            Some((last, head)) => (head, last.as_str()),
        };
        json!({
            "shell": shell,
            "cursor": cursor,
            "current_fragment": fragment,
            "completed_tokens": completed,
            "suggestions": self.suggest(completed, fragment),
        })
    }

    fn suggest(&self, completed: &[String], fragment: &str) -> Vec<Value> {
        let schema = self.schema();
        let Some((first, rest)) = completed.split_first() else {
            let mut out: Vec<Value> = schema
                .children
                .iter()
                .filter(|(name, _)| matches_fragment(name, fragment))
                .map(|(name, child)| suggestion("handler", name, &child.description, ""))
                .collect();
            out.extend(
                schema
                    .methods
                    .values()
                    .map(|m| (format!("/{}", m.name), m))
                    .filter(|(name, _)| matches_fragment(name, fragment))
                    .map(|(name, m)| suggestion("root", &name, &m.description, "")),
            );
            return out;
        };

        if let Some(command) = first.strip_prefix('/') {
            return match schema.method(command) {
                Some(method) => parameter_suggestions(method, rest, fragment),
                None => Vec::new(),
            };
        }

        let Some(mut node) = schema.children.get(first) else {
            return Vec::new();
        };
        for (i, token) in rest.iter().enumerate() {
            if let Some(child) = node.children.get(token) {
                node = child;
                continue;
            }
            return match node.method(token) {
                Some(method) => parameter_suggestions(method, &rest[i + 1..], fragment),
                None => Vec::new(),
            };
        }

        let mut out: Vec<Value> = node
            .children
            .iter()
            .filter(|(name, _)| matches_fragment(name, fragment))
            .map(|(name, child)| suggestion("handler", name, &child.description, ""))
            .collect();
        out.extend(
            node.methods
                .values()
                .filter(|m| matches_fragment(&m.name, fragment))
                .map(|m| {
                    let hint = m
                        .params
                        .iter()
                        .map(param_signature)
                        .collect::<Vec<_>>()
                        .join(" ");
                    suggestion("method", &m.name, &m.description, &hint)
                }),
        );
        out
    }
}

fn suggestion(kind: &str, value: &str, description: &str, hint: &str) -> Value {
    json!({
        "type": kind,
        "value": value,
        "display": value,
        "description": description,
        "inline_hint": hint,
    })
}

/// `--name` suggestions for parameters not already given.
fn parameter_suggestions(method: &MethodSchema, given: &[String], fragment: &str) -> Vec<Value> {
    let fragment = fragment.trim_start_matches('-');
    method
        .params
        .iter()
        .filter(|p| {
            let flag = format!("--{}", p.name);
            !given
                .iter()
                .any(|t| *t == flag || t.starts_with(&format!("{}=", flag)))
        })
        .filter(|p| matches_fragment(&p.name, fragment))
        .map(|p| {
            let flag = format!("--{}", p.name);
            let description = p.description.clone().unwrap_or_else(|| {
                if p.required {
                    "required parameter".to_string()
                } else {
                    "optional parameter".to_string()
                }
            });
            let mut out = suggestion("parameter", &flag, &description, &format!("<{}>", p.kind));
            out["required"] = json!(p.required);
            out
        })
        .collect()
}
