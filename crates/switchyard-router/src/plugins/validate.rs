//! Argument validation.
//!
//! At registration the plugin compiles the declared parameter table (minus
//! reserved injected names such as `cursor`) and stores it under the
//! `validate` metadata key, where `describe()` picks it up.
//!
//! At call time it binds positional and keyword arguments, coerces transport
//! strings (`"9.99"`, `"true"`) to the declared type, applies defaults, and
//! checks choices and constraints. Every failing field is reported at once
//! in a [`ValidationError`]; the inner chain never runs when validation
//! fails.

use futures::FutureExt;
use serde_json::{json, Map, Number, Value};
use std::sync::Arc;

use crate::call::{Args, Call, MethodFn};
use crate::entry::MethodEntry;
use crate::error::{FieldError, RouterError, ValidationError};
use crate::params::{Param, ParamType};
use crate::plugin::{Plugin, PluginContext, PluginCore};

/// Validates and coerces arguments against the declared parameter table.
pub struct ValidationPlugin {
    core: PluginCore,
    reserved: Vec<String>,
}

impl Default for ValidationPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationPlugin {
    pub fn new() -> Self {
        Self {
            core: PluginCore::new("validate", Map::new()).with_known_flags(&[]),
            reserved: vec!["cursor".to_string()],
        }
    }

    /// Replaces the reserved parameter names.
    pub fn with_reserved<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = names.into_iter().map(Into::into).collect();
        self
    }

    fn compile(&self, entry: &MethodEntry) -> Vec<Param> {
        entry
            .params
            .iter()
            .filter(|p| !self.reserved.contains(&p.name))
            .cloned()
            .collect()
    }
}

impl Plugin for ValidationPlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn on_decore(&self, _ctx: &PluginContext<'_>, entry: &mut MethodEntry) -> Result<(), RouterError> {
        let params = self.compile(entry);
        let compiled = serde_json::to_value(&params).map_err(|e| RouterError::InvalidConfig {
            plugin: self.core.name().to_string(),
            reason: e.to_string(),
        })?;
        entry
            .metadata
            .insert("validate".into(), json!({ "params": compiled }));
        Ok(())
    }

    fn wrap_handler(
        self: Arc<Self>,
        _ctx: &PluginContext<'_>,
        entry: &MethodEntry,
        next: MethodFn,
    ) -> Result<MethodFn, RouterError> {
        let params = Arc::new(self.compile(entry));
        let reserved = Arc::new(self.reserved.clone());
        Ok(Arc::new(move |mut call: Call| {
            match validate_args(&call.method, &params, &reserved, &mut call.args) {
                Ok(()) => next(call),
                Err(err) => futures::future::ready(Err(err.into())).boxed(),
            }
        }))
    }
}

/// Binds, coerces and checks `args` in place.
pub fn validate_args(
    method: &str,
    params: &[Param],
    reserved: &[String],
    args: &mut Args,
) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    let positional = std::mem::take(&mut args.positional);
    for (i, value) in positional.into_iter().enumerate() {
        match params.get(i) {
            Some(param) if args.keyword.contains_key(&param.name) => {
                errors.push(FieldError::new(&param.name, "got multiple values"));
            }
            Some(param) => {
                args.keyword.insert(param.name.clone(), value);
            }
            None => errors.push(FieldError::new(
                format!("#{}", i),
                format!("unexpected positional argument (takes {})", params.len()),
            )),
        }
    }

    for name in args.keyword.keys() {
        if !params.iter().any(|p| &p.name == name) && !reserved.contains(name) {
            errors.push(FieldError::new(name, "unexpected argument"));
        }
    }

    for param in params {
        match args.keyword.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    errors.push(FieldError::new(&param.name, "field required"));
                } else if let Some(default) = &param.default {
                    args.keyword.insert(param.name.clone(), default.clone());
                }
            }
            Some(raw) => match check_value(param, raw) {
                Ok(value) => {
                    args.keyword.insert(param.name.clone(), value);
                }
                Err(message) => errors.push(FieldError::new(&param.name, message)),
            },
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            method: method.to_string(),
            errors,
        })
    }
}

fn check_value(param: &Param, raw: &Value) -> Result<Value, String> {
    let value = coerce(param.kind, raw)?;

    if let (Some(choices), Some(s)) = (&param.choices, value.as_str()) {
        if !choices.iter().any(|c| c == s) {
            return Err(format!("must be one of: {}", choices.join(", ")));
        }
    }

    let c = &param.constraints;
    if let Some(n) = value.as_f64() {
        if let Some(b) = c.gt.filter(|b| n <= *b) {
            return Err(format!("must be greater than {}", b));
        }
        if let Some(b) = c.ge.filter(|b| n < *b) {
            return Err(format!("must be greater than or equal to {}", b));
        }
        if let Some(b) = c.lt.filter(|b| n >= *b) {
            return Err(format!("must be less than {}", b));
        }
        if let Some(b) = c.le.filter(|b| n > *b) {
            return Err(format!("must be less than or equal to {}", b));
        }
    }

    let len = match &value {
        Value::String(s) => Some((s.chars().count(), "characters")),
        Value::Array(a) => Some((a.len(), "items")),
        _ => None,
    };
    if let Some((len, unit)) = len {
        if let Some(min) = c.min_length.filter(|m| len < *m) {
            return Err(format!("must have at least {} {}", min, unit));
        }
        if let Some(max) = c.max_length.filter(|m| len > *m) {
            return Err(format!("must have at most {} {}", max, unit));
        }
    }

    Ok(value)
}

/// Converts a transport value to the declared type.
pub fn coerce(kind: ParamType, raw: &Value) -> Result<Value, String> {
    match kind {
        ParamType::Any => Ok(raw.clone()),
        ParamType::String => match raw {
            Value::String(_) => Ok(raw.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err("must be a string".into()),
        },
        ParamType::Integer => match raw {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(raw.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(json!(f as i64)),
                _ => Err("must be an integer".into()),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "must be an integer".to_string()),
            _ => Err("must be an integer".into()),
        },
        ParamType::Number => match raw {
            Value::Number(_) => Ok(raw.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "must be a number".to_string()),
            _ => Err("must be a number".into()),
        },
        ParamType::Boolean => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err("must be a boolean".into()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err("must be a boolean".into()),
            },
            _ => Err("must be a boolean".into()),
        },
        ParamType::Array => match raw {
            Value::Array(_) => Ok(raw.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Array(_)) => Ok(v),
                _ => Err("must be an array".into()),
            },
            _ => Err("must be an array".into()),
        },
        ParamType::Object => match raw {
            Value::Object(_) => Ok(raw.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Object(_)) => Ok(v),
                _ => Err("must be an object".into()),
            },
            _ => Err("must be an object".into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_params() -> Vec<Param> {
        vec![
            Param::string("name"),
            Param::number("price").gt(0.0),
            Param::boolean("autocommit").default(false),
        ]
    }

    fn run(args: Args) -> Result<Args, ValidationError> {
        let mut args = args;
        validate_args("add", &add_params(), &["cursor".to_string()], &mut args)?;
        Ok(args)
    }

    #[test]
    fn test_valid_args_get_defaults() {
        let args = run(Args::new().kw("name", "pen").kw("price", 9.99)).unwrap();
        assert_eq!(args.keyword["autocommit"], false);
        assert_eq!(args.keyword["price"], 9.99);
    }

    #[test]
    fn test_string_coercion() {
        let args = run(Args::new().arg("pen").arg("2.50").kw("autocommit", "yes")).unwrap();
        assert_eq!(args.keyword["price"], 2.5);
        assert_eq!(args.keyword["autocommit"], true);
        assert!(args.positional.is_empty());
    }

    #[test]
    fn test_all_errors_reported() {
        let err = run(Args::new().kw("price", -10).kw("colour", "red")).unwrap_err();
        let fields = err.fields();
        assert!(fields.contains(&"price"));
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"colour"));
        let price = err.errors.iter().find(|e| e.field == "price").unwrap();
        assert_eq!(price.message, "must be greater than 0");
    }

    #[test]
    fn test_surplus_positional() {
        let err = run(Args::new().arg("a").arg(1).arg(true).arg("extra")).unwrap_err();
        assert_eq!(err.fields(), vec!["#3"]);
    }

    #[test]
    fn test_reserved_names_pass_through() {
        let args = run(Args::new().kw("name", "x").kw("price", 1).kw("cursor", Value::Null)).unwrap();
        assert!(args.keyword.contains_key("cursor"));
    }

    #[test]
    fn test_choices_and_lengths() {
        let params = vec![
            Param::choice("format", ["json", "yaml"]),
            Param::string("code").min_length(2).max_length(4),
        ];
        let mut args = Args::new().kw("format", "xml").kw("code", "x");
        let err = validate_args("export", &params, &[], &mut args).unwrap_err();
        assert_eq!(err.errors[0].message, "must be one of: json, yaml");
        assert_eq!(err.errors[1].message, "must have at least 2 characters");
    }

    #[test]
    fn test_coerce_integer() {
        assert_eq!(coerce(ParamType::Integer, &json!("42")).unwrap(), json!(42));
        assert_eq!(coerce(ParamType::Integer, &json!(3.0)).unwrap(), json!(3));
        assert!(coerce(ParamType::Integer, &json!(3.5)).is_err());
        assert!(coerce(ParamType::Integer, &json!("abc")).is_err());
    }

    #[test]
    fn test_coerce_structured_from_strings() {
        assert_eq!(coerce(ParamType::Array, &json!("[1,2]")).unwrap(), json!([1, 2]));
        assert_eq!(coerce(ParamType::Object, &json!("{\"a\":1}")).unwrap(), json!({"a": 1}));
        assert!(coerce(ParamType::Array, &json!("{}")).is_err());
    }
}
