//! Declared parameter tables.
//!
//! Every method declares its parameters up front with [`Param`] builders
//! collected in a [`MethodSpec`]. The table is cached on the
//! [`MethodEntry`](crate::MethodEntry) and read by validation, introspection
//! and the channel adapters.
//!
//! ```rust
//! use switchyard_router::{MethodSpec, Param};
//!
//! let spec = MethodSpec::new("add")
//!     .doc("Add an article.")
//!     .param(Param::string("name"))
//!     .param(Param::number("price").gt(0.0).describe("Unit price"))
//!     .param(Param::boolean("autocommit").default(false));
//! assert_eq!(spec.params.len(), 3);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The transport type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric range and string length bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
}

impl Param {
    /// A required parameter of the given type.
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: None,
            choices: None,
            constraints: Constraints::default(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Array)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Object)
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Any)
    }

    /// A string restricted to a closed set of values.
    pub fn choice<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut param = Self::string(name);
        param.choices = Some(choices.into_iter().map(Into::into).collect());
        param
    }

    /// Makes the parameter optional with a default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    /// Makes the parameter optional, defaulting to null.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self.default = Some(Value::Null);
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn gt(mut self, bound: f64) -> Self {
        self.constraints.gt = Some(bound);
        self
    }

    pub fn ge(mut self, bound: f64) -> Self {
        self.constraints.ge = Some(bound);
        self
    }

    pub fn lt(mut self, bound: f64) -> Self {
        self.constraints.lt = Some(bound);
        self
    }

    pub fn le(mut self, bound: f64) -> Self {
        self.constraints.le = Some(bound);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.constraints.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.constraints.max_length = Some(len);
        self
    }
}

/// Everything needed to register one method except its body.
#[derive(Debug, Clone, Default)]
pub struct MethodSpec {
    pub name: String,
    pub doc: String,
    pub params: Vec<Param>,
    pub metadata: Map<String, Value>,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Seeds an entry metadata key. Plugins read these in `on_decore`
    /// (the publish plugin reads `scopes` and `scope_channels`).
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for MethodSpec {
    fn from(name: &str) -> Self {
        MethodSpec::new(name)
    }
}
