//! Output formatting at the transport edge.
//!
//! Method bodies return structured values; this module is the only place
//! that turns them, and router schemas, into text.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_router::{MethodSchema, Param, RouterSchema};

/// How call results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    /// Renders a call result. `null` renders as nothing.
    pub fn render(&self, value: &Value) -> anyhow::Result<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        let text = match self {
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
        };
        Ok(text.trim_end().to_string())
    }
}

/// `Error: message` with an optional `Available: ...` line.
pub fn format_error(message: &str, available: &[String]) -> String {
    let mut out = format!("Error: {}", message);
    if !available.is_empty() {
        out.push_str("\nAvailable: ");
        out.push_str(&available.join(", "));
    }
    out
}

/// `<name:type>` for required parameters, `[name:type=default]` otherwise.
pub fn param_signature(param: &Param) -> String {
    if param.required {
        format!("<{}:{}>", param.name, param.kind.as_str())
    } else {
        format!(
            "[{}:{}={}]",
            param.name,
            param.kind.as_str(),
            render_default(param.default.as_ref())
        )
    }
}

fn render_default(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "none".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn signature(method: &MethodSchema) -> String {
    method
        .params
        .iter()
        .map(param_signature)
        .collect::<Vec<_>>()
        .join(" ")
}

fn row(cells: &[(&str, usize)], last: &str) -> String {
    let mut line = String::from(" ");
    for (text, width) in cells {
        line.push(' ');
        line.push_str(&format!("{:<width$}", text, width = *width));
    }
    line.push(' ');
    line.push_str(last);
    line.trim_end().to_string()
}

/// Help text for a router: its methods, then its children.
pub fn format_help(schema: &RouterSchema) -> String {
    let mut lines = Vec::new();
    if schema.description.is_empty() {
        lines.push(schema.name.clone());
    } else {
        lines.push(format!("{} - {}", schema.name, schema.description));
    }

    if !schema.methods.is_empty() {
        lines.push(String::new());
        lines.push("Available commands:".to_string());
        let mut methods: Vec<&MethodSchema> = schema.methods.values().collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        for method in methods {
            let params = signature(method);
            lines.push(row(&[(method.name.as_str(), 20), (params.as_str(), 30)], &method.description));
        }
    }

    if !schema.children.is_empty() {
        lines.push(String::new());
        lines.push("Available handlers:".to_string());
        for (name, child) in &schema.children {
            lines.push(row(&[(name.as_str(), 20)], &child.description));
        }
    }
    lines.join("\n")
}

/// Help text for one method, addressed by its command path.
pub fn format_method_help(command: &str, method: &MethodSchema) -> String {
    let mut lines = vec![format!("Usage: {} {}", command, signature(method))
        .trim_end()
        .to_string()];
    let doc = method.doc.trim();
    if !doc.is_empty() {
        lines.push(String::new());
        lines.extend(doc.lines().map(|l| l.trim_end().to_string()));
    }
    if !method.params.is_empty() {
        lines.push(String::new());
        lines.push("Parameters:".to_string());
        for param in &method.params {
            let flag = format!("--{}", param.name);
            let requirement = if param.required {
                "required".to_string()
            } else {
                format!("default={}", render_default(param.default.as_ref()))
            };
            let mut detail = requirement;
            if let Some(choices) = &param.choices {
                detail.push_str(&format!(" one of: {}", choices.join(", ")));
            }
            if let Some(text) = &param.description {
                detail.push_str(&format!(" {}", text));
            }
            lines.push(row(&[(flag.as_str(), 18), (param.kind.as_str(), 8)], &detail));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::{json, Map};

    fn add_schema() -> MethodSchema {
        MethodSchema {
            name: "add".into(),
            description: "Add an article.".into(),
            doc: "Add an article.\n\nPrices are in euro.".into(),
            params: vec![
                Param::string("name"),
                Param::number("price").gt(0.0),
                Param::boolean("autocommit").default(false),
            ],
            extra: Map::new(),
        }
    }

    #[test]
    fn test_render_json_and_yaml() {
        let value = json!({"id": 1});
        assert_eq!(OutputFormat::Json.render(&value).unwrap(), "{\n  \"id\": 1\n}");
        assert_eq!(OutputFormat::Yaml.render(&value).unwrap(), "id: 1");
        assert_eq!(OutputFormat::Json.render(&Value::Null).unwrap(), "");
    }

    #[test]
    fn test_format_error() {
        assert_eq!(format_error("boom", &[]), "Error: boom");
        assert_eq!(
            format_error("Handler 'shop' not found", &["crm".into(), "hr".into()]),
            "Error: Handler 'shop' not found\nAvailable: crm, hr"
        );
    }

    #[test]
    fn test_param_signature() {
        let schema = add_schema();
        assert_eq!(param_signature(&schema.params[0]), "<name:string>");
        assert_eq!(param_signature(&schema.params[2]), "[autocommit:boolean=false]");
    }

    #[test]
    fn test_format_help_lists_methods_and_children() {
        let mut methods = IndexMap::new();
        methods.insert("add".to_string(), add_schema());
        let mut children = IndexMap::new();
        children.insert(
            "db".to_string(),
            RouterSchema {
                name: "db".into(),
                description: "Database access.".into(),
                methods: IndexMap::new(),
                children: IndexMap::new(),
            },
        );
        let schema = RouterSchema {
            name: "shop".into(),
            description: "A small shop.".into(),
            methods,
            children,
        };
        let help = format_help(&schema);
        let lines: Vec<&str> = help.lines().collect();
        assert_eq!(lines[0], "shop - A small shop.");
        assert_eq!(lines[2], "Available commands:");
        assert!(lines[3].starts_with("  add "));
        assert!(lines[3].contains("<name:string> <price:number> [autocommit:boolean=false]"));
        assert!(lines[3].ends_with("Add an article."));
        assert_eq!(lines[5], "Available handlers:");
        assert!(lines[6].starts_with("  db "));
        assert!(lines[6].ends_with("Database access."));
    }

    #[test]
    fn test_format_method_help() {
        let help = format_method_help("shop add", &add_schema());
        assert!(help.starts_with(
            "Usage: shop add <name:string> <price:number> [autocommit:boolean=false]"
        ));
        assert!(help.contains("Prices are in euro."));
        assert!(help.contains("--price"));
        assert!(help.contains("default=false"));
    }
}
