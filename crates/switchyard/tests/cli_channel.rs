use serde_json::{json, Value};
use std::sync::Arc;
use switchyard::{AppCatalog, CliChannel, OutputFormat, Publisher};
use switchyard_router::{Call, MethodSpec, Param, Router};

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

fn inventory() -> anyhow::Result<Arc<Router>> {
    let stock = Router::builder("stock")
        .doc("Stock levels.")
        .method(
            MethodSpec::new("check")
                .doc("Units on hand for an item.")
                .param(Param::string("item")),
            |_: &(), call: &mut Call| {
                let item: String = call.arg("item")?;
                Ok::<_, anyhow::Error>(json!({"item": item, "units": 3}))
            },
        )
        .build()?;
    Ok(Router::builder("inventory")
        .doc("Inventory app.")
        .plug_named("validate", "")
        .method(
            MethodSpec::new("add")
                .doc("Register an item.")
                .param(Param::string("name"))
                .param(Param::number("price").gt(0.0))
                .param(Param::boolean("fragile").default(false)),
            |_: &(), call: &mut Call| {
                Ok::<_, anyhow::Error>(json!({
                    "name": call.arg::<String>("name")?,
                    "price": call.arg::<f64>("price")?,
                    "fragile": call.arg::<bool>("fragile")?,
                }))
            },
        )
        .method("list", |_: &(), _call: &mut Call| Ok::<_, anyhow::Error>(json!([])))
        .child(stock)
        .build()?)
}

fn cli() -> CliChannel {
    let catalog = AppCatalog::new().register("inventory", |_| inventory());
    let publisher = Publisher::new("depot", catalog).unwrap();
    publisher.add_app("inventory", "inventory", Default::default()).unwrap();
    CliChannel::new(Arc::new(publisher))
}

fn stdout_json(cli: &CliChannel, tokens: &[&str]) -> Value {
    let outcome = cli.run(&argv(tokens));
    assert!(outcome.is_success(), "stderr: {}", outcome.stderr);
    serde_json::from_str(&outcome.stdout).unwrap()
}

#[test]
fn test_unknown_handler_lists_available() {
    let outcome = cli().run(&argv(&["shop", "list"]));
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(
        outcome.stderr,
        "Error: Handler 'shop' not found\nAvailable: inventory"
    );
    assert!(outcome.stdout.is_empty());
}

#[test]
fn test_unknown_method_lists_available() {
    let outcome = cli().run(&argv(&["inventory", "remove"]));
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(
        outcome.stderr,
        "Error: Method 'remove' not found\nAvailable: add, list, stock"
    );
}

#[test]
fn test_dispatch_coerces_string_tokens() {
    let out = stdout_json(&cli(), &["inventory", "add", "--name", "vase", "--price=12.5", "--fragile", "yes"]);
    assert_eq!(out, json!({"name": "vase", "price": 12.5, "fragile": true}));
}

#[test]
fn test_positionals_bind_in_order() {
    let out = stdout_json(&cli(), &["inventory", "add", "vase", "4"]);
    assert_eq!(out["price"], 4.0);
    assert_eq!(out["fragile"], false);
}

#[test]
fn test_nested_child_dispatch() {
    let out = stdout_json(&cli(), &["inventory", "stock", "check", "--item", "vase"]);
    assert_eq!(out["units"], 3);
}

#[test]
fn test_validation_failure_exits_one() {
    let outcome = cli().run(&argv(&["inventory", "add", "--name", "vase", "--price", "-10"]));
    assert_eq!(outcome.exit_code, 1);
    assert!(outcome.stderr.starts_with("Error: validation failed for 'add'"));
    assert!(outcome.stderr.contains("--price: must be greater than 0"));
}

#[test]
fn test_missing_option_value_is_an_error() {
    let outcome = cli().run(&argv(&["inventory", "add", "--name"]));
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.stderr, "Error: Missing value for option '--name'");
}

#[test]
fn test_help_variants() {
    let cli = cli();

    let general = cli.run(&argv(&[]));
    assert!(general.stdout.starts_with("depot - depot publisher."));
    assert!(general.stdout.contains("/add"));
    assert!(general.stdout.contains("Available handlers:"));

    let handler = cli.run(&argv(&["inventory"]));
    assert!(handler.stdout.starts_with("depot inventory - Inventory app."));
    assert!(handler.stdout.contains("  add "));

    let method = cli.run(&argv(&["inventory", "add", "--help"]));
    assert!(method
        .stdout
        .starts_with("Usage: depot inventory add <name:string> <price:number> [fragile:boolean=false]"));

    let root = cli.run(&argv(&["/add", "-h"]));
    assert!(root.stdout.starts_with("Usage: depot /add <name:string> <spec:string>"));
}

#[test]
fn test_help_after_separator_is_an_argument() {
    let outcome = cli().run(&argv(&["inventory", "stock", "check", "--", "--help"]));
    let out: Value = serde_json::from_str(&outcome.stdout).unwrap();
    assert_eq!(out["item"], "--help");
}

#[test]
fn test_root_commands() {
    let cli = cli();
    let listing = stdout_json(&cli, &["/list"]);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["apps"]["inventory"]["spec"], "inventory");

    let added = stdout_json(&cli, &["/add", "spare", "inventory"]);
    assert_eq!(added["status"], "added");
    assert_eq!(stdout_json(&cli, &["/list"])["total"], 2);

    let saved = stdout_json(&cli, &["/savestate"]);
    assert_eq!(saved["version"], 1);
    assert_eq!(saved["apps"].as_array().unwrap().len(), 2);

    let removed = stdout_json(&cli, &["/remove", "--name", "spare"]);
    assert_eq!(removed["status"], "removed");

    let channels = stdout_json(&cli, &["/channels"]);
    assert_eq!(channels["total"], 2);
}

#[test]
fn test_loadstate_from_cli() {
    let cli = cli();
    let state = json!({
        "version": 1,
        "apps": [{"name": "north", "spec": "inventory"}, {"name": "south", "spec": "inventory"}]
    })
    .to_string();
    let loaded = stdout_json(&cli, &["/loadstate", "--state", &state]);
    assert_eq!(loaded["apps"], json!(["north", "south"]));

    let out = stdout_json(&cli, &["south", "stock", "check", "--item", "bolt"]);
    assert_eq!(out["item"], "bolt");
}

#[test]
fn test_unknown_root_command() {
    let outcome = cli().run(&argv(&["/nope"]));
    assert_eq!(outcome.exit_code, 1);
    assert!(outcome.stderr.starts_with("Error: Unknown command '/nope'\nAvailable: /add, /remove"));
}

#[test]
fn test_getapp_reports_unknown_app() {
    let outcome = cli().run(&argv(&["/getapp", "ghost"]));
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(
        outcome.stderr,
        "Error: app 'ghost' not found (available: inventory)"
    );
}

#[test]
fn test_yaml_output() {
    let cli = cli().with_format(OutputFormat::Yaml);
    let outcome = cli.run(&argv(&["inventory", "stock", "check", "--item", "vase"]));
    assert_eq!(outcome.stdout, "item: vase\nunits: 3");
}

#[test]
fn test_completion_payloads() {
    let cli = cli();

    let missing = cli.complete(&[]);
    assert_eq!(missing, json!({"error": "missing shell identifier", "suggestions": []}));

    let top = cli.complete(&argv(&["bash", "3", "inv"]));
    assert_eq!(top["cursor"], 3);
    assert_eq!(top["current_fragment"], "inv");
    let values: Vec<&str> = top["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["inventory"]);

    let methods = cli.complete(&argv(&["zsh", "inventory", ""]));
    let kinds: Vec<(&str, &str)> = methods["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["type"].as_str().unwrap(), s["value"].as_str().unwrap()))
        .collect();
    assert_eq!(kinds, vec![("handler", "stock"), ("method", "add"), ("method", "list")]);

    let params = cli.complete(&argv(&["bash", "inventory", "add", "--name", "vase", "--p"]));
    let suggestions = params["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["value"], "--price");
    assert_eq!(suggestions[0]["required"], true);
    assert_eq!(suggestions[0]["inline_hint"], "<number>");

    let root = cli.complete(&argv(&["bash", "/"]));
    let roots = root["suggestions"].as_array().unwrap();
    assert_eq!(roots.len(), 7);
    assert!(roots.iter().all(|s| s["type"] == "root"));
}
