//! The nested shop app (`shop:Hierarchical`).
//!
//! ```text
//! shop
//!   ├─ db
//!   │   ├─ query(sql)
//!   │   └─ tables
//!   │       ├─ product   list, get(id), create(name, price)
//!   │       └─ customer  list, get(id)
//!   └─ inventory
//!       └─ check(product_id)
//! ```
//!
//! Every level is its own router; `shop.db.tables.product.list` resolves
//! one segment at a time.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_router::{Args, Call, Handler, MethodSpec, Param, Router, RouterError};

use crate::error::ShopError;

pub struct ProductTable {
    rows: Mutex<Vec<Value>>,
}

impl Handler for ProductTable {}

impl Default for ProductTable {
    fn default() -> Self {
        Self {
            rows: Mutex::new(vec![
                json!({"id": 1, "name": "Laptop Pro", "price": 1299.99, "stock": 5}),
                json!({"id": 2, "name": "Wireless Mouse", "price": 29.99, "stock": 50}),
                json!({"id": 3, "name": "USB-C Cable", "price": 12.99, "stock": 100}),
            ]),
        }
    }
}

pub struct CustomerTable {
    rows: Vec<Value>,
}

impl Handler for CustomerTable {}

impl Default for CustomerTable {
    fn default() -> Self {
        Self {
            rows: vec![
                json!({"id": 1, "name": "John Doe", "email": "john@example.com"}),
                json!({"id": 2, "name": "Jane Smith", "email": "jane@example.com"}),
            ],
        }
    }
}

pub struct Inventory {
    stock: IndexMap<u64, u64>,
}

impl Handler for Inventory {}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            stock: IndexMap::from([(1, 5), (2, 50), (3, 100)]),
        }
    }
}

fn find(rows: &[Value], entity: &'static str, id: u64) -> Result<Value, ShopError> {
    rows.iter()
        .find(|row| row["id"] == id)
        .cloned()
        .ok_or(ShopError::NotFound { entity, id })
}

fn product_router() -> Result<Arc<Router>, RouterError> {
    Router::bind("product", Arc::new(ProductTable::default()))
        .doc("Product table.")
        .plug_named("validate", "")
        .method(
            MethodSpec::new("list").doc("List all products."),
            |table: &ProductTable, _call: &mut Call| {
                let rows = table.rows.lock().clone();
                Ok::<_, anyhow::Error>(json!({"table": "product", "count": rows.len(), "rows": rows}))
            },
        )
        .method(
            MethodSpec::new("get")
                .doc("Get a product by id.")
                .param(Param::integer("id")),
            |table: &ProductTable, call: &mut Call| {
                let row = find(&table.rows.lock(), "product", call.arg("id")?)?;
                Ok::<_, anyhow::Error>(json!({"table": "product", "row": row}))
            },
        )
        .method(
            MethodSpec::new("create")
                .doc("Create a product with no stock.")
                .param(Param::string("name").min_length(1))
                .param(Param::number("price").gt(0.0)),
            |table: &ProductTable, call: &mut Call| {
                let mut rows = table.rows.lock();
                let id = rows.iter().filter_map(|r| r["id"].as_u64()).max().unwrap_or(0) + 1;
                let row = json!({
                    "id": id,
                    "name": call.arg::<String>("name")?,
                    "price": call.arg::<f64>("price")?,
                    "stock": 0,
                });
                rows.push(row.clone());
                Ok::<_, anyhow::Error>(json!({"status": "created", "table": "product", "row": row}))
            },
        )
        .build()
}

fn customer_router() -> Result<Arc<Router>, RouterError> {
    Router::bind("customer", Arc::new(CustomerTable::default()))
        .doc("Customer table.")
        .plug_named("validate", "")
        .method(
            MethodSpec::new("list").doc("List all customers."),
            |table: &CustomerTable, _call: &mut Call| {
                Ok::<_, anyhow::Error>(json!({"table": "customer", "count": table.rows.len(), "rows": table.rows}))
            },
        )
        .method(
            MethodSpec::new("get")
                .doc("Get a customer by id.")
                .param(Param::integer("id")),
            |table: &CustomerTable, call: &mut Call| {
                let row = find(&table.rows, "customer", call.arg("id")?)?;
                Ok::<_, anyhow::Error>(json!({"table": "customer", "row": row}))
            },
        )
        .build()
}

fn db_router() -> Result<Arc<Router>, RouterError> {
    let tables = Router::builder("tables")
        .doc("Database tables.")
        .child(product_router()?)
        .child(customer_router()?)
        .build()?;

    Router::builder("db")
        .doc("Database operations.")
        .plug_named("validate", "")
        .method(
            MethodSpec::new("query")
                .doc("Run a raw query (demo, nothing is executed).")
                .param(Param::string("sql")),
            |_: &(), call: &mut Call| {
                Ok::<_, anyhow::Error>(json!({
                    "sql": call.arg::<String>("sql")?,
                    "result": "Query executed successfully (demo)",
                    "rows_affected": 0,
                }))
            },
        )
        .child(tables)
        .build()
}

fn inventory_router() -> Result<Arc<Router>, RouterError> {
    Router::bind("inventory", Arc::new(Inventory::default()))
        .doc("Inventory levels.")
        .plug_named("validate", "")
        .async_method(
            MethodSpec::new("check")
                .doc("Check stock for a product.")
                .param(Param::integer("product_id")),
            |inventory: Arc<Inventory>, call: Call| async move {
                let product_id: u64 = call.arg("product_id")?;
                let stock = inventory.stock.get(&product_id).copied().unwrap_or(0);
                Ok::<_, anyhow::Error>(json!({
                    "product_id": product_id,
                    "stock": stock,
                    "status": if stock > 0 { "in_stock" } else { "out_of_stock" },
                }))
            },
        )
        .build()
}

/// Builds the `shop:Hierarchical` app. Takes no arguments.
pub fn build(_args: &Args) -> anyhow::Result<Arc<Router>> {
    Ok(Router::builder("shop")
        .doc("Shop with nested handlers.")
        .child(db_router()?)
        .child(inventory_router()?)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_router::EntryFilter;

    fn shop() -> Arc<Router> {
        build(&Args::new()).unwrap()
    }

    #[test]
    fn test_deep_path_resolves() {
        let out = shop().call("db.tables.product.get", Args::new().arg(2)).wait().unwrap();
        assert_eq!(out["row"]["name"], "Wireless Mouse");
    }

    #[test]
    fn test_create_assigns_next_id() {
        let shop = shop();
        let out = shop
            .call("db.tables.product.create", Args::new().arg("Dock").arg(89.0))
            .wait()
            .unwrap();
        assert_eq!(out["row"]["id"], 4);
        let list = shop.call("db.tables.product.list", Args::new()).wait().unwrap();
        assert_eq!(list["count"], 4);
    }

    #[test]
    fn test_missing_customer() {
        let err = shop()
            .call("db.tables.customer.get", Args::new().kw("id", 9))
            .wait()
            .unwrap_err();
        assert_eq!(err.to_string(), "customer with id 9 not found");
    }

    #[test]
    fn test_describe_nests_every_level() {
        let schema = shop().describe(&EntryFilter::all());
        let paths: Vec<String> = schema.flatten().into_iter().map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec![
                "db.query",
                "db.tables.product.list",
                "db.tables.product.get",
                "db.tables.product.create",
                "db.tables.customer.list",
                "db.tables.customer.get",
                "inventory.check",
            ]
        );
    }
}
