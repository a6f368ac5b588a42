//! Table managers: article types, articles and purchases.
//!
//! Each manager is a handler bound to its own router and plugged with
//! `validate`, `dbop`, `logging` and `publish`. Method bodies take the
//! injected [`DbCursor`] and never commit themselves; `autocommit` decides.
//! Removals are scoped `internal`, so they reach the CLI but not HTTP.
//!
//! The `add_*` helpers hold the business rules and are shared with
//! [`populate`](crate::shop::populate).

use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_router::{Call, Handler, MethodSpec, Param, Router, RouterError, TransactionalResource};

use crate::db::{DbCursor, MemoryDb, Row};
use crate::error::ShopError;

pub const TYPES: &str = "article_types";
pub const ARTICLES: &str = "articles";
pub const PURCHASES: &str = "purchases";

fn fields(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn id_of(row: &Row) -> u64 {
    row.get("id").and_then(Value::as_u64).unwrap_or_default()
}

pub(crate) fn autocommit(default: bool) -> Param {
    Param::boolean("autocommit")
        .default(default)
        .describe("Commit when the call succeeds")
}

fn created(entity: &str, key: &str, row: &Row) -> Value {
    let id = id_of(row);
    json!({
        "id": id,
        "message": format!("{} '{}' created with id {}", entity, key, id),
    })
}

pub fn add_type(cursor: &DbCursor, name: &str, description: &str) -> Result<Row, ShopError> {
    if let Some(existing) = cursor.find_by(TYPES, "name", &json!(name)) {
        return Err(ShopError::Duplicate {
            entity: "article type",
            key: name.to_string(),
            id: id_of(&existing),
        });
    }
    Ok(cursor.insert(TYPES, fields(json!({"name": name, "description": description}))))
}

pub fn add_article(
    cursor: &DbCursor,
    article_type_id: u64,
    code: &str,
    description: &str,
    price: f64,
) -> Result<Row, ShopError> {
    if cursor.find(TYPES, article_type_id).is_none() {
        return Err(ShopError::NotFound {
            entity: "article type",
            id: article_type_id,
        });
    }
    if let Some(existing) = cursor.find_by(ARTICLES, "code", &json!(code)) {
        return Err(ShopError::Duplicate {
            entity: "article",
            key: code.to_string(),
            id: id_of(&existing),
        });
    }
    Ok(cursor.insert(
        ARTICLES,
        fields(json!({
            "article_type_id": article_type_id,
            "code": code,
            "description": description,
            "price": price,
        })),
    ))
}

pub fn add_purchase(cursor: &DbCursor, article_id: u64, quantity: u64) -> Result<Row, ShopError> {
    let article = cursor.find(ARTICLES, article_id).ok_or(ShopError::NotFound {
        entity: "article",
        id: article_id,
    })?;
    let price = article.get("price").and_then(Value::as_f64).unwrap_or_default();
    let amount = (price * quantity as f64 * 100.0).round() / 100.0;
    Ok(cursor.insert(
        PURCHASES,
        fields(json!({"article_id": article_id, "quantity": quantity, "amount": amount})),
    ))
}

fn get_row(cursor: &DbCursor, table: &str, entity: &'static str, id: u64) -> Result<Row, ShopError> {
    cursor.find(table, id).ok_or(ShopError::NotFound { entity, id })
}

/// Deletes `id` unless rows in `dependents` still point at it.
fn remove_row(
    cursor: &DbCursor,
    table: &str,
    entity: &'static str,
    id: u64,
    dependents: (&str, &str, &'static str),
) -> Result<Value, ShopError> {
    let (dep_table, dep_field, dep_label) = dependents;
    if cursor.find(table, id).is_none() {
        return Err(ShopError::NotFound { entity, id });
    }
    let count = cursor.count_where(dep_table, dep_field, &json!(id));
    if count > 0 {
        return Err(ShopError::InUse {
            entity,
            id,
            count,
            dependents: dep_label,
        });
    }
    cursor.delete(table, id);
    Ok(json!({"id": id, "message": format!("{} {} removed", entity, id)}))
}

macro_rules! transactional_handler {
    ($name:ident) => {
        pub struct $name {
            db: MemoryDb,
        }

        impl Handler for $name {
            fn resource(&self) -> Option<&dyn TransactionalResource> {
                Some(&self.db)
            }
        }
    };
}

transactional_handler!(ArticleTypes);
transactional_handler!(Articles);
transactional_handler!(Purchases);

impl ArticleTypes {
    pub fn router(db: &MemoryDb) -> Result<Arc<Router>, RouterError> {
        Router::bind("types", Arc::new(Self { db: db.clone() }))
            .doc("Article types: categories for articles.")
            .plug_named("validate", "")
            .plug_named("dbop", "")
            .plug_named("logging", "enabled,after")
            .plug_named("publish", "")
            .method(
                MethodSpec::new("add")
                    .doc("Add an article type.")
                    .param(Param::string("name").min_length(1))
                    .param(Param::string("description").default(""))
                    .param(autocommit(false)),
                |_: &Self, call: &mut Call| {
                    let name: String = call.arg("name")?;
                    let row = add_type(call.cursor::<DbCursor>()?, &name, &call.arg::<String>("description")?)?;
                    Ok::<_, anyhow::Error>(created("Article type", &name, &row))
                },
            )
            .method(
                MethodSpec::new("remove")
                    .doc("Remove an article type with no articles.")
                    .param(Param::integer("id"))
                    .param(autocommit(false))
                    .meta("scopes", "internal"),
                |_: &Self, call: &mut Call| {
                    let id: u64 = call.arg("id")?;
                    remove_row(
                        call.cursor::<DbCursor>()?,
                        TYPES,
                        "article type",
                        id,
                        (ARTICLES, "article_type_id", "articles"),
                    )
                    .map_err(anyhow::Error::from)
                },
            )
            .method(
                MethodSpec::new("list").doc("List article types."),
                |_: &Self, call: &mut Call| {
                    let rows = call.cursor::<DbCursor>()?.select(TYPES);
                    Ok::<_, anyhow::Error>(json!({"total": rows.len(), "types": rows}))
                },
            )
            .method(
                MethodSpec::new("get")
                    .doc("Get one article type.")
                    .param(Param::integer("id")),
                |_: &Self, call: &mut Call| {
                    get_row(call.cursor::<DbCursor>()?, TYPES, "article type", call.arg("id")?)
                        .map_err(anyhow::Error::from)
                },
            )
            .build()
    }
}

impl Articles {
    pub fn router(db: &MemoryDb) -> Result<Arc<Router>, RouterError> {
        Router::bind("articles", Arc::new(Self { db: db.clone() }))
            .doc("Articles: coded, priced products.")
            .plug_named("validate", "")
            .plug_named("dbop", "")
            .plug_named("logging", "enabled,after")
            .plug_named("publish", "")
            .method(
                MethodSpec::new("add")
                    .doc("Add an article.")
                    .param(Param::integer("article_type_id"))
                    .param(Param::string("code").min_length(1))
                    .param(Param::string("description"))
                    .param(
                        Param::number("price")
                            .gt(0.0)
                            .describe("Price must be greater than zero"),
                    )
                    .param(autocommit(false)),
                |_: &Self, call: &mut Call| {
                    let code: String = call.arg("code")?;
                    let row = add_article(
                        call.cursor::<DbCursor>()?,
                        call.arg("article_type_id")?,
                        &code,
                        &call.arg::<String>("description")?,
                        call.arg("price")?,
                    )?;
                    Ok::<_, anyhow::Error>(created("Article", &code, &row))
                },
            )
            .method(
                MethodSpec::new("remove")
                    .doc("Remove an article with no purchases.")
                    .param(Param::integer("id"))
                    .param(autocommit(true))
                    .meta("scopes", "internal"),
                |_: &Self, call: &mut Call| {
                    let id: u64 = call.arg("id")?;
                    remove_row(
                        call.cursor::<DbCursor>()?,
                        ARTICLES,
                        "article",
                        id,
                        (PURCHASES, "article_id", "purchases"),
                    )
                    .map_err(anyhow::Error::from)
                },
            )
            .method(
                MethodSpec::new("list")
                    .doc("List articles, optionally of one type.")
                    .param(Param::integer("article_type_id").optional()),
                |_: &Self, call: &mut Call| {
                    let cursor: &DbCursor = call.cursor::<DbCursor>()?;
                    let type_id: Option<u64> = call.opt_arg("article_type_id")?;
                    let types = cursor.select(TYPES);
                    let articles: Vec<Row> = cursor
                        .select(ARTICLES)
                        .into_iter()
                        .filter(|a| type_id.is_none_or(|t| a.get("article_type_id") == Some(&json!(t))))
                        .map(|mut article| {
                            let type_name = types
                                .iter()
                                .find(|t| t.get("id") == article.get("article_type_id"))
                                .and_then(|t| t.get("name").cloned())
                                .unwrap_or(Value::Null);
                            article.insert("type".into(), type_name);
                            article
                        })
                        .collect();
                    Ok::<_, anyhow::Error>(json!({"total": articles.len(), "articles": articles}))
                },
            )
            .method(
                MethodSpec::new("get")
                    .doc("Get one article.")
                    .param(Param::integer("id")),
                |_: &Self, call: &mut Call| {
                    get_row(call.cursor::<DbCursor>()?, ARTICLES, "article", call.arg("id")?)
                        .map_err(anyhow::Error::from)
                },
            )
            .build()
    }
}

impl Purchases {
    pub fn router(db: &MemoryDb) -> Result<Arc<Router>, RouterError> {
        Router::bind("purchases", Arc::new(Self { db: db.clone() }))
            .doc("Purchases of articles.")
            .plug_named("validate", "")
            .plug_named("dbop", "")
            .plug_named("logging", "enabled,after")
            .plug_named("publish", "")
            .method(
                MethodSpec::new("add")
                    .doc("Record a purchase.")
                    .param(Param::integer("article_id"))
                    .param(Param::integer("quantity").gt(0.0))
                    .param(autocommit(false)),
                |_: &Self, call: &mut Call| {
                    let row = add_purchase(call.cursor::<DbCursor>()?, call.arg("article_id")?, call.arg("quantity")?)?;
                    Ok::<_, anyhow::Error>(json!({"id": id_of(&row), "amount": row["amount"]}))
                },
            )
            .method(
                MethodSpec::new("list")
                    .doc("List purchases, optionally of one article.")
                    .param(Param::integer("article_id").optional()),
                |_: &Self, call: &mut Call| {
                    let article_id: Option<u64> = call.opt_arg("article_id")?;
                    let purchases: Vec<Row> = call
                        .cursor::<DbCursor>()?
                        .select(PURCHASES)
                        .into_iter()
                        .filter(|p| article_id.is_none_or(|a| p.get("article_id") == Some(&json!(a))))
                        .collect();
                    Ok::<_, anyhow::Error>(json!({"total": purchases.len(), "purchases": purchases}))
                },
            )
            .method(
                MethodSpec::new("statistics").doc("Units and revenue per article."),
                |_: &Self, call: &mut Call| {
                    let mut totals: indexmap::IndexMap<String, (u64, f64)> = indexmap::IndexMap::new();
                    for purchase in call.cursor::<DbCursor>()?.select(PURCHASES) {
                        let article = purchase.get("article_id").map(Value::to_string).unwrap_or_default();
                        let entry = totals.entry(article).or_default();
                        entry.0 += purchase.get("quantity").and_then(Value::as_u64).unwrap_or_default();
                        entry.1 += purchase.get("amount").and_then(Value::as_f64).unwrap_or_default();
                    }
                    let by_article: serde_json::Map<String, Value> = totals
                        .into_iter()
                        .map(|(id, (units, revenue))| {
                            (id, json!({"units": units, "revenue": (revenue * 100.0).round() / 100.0}))
                        })
                        .collect();
                    Ok::<_, anyhow::Error>(json!({"articles": by_article.len(), "by_article": by_article}))
                },
            )
            .build()
    }
}
