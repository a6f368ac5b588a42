//! The transactional shop app (`shop`).
//!
//! ```text
//! shop
//!   ├─ populate / commit / rollback / status
//!   ├─ types      add, remove, list, get
//!   ├─ articles   add, remove, list, get
//!   └─ purchases  add, list, statistics
//! ```
//!
//! All four routers share one [`MemoryDb`], so several calls made with
//! `autocommit=false` form one transaction that `commit` applies.

use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_router::{Args, Call, Handler, MethodSpec, Router, TransactionalResource};

use crate::db::{DbCursor, MemoryDb};
use crate::error::ShopError;
use crate::tables::{self, ArticleTypes, Articles, Purchases, ARTICLES, PURCHASES, TYPES};

const SAMPLE_TYPES: [(&str, &str); 4] = [
    ("electronics", "Electronic devices and gadgets"),
    ("clothing", "Apparel and accessories"),
    ("books", "Books and publications"),
    ("home", "Home and kitchen items"),
];

/// Five articles per sample type, in type order.
const SAMPLE_ARTICLES: [(&str, &str, f64); 20] = [
    ("LAPTOP001", "MacBook Pro 16\"", 2499.00),
    ("PHONE001", "iPhone 15 Pro", 1199.00),
    ("TABLET001", "iPad Air", 599.00),
    ("MOUSE001", "Wireless Mouse", 29.99),
    ("KEYB001", "Mechanical Keyboard", 149.00),
    ("SHIRT001", "Cotton T-Shirt", 19.99),
    ("JEANS001", "Denim Jeans", 59.99),
    ("JACKET001", "Winter Jacket", 129.00),
    ("SHOES001", "Running Shoes", 89.99),
    ("HAT001", "Baseball Cap", 24.99),
    ("BOOK001", "Rust Programming", 49.99),
    ("BOOK002", "Data Science Handbook", 39.99),
    ("BOOK003", "Machine Learning Basics", 44.99),
    ("BOOK004", "Web Development Guide", 34.99),
    ("BOOK005", "Database Design", 42.99),
    ("COFFEE001", "Coffee Maker", 79.99),
    ("BLENDER001", "High-Speed Blender", 99.99),
    ("LAMP001", "LED Desk Lamp", 45.00),
    ("CHAIR001", "Office Chair", 249.00),
    ("DESK001", "Standing Desk", 399.00),
];

const SAMPLE_PURCHASES: u64 = 120;

pub struct Shop {
    db: MemoryDb,
}

impl Handler for Shop {
    fn resource(&self) -> Option<&dyn TransactionalResource> {
        Some(&self.db)
    }
}

/// Writes the sample data set through `cursor`.
///
/// Purchases cycle through the articles with quantities 1 to 10, so the
/// data set is the same on every run.
pub fn populate(cursor: &DbCursor) -> Result<Value, ShopError> {
    let mut type_ids = Vec::with_capacity(SAMPLE_TYPES.len());
    for (name, description) in SAMPLE_TYPES {
        let row = tables::add_type(cursor, name, description)?;
        type_ids.push(row["id"].as_u64().unwrap_or_default());
    }

    let mut article_ids = Vec::with_capacity(SAMPLE_ARTICLES.len());
    for (i, (code, description, price)) in SAMPLE_ARTICLES.into_iter().enumerate() {
        let row = tables::add_article(cursor, type_ids[i / 5], code, description, price)?;
        article_ids.push(row["id"].as_u64().unwrap_or_default());
    }

    for n in 0..SAMPLE_PURCHASES {
        let article = article_ids[(n as usize * 7) % article_ids.len()];
        tables::add_purchase(cursor, article, n % 10 + 1)?;
    }

    Ok(json!({
        "types": type_ids.len(),
        "articles": article_ids.len(),
        "purchases": SAMPLE_PURCHASES,
    }))
}

/// Builds the `shop` app. A truthy `populate` argument loads the sample
/// data set and commits it.
pub fn build(args: &Args) -> anyhow::Result<Arc<Router>> {
    let db = MemoryDb::new();
    let router = Router::bind("shop", Arc::new(Shop { db: db.clone() }))
        .doc("Shop management: article types, articles and purchases.")
        .plug_named("validate", "")
        .plug_named("dbop", "")
        .plug_named("publish", "")
        .method(
            MethodSpec::new("populate")
                .doc("Load the sample data set.")
                .param(tables::autocommit(true))
                .meta("scopes", "internal"),
            |_: &Shop, call: &mut Call| {
                populate(call.cursor::<DbCursor>()?).map_err(anyhow::Error::from)
            },
        )
        .method(
            MethodSpec::new("commit").doc("Apply pending changes."),
            |shop: &Shop, _call: &mut Call| {
                Ok::<_, anyhow::Error>(json!({"status": "committed", "changes": shop.db.commit_changes()}))
            },
        )
        .method(
            MethodSpec::new("rollback").doc("Discard pending changes."),
            |shop: &Shop, _call: &mut Call| {
                Ok::<_, anyhow::Error>(json!({"status": "rolled back", "changes": shop.db.discard_changes()}))
            },
        )
        .method(
            MethodSpec::new("status").doc("Committed row counts and pending changes."),
            |shop: &Shop, _call: &mut Call| {
                Ok::<_, anyhow::Error>(json!({
                    "types": shop.db.rows(TYPES).len(),
                    "articles": shop.db.rows(ARTICLES).len(),
                    "purchases": shop.db.rows(PURCHASES).len(),
                    "pending": shop.db.pending(),
                }))
            },
        )
        .child(ArticleTypes::router(&db)?)
        .child(Articles::router(&db)?)
        .child(Purchases::router(&db)?)
        .build()?;

    for method in ["commit", "rollback", "status"] {
        router.disable("dbop", method)?;
    }

    if args.is_truthy("populate") {
        let counts = router.call("populate", Args::new()).wait()?;
        tracing::info!(%counts, "populated shop");
    }
    Ok(router)
}
