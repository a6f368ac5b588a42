//! A worked example: a small shop published with switchyard.
//!
//! The catalog offers two apps:
//!
//! - `shop`: article types, articles and purchases over a transactional
//!   in-memory store, with `validate`, `dbop`, `logging` and `publish`
//!   plugged on every table
//! - `shop:Hierarchical`: a read-mostly demo of deep dotted paths
//!   (`shop.db.tables.product.list`)
//!
//! ```rust
//! use switchyard::Publisher;
//! use switchyard_router::Args;
//!
//! let publisher = Publisher::new("demo", shop_example::catalog())?;
//! publisher.add_app("shop", "shop", Args::new())?;
//! publisher.call("shop.types.add", Args::new().arg("books").kw("autocommit", true)).wait()?;
//!
//! let types = publisher.call("shop.types.list", Args::new()).wait()?;
//! assert_eq!(types["total"], 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod db;
pub mod error;
pub mod hierarchy;
pub mod shop;
pub mod tables;

pub use db::{DbCursor, MemoryDb};
pub use error::ShopError;

use switchyard::AppCatalog;

/// Every app this crate can publish.
pub fn catalog() -> AppCatalog {
    AppCatalog::new()
        .register("shop", shop::build)
        .register_named("shop", "Hierarchical", hierarchy::build)
}
