//! An in-memory transactional store.
//!
//! Writes made through a [`DbCursor`] land in a pending journal. They become
//! visible to [`MemoryDb::rows`] on commit and vanish on rollback. Cursors
//! read through the journal, so a transaction sees its own writes.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use switchyard_router::{Cursor, TransactionalResource};

pub type Row = Map<String, Value>;

#[derive(Debug)]
enum Change {
    Insert { table: String, row: Row },
    Delete { table: String, id: u64 },
}

#[derive(Debug, Default)]
struct Store {
    tables: IndexMap<String, Vec<Row>>,
    pending: Vec<Change>,
    last_id: IndexMap<String, u64>,
}

fn row_id(row: &Row) -> Option<u64> {
    row.get("id").and_then(Value::as_u64)
}

impl Store {
    fn view(&self, table: &str) -> Vec<Row> {
        let mut rows = self.tables.get(table).cloned().unwrap_or_default();
        for change in &self.pending {
            match change {
                Change::Insert { table: t, row } if t == table => rows.push(row.clone()),
                Change::Delete { table: t, id } if t == table => {
                    rows.retain(|r| row_id(r) != Some(*id))
                }
                _ => {}
            }
        }
        rows
    }

    fn apply(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let applied = pending.len();
        for change in pending {
            match change {
                Change::Insert { table, row } => self.tables.entry(table).or_default().push(row),
                Change::Delete { table, id } => {
                    if let Some(rows) = self.tables.get_mut(&table) {
                        rows.retain(|r| row_id(r) != Some(id));
                    }
                }
            }
        }
        applied
    }
}

/// Shared handle to the store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    store: Arc<Mutex<Store>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a cursor on the shared journal.
    pub fn open(&self) -> DbCursor {
        DbCursor {
            store: self.store.clone(),
        }
    }

    /// Committed rows only.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.store.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of uncommitted changes.
    pub fn pending(&self) -> usize {
        self.store.lock().pending.len()
    }

    /// Applies the journal, returning how many changes it held.
    pub fn commit_changes(&self) -> usize {
        let applied = self.store.lock().apply();
        tracing::debug!(changes = applied, "commit");
        applied
    }

    /// Drops the journal, returning how many changes it held.
    pub fn discard_changes(&self) -> usize {
        let dropped = {
            let mut store = self.store.lock();
            let dropped = store.pending.len();
            store.pending.clear();
            dropped
        };
        tracing::debug!(changes = dropped, "rollback");
        dropped
    }
}

impl TransactionalResource for MemoryDb {
    fn cursor(&self) -> anyhow::Result<Cursor> {
        Ok(Cursor::new(self.open()))
    }

    fn commit(&self) -> anyhow::Result<()> {
        self.commit_changes();
        Ok(())
    }

    fn rollback(&self) -> anyhow::Result<()> {
        self.discard_changes();
        Ok(())
    }
}

/// Reads and writes within the current transaction.
#[derive(Debug, Clone)]
pub struct DbCursor {
    store: Arc<Mutex<Store>>,
}

impl DbCursor {
    /// Queues an insert and returns the stored row, `id` first.
    pub fn insert(&self, table: &str, fields: Row) -> Row {
        let mut store = self.store.lock();
        let id = {
            let last = store.last_id.entry(table.to_string()).or_insert(0);
            *last += 1;
            *last
        };
        let mut row = Row::new();
        row.insert("id".into(), id.into());
        row.extend(fields.into_iter().filter(|(k, _)| k != "id"));
        store.pending.push(Change::Insert {
            table: table.to_string(),
            row: row.clone(),
        });
        row
    }

    /// Queues a delete. Returns false when the row is not visible.
    pub fn delete(&self, table: &str, id: u64) -> bool {
        let mut store = self.store.lock();
        if !store.view(table).iter().any(|r| row_id(r) == Some(id)) {
            return false;
        }
        store.pending.push(Change::Delete {
            table: table.to_string(),
            id,
        });
        true
    }

    pub fn select(&self, table: &str) -> Vec<Row> {
        self.store.lock().view(table)
    }

    pub fn find(&self, table: &str, id: u64) -> Option<Row> {
        self.select(table).into_iter().find(|r| row_id(r) == Some(id))
    }

    /// First visible row whose `field` equals `value`.
    pub fn find_by(&self, table: &str, field: &str, value: &Value) -> Option<Row> {
        self.select(table)
            .into_iter()
            .find(|r| r.get(field) == Some(value))
    }

    pub fn count_where(&self, table: &str, field: &str, value: &Value) -> usize {
        self.select(table)
            .iter()
            .filter(|r| r.get(field) == Some(value))
            .count()
    }
}
