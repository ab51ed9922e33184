//! SQLite-backed durable store
//!
//! One `SqliteStore` backs the three storage roles through separate traits:
//! - `AggregateStore` - latest snapshot read and transactional fold upsert
//! - `BatchLedger` - set of completed batch labels
//! - `TransactionLog` - append-only log of coerced rows
//!
//! The traits are the seam the batch runner depends on, so tests can wrap
//! or replace individual roles.

pub mod aggregate;
pub mod ledger;
pub mod schema;
pub mod transactions;

pub use aggregate::AggregateStore;
pub use ledger::{BatchLedger, BatchRecord, MarkOutcome};
pub use transactions::{LoggedRow, TransactionLog};

use crate::error::PersistenceError;
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and ensure the schema exists.
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, PersistenceError> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn, busy_timeout)?;
        schema::create_tables(&conn)?;

        log::info!("✅ SQLite store initialized: {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::SqliteStore;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Fresh store in a temporary directory; keep the `TempDir` alive.
    pub fn temp_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("db").join("test.db"), Duration::from_secs(1)).unwrap();
        (dir, store)
    }
}
