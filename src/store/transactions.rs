//! Transaction log
//!
//! Every coerced row is stored with its batch label and position before its
//! value is folded. An entry whose fold fails is discarded again, so each
//! logged row has exactly one fold in the aggregate.

use super::SqliteStore;
use crate::coerce::CoercedRow;
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rusqlite::params;

/// One row as written to the log.
#[derive(Debug, Clone, Copy)]
pub struct LoggedRow<'a> {
    pub batch_label: &'a str,
    pub row_index: u64,
    pub measure: f64,
    pub observed_at: Option<NaiveDateTime>,
    pub row: &'a CoercedRow,
}

#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Append one row; returns the log id.
    async fn append(&self, entry: &LoggedRow<'_>) -> Result<i64, PersistenceError>;

    /// Remove the entry `id`; used when the row's fold did not go through.
    async fn discard(&self, id: i64) -> Result<(), PersistenceError>;

    /// Number of rows logged for `batch_label`.
    async fn count_for_batch(&self, batch_label: &str) -> Result<u64, PersistenceError>;
}

#[async_trait]
impl TransactionLog for SqliteStore {
    async fn append(&self, entry: &LoggedRow<'_>) -> Result<i64, PersistenceError> {
        let payload = serde_json::to_string(entry.row)?;
        let row_index =
            i64::try_from(entry.row_index).map_err(|_| PersistenceError::CountOverflow(entry.row_index))?;
        // NaN binds as NULL
        let measure = Some(entry.measure).filter(|m| !m.is_nan());

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transactions (batch_label, row_index, measure, observed_at, payload, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.batch_label,
                row_index,
                measure,
                entry.observed_at,
                payload,
                Utc::now(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    async fn discard(&self, id: i64) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn count_for_batch(&self, batch_label: &str) -> Result<u64, PersistenceError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE batch_label = ?1",
            [batch_label],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}
