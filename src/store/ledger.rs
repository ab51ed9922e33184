//! Ledger of completed batches
//!
//! A label moves `absent -> present` exactly once and never back. Presence
//! means the batch's rows have already been folded into the aggregate.

use super::SqliteStore;
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub batch_label: String,
    pub loaded_at: DateTime<Utc>,
}

/// Result of an idempotent ledger insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Inserted,
    /// The label was already present; nothing was written.
    AlreadyPresent,
}

#[async_trait]
pub trait BatchLedger: Send + Sync {
    async fn records(&self) -> Result<Vec<BatchRecord>, PersistenceError>;

    /// Insert `label`; a duplicate insert is a no-op, never an error.
    async fn mark_loaded(&self, label: &str) -> Result<MarkOutcome, PersistenceError>;

    async fn try_list_processed(&self) -> Result<BTreeSet<String>, PersistenceError> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .map(|record| record.batch_label)
            .collect())
    }

    /// Labels already recorded. A read failure is logged and yields the
    /// empty set, so the run proceeds (and may reprocess) instead of halting.
    async fn list_processed(&self) -> BTreeSet<String> {
        match self.try_list_processed().await {
            Ok(labels) => labels,
            Err(e) => {
                log::error!("❌ Failed to read batch ledger, treating it as empty: {}", e);
                BTreeSet::new()
            }
        }
    }
}

#[async_trait]
impl BatchLedger for SqliteStore {
    async fn records(&self) -> Result<Vec<BatchRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT batch_name, loaded_at FROM ingested_files ORDER BY batch_name ASC")?;

        let records = stmt
            .query_map([], |row| {
                Ok(BatchRecord {
                    batch_label: row.get(0)?,
                    loaded_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    async fn mark_loaded(&self, label: &str) -> Result<MarkOutcome, PersistenceError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO ingested_files (batch_name, loaded_at) VALUES (?1, ?2)
             ON CONFLICT(batch_name) DO NOTHING",
            params![label, Utc::now()],
        )?;

        Ok(if inserted == 1 {
            MarkOutcome::Inserted
        } else {
            MarkOutcome::AlreadyPresent
        })
    }
}
