//! Aggregate snapshot history
//!
//! Operation: UPSERT (INSERT ... ON CONFLICT(load_batch) DO UPDATE)
//! - the previous effective snapshot is read and the new one written inside
//!   one IMMEDIATE transaction, so no other writer can interleave between
//!   the read and the write
//! - every write takes `MAX(version) + 1`; the highest version is "latest"

use super::SqliteStore;
use crate::aggregate::{AggregateSnapshot, RunningStats};
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Effective global aggregate, `None` when nothing has been folded.
    async fn latest(&self) -> Result<Option<AggregateSnapshot>, PersistenceError>;

    /// Atomically fold `contribution` into the latest snapshot and store the
    /// result under `batch_label`.
    async fn upsert_fold(
        &self,
        batch_label: &str,
        contribution: &RunningStats,
    ) -> Result<AggregateSnapshot, PersistenceError>;
}

const SELECT_LATEST: &str = "SELECT load_batch, cum_count, cum_avg, cum_min, cum_max, version, last_updated
     FROM agg_stats
     ORDER BY version DESC
     LIMIT 1";

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<AggregateSnapshot> {
    let count: i64 = row.get(1)?;
    let count = u64::try_from(count).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, count))?;
    let min: Option<f64> = row.get(3)?;
    let max: Option<f64> = row.get(4)?;

    Ok(AggregateSnapshot {
        batch_label: row.get(0)?,
        stats: RunningStats {
            count,
            average: row.get(2)?,
            min: min.unwrap_or(f64::INFINITY),
            max: max.unwrap_or(f64::NEG_INFINITY),
        },
        version: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn read_latest(conn: &Connection) -> Result<Option<AggregateSnapshot>, PersistenceError> {
    Ok(conn.query_row(SELECT_LATEST, [], row_to_snapshot).optional()?)
}

/// Bounds are stored as NULL while the aggregate is still empty.
fn stored_bound(stats: &RunningStats, value: f64) -> Option<f64> {
    if stats.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[async_trait]
impl AggregateStore for SqliteStore {
    async fn latest(&self) -> Result<Option<AggregateSnapshot>, PersistenceError> {
        let conn = self.lock()?;
        read_latest(&conn)
    }

    async fn upsert_fold(
        &self,
        batch_label: &str,
        contribution: &RunningStats,
    ) -> Result<AggregateSnapshot, PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prev = read_latest(&tx)?;
        let stats = RunningStats::fold(prev.as_ref().map(|s| &s.stats), *contribution);
        let version = prev.as_ref().map_or(1, |s| s.version + 1);

        // Keep updated_at non-decreasing even if the wall clock steps back
        let now = Utc::now();
        let updated_at: DateTime<Utc> = match &prev {
            Some(p) if p.updated_at > now => p.updated_at,
            _ => now,
        };

        let count = i64::try_from(stats.count).map_err(|_| PersistenceError::CountOverflow(stats.count))?;

        tx.execute(
            r#"
            INSERT INTO agg_stats (
                load_batch, cum_count, cum_avg, cum_min, cum_max, version, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(load_batch) DO UPDATE SET
                cum_count = excluded.cum_count,
                cum_avg = excluded.cum_avg,
                cum_min = excluded.cum_min,
                cum_max = excluded.cum_max,
                version = excluded.version,
                last_updated = excluded.last_updated
            "#,
            params![
                batch_label,
                count,
                stats.average,
                stored_bound(&stats, stats.min),
                stored_bound(&stats, stats.max),
                version,
                updated_at,
            ],
        )?;

        tx.commit()?;

        Ok(AggregateSnapshot {
            batch_label: batch_label.to_string(),
            stats,
            version,
            updated_at,
        })
    }
}
