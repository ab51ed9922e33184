//! Streaming aggregator for one batch
//!
//! Values are folded strictly in input order. Each fold goes through
//! `AggregateStore::upsert_fold`; the per-batch running totals advance only
//! after the store confirms the write, so a failed fold leaves them where
//! they were.

use super::fold::RunningStats;
use super::snapshot::AggregateSnapshot;
use crate::error::PersistenceError;
use crate::store::AggregateStore;
use std::sync::Arc;

/// Statistics over the values of the current batch only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchTotals {
    /// Rows whose fold was persisted (NaN values included).
    pub rows_folded: u64,
    pub stats: RunningStats,
}

/// Final report of a batch fold.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFold {
    pub batch_label: String,
    pub totals: BatchTotals,
    /// Cumulative snapshot after the last successful fold.
    pub cumulative: Option<AggregateSnapshot>,
}

pub struct StreamingAggregator {
    store: Arc<dyn AggregateStore>,
    batch_label: String,
    totals: BatchTotals,
    last_snapshot: Option<AggregateSnapshot>,
}

impl StreamingAggregator {
    pub fn new(store: Arc<dyn AggregateStore>, batch_label: impl Into<String>) -> Self {
        Self {
            store,
            batch_label: batch_label.into(),
            totals: BatchTotals::default(),
            last_snapshot: None,
        }
    }

    pub fn batch_label(&self) -> &str {
        &self.batch_label
    }

    pub fn totals(&self) -> &BatchTotals {
        &self.totals
    }

    /// Fold one value into the global aggregate and return the new cumulative snapshot.
    pub async fn fold_value(&mut self, value: f64) -> Result<AggregateSnapshot, PersistenceError> {
        let contribution = RunningStats::single(value);
        let snapshot = self.store.upsert_fold(&self.batch_label, &contribution).await?;

        self.totals.rows_folded += 1;
        self.totals.stats.push(value);
        self.last_snapshot = Some(snapshot.clone());

        Ok(snapshot)
    }

    pub fn finish(self) -> BatchFold {
        BatchFold {
            batch_label: self.batch_label,
            totals: self.totals,
            cumulative: self.last_snapshot,
        }
    }
}
