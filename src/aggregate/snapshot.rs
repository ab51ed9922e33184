use super::fold::RunningStats;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Persisted cumulative statistics, keyed by the batch that last updated them.
///
/// `version` is the store-assigned sequence number; the snapshot with the
/// highest version is the effective global aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub batch_label: String,
    pub stats: RunningStats,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl AggregateSnapshot {
    pub fn cumulative_count(&self) -> u64 {
        self.stats.count
    }

    pub fn cumulative_average(&self) -> f64 {
        self.stats.average
    }

    pub fn cumulative_min(&self) -> f64 {
        self.stats.min
    }

    pub fn cumulative_max(&self) -> f64 {
        self.stats.max
    }
}
