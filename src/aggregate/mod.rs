//! Incremental aggregation core
//!
//! ```text
//! value → RunningStats::single
//!     ↓
//! StreamingAggregator (per-batch totals, input order)
//!     ↓
//! AggregateStore::upsert_fold (read latest → RunningStats::fold → write, one transaction)
//!     ↓
//! AggregateSnapshot (cumulative across all batches)
//! ```

pub mod fold;
pub mod snapshot;
pub mod streaming;

pub use fold::RunningStats;
pub use snapshot::AggregateSnapshot;
pub use streaming::{BatchFold, BatchTotals, StreamingAggregator};
