//! Incremental batch ingestion with a durable running aggregate.
//!
//! Delimited batch files are streamed row by row, coerced against a field
//! schema, appended to a transaction log and folded into a global
//! count/mean/min/max aggregate kept in SQLite. A ledger of completed
//! batches makes reruns skip work already done.

pub mod aggregate;
pub mod coerce;
pub mod config;
pub mod error;
pub mod extract;
pub mod report;
pub mod runner;
pub mod sqlite_pragma;
pub mod store;

pub use aggregate::{AggregateSnapshot, RunningStats, StreamingAggregator};
pub use config::IngestConfig;
pub use error::{ConfigError, ExtractionError, IngestError, PersistenceError, SchemaViolation};
pub use runner::{BatchOutcome, BatchRunner, RunMode, RunReport, RunnerOptions};
pub use store::SqliteStore;
