//! Error taxonomy for batch ingestion
//!
//! Errors are split by the scope they abort:
//! - `SchemaViolation` and row-level `PersistenceError` skip a single row
//! - `ExtractionError` and ledger `PersistenceError` abort a single batch
//! - `ConfigError` aborts the whole run before any batch is touched

use crate::coerce::FieldKind;
use std::path::PathBuf;
use thiserror::Error;

/// The batch stream could not be opened or read.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to list batch directory {path}: {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open batch file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read header of {path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("batch file {path} has no header row")]
    EmptyHeader { path: PathBuf },

    #[error("stream read failed after row {row_index} of {path}: {source}")]
    Stream {
        path: PathBuf,
        row_index: u64,
        #[source]
        source: csv::Error,
    },
}

/// A single record does not satisfy the declared field schema.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaViolation {
    #[error("field `{field}` is missing")]
    MissingField { field: String },

    #[error("field `{field}` value {value:?} is not a valid {kind}")]
    InvalidValue {
        field: String,
        value: String,
        kind: FieldKind,
    },

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Storage transaction failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("count {0} exceeds the storage integer range")]
    CountOverflow(u64),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid schema entry `{0}` (expected name=kind)")]
    InvalidSchemaEntry(String),

    #[error("unknown field kind `{0}` (expected integer, real or timestamp)")]
    UnknownKind(String),

    #[error("value field `{0}` must be declared as integer or real")]
    NonNumericValueField(String),

    #[error("delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Failure confined to one row; the row is skipped and the batch continues.
#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
