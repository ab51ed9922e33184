//! Ingestion configuration from environment variables
//!
//! Loaded once at startup (after `.env`), with defaults for every setting.

use crate::coerce::FieldSchema;
use crate::error::ConfigError;
use crate::runner::RunnerOptions;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SCHEMA: &str = "timestamp=timestamp,user_id=integer,price=real";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Path to SQLite database file
    pub db_path: PathBuf,

    /// Directory scanned for batch files
    pub data_dir: PathBuf,

    /// Batch file extension (without the dot)
    pub file_extension: String,

    pub delimiter: u8,

    /// Batch label processed only in validation mode
    pub reserved_batch: String,

    /// Numeric field folded into the aggregate
    pub value_field: String,

    /// Field shown as the row date in progress lines
    pub timestamp_field: Option<String>,

    pub schema: FieldSchema,

    pub busy_timeout: Duration,

    /// Log cumulative statistics after every row
    pub row_progress: bool,
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BATCHFOLD_DB_PATH` (default: data/batchfold.db)
    /// - `BATCHFOLD_DATA_DIR` (default: data)
    /// - `BATCHFOLD_FILE_EXTENSION` (default: csv)
    /// - `BATCHFOLD_DELIMITER` (default: ,)
    /// - `BATCHFOLD_RESERVED_BATCH` (default: validation)
    /// - `BATCHFOLD_VALUE_FIELD` (default: price)
    /// - `BATCHFOLD_TIMESTAMP_FIELD` (default: timestamp, empty disables)
    /// - `BATCHFOLD_SCHEMA` (default: timestamp=timestamp,user_id=integer,price=real)
    /// - `BATCHFOLD_BUSY_TIMEOUT_MS` (default: 5000)
    /// - `BATCHFOLD_ROW_PROGRESS` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let delimiter = lookup("BATCHFOLD_DELIMITER").unwrap_or_else(|| ",".to_string());
        let delimiter = match delimiter.as_bytes() {
            [byte] if byte.is_ascii() => *byte,
            _ => return Err(ConfigError::InvalidDelimiter(delimiter.clone())),
        };

        let busy_timeout_ms = parse_or("BATCHFOLD_BUSY_TIMEOUT_MS", &lookup, 5_000u64)?;
        let row_progress = parse_or("BATCHFOLD_ROW_PROGRESS", &lookup, true)?;

        let schema: FieldSchema = lookup("BATCHFOLD_SCHEMA")
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
            .parse()?;

        let config = Self {
            db_path: lookup("BATCHFOLD_DB_PATH")
                .unwrap_or_else(|| "data/batchfold.db".to_string())
                .into(),

            data_dir: lookup("BATCHFOLD_DATA_DIR")
                .unwrap_or_else(|| "data".to_string())
                .into(),

            file_extension: lookup("BATCHFOLD_FILE_EXTENSION")
                .map(|ext| ext.trim_start_matches('.').to_string())
                .unwrap_or_else(|| "csv".to_string()),

            delimiter,

            reserved_batch: lookup("BATCHFOLD_RESERVED_BATCH").unwrap_or_else(|| "validation".to_string()),

            value_field: lookup("BATCHFOLD_VALUE_FIELD").unwrap_or_else(|| "price".to_string()),

            timestamp_field: match lookup("BATCHFOLD_TIMESTAMP_FIELD") {
                Some(field) if field.trim().is_empty() => None,
                Some(field) => Some(field),
                None => Some("timestamp".to_string()),
            },

            schema,

            busy_timeout: Duration::from_millis(busy_timeout_ms),

            row_progress,
        };

        config.validate()?;
        Ok(config)
    }

    /// The value field must be declared with a numeric kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.schema.kind_of(&self.value_field) {
            Some(kind) if kind.is_numeric() => Ok(()),
            _ => Err(ConfigError::NonNumericValueField(self.value_field.clone())),
        }
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            data_dir: self.data_dir.clone(),
            file_extension: self.file_extension.clone(),
            reserved_batch: self.reserved_batch.clone(),
            delimiter: self.delimiter,
            schema: self.schema.clone(),
            value_field: self.value_field.clone(),
            timestamp_field: self.timestamp_field.clone(),
            row_progress: self.row_progress,
        }
    }
}

fn parse_or<F, T>(name: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::FieldKind;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IngestConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.db_path, PathBuf::from("data/batchfold.db"));
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.file_extension, "csv");
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.reserved_batch, "validation");
        assert_eq!(config.value_field, "price");
        assert_eq!(config.timestamp_field.as_deref(), Some("timestamp"));
        assert_eq!(config.schema.kind_of("user_id"), Some(FieldKind::Integer));
        assert_eq!(config.busy_timeout, Duration::from_millis(5_000));
        assert!(config.row_progress);
    }

    #[test]
    fn test_custom_config() {
        let config = config_from(&[
            ("BATCHFOLD_DB_PATH", "/tmp/test.db"),
            ("BATCHFOLD_DATA_DIR", "/tmp/batches"),
            ("BATCHFOLD_FILE_EXTENSION", ".tsv"),
            ("BATCHFOLD_DELIMITER", "\t"),
            ("BATCHFOLD_VALUE_FIELD", "amount"),
            ("BATCHFOLD_TIMESTAMP_FIELD", ""),
            ("BATCHFOLD_SCHEMA", "amount=integer"),
            ("BATCHFOLD_BUSY_TIMEOUT_MS", "250"),
            ("BATCHFOLD_ROW_PROGRESS", "false"),
        ])
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/test.db"));
        assert_eq!(config.file_extension, "tsv");
        assert_eq!(config.delimiter, b'\t');
        assert_eq!(config.timestamp_field, None);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.row_progress);

        let options = config.runner_options();
        assert_eq!(options.value_field, "amount");
        assert_eq!(options.data_dir, PathBuf::from("/tmp/batches"));
    }

    #[test]
    fn test_value_field_must_be_numeric() {
        let err = config_from(&[("BATCHFOLD_SCHEMA", "price=timestamp")]).unwrap_err();
        assert_eq!(err, ConfigError::NonNumericValueField("price".to_string()));

        let err = config_from(&[("BATCHFOLD_VALUE_FIELD", "amount")]).unwrap_err();
        assert_eq!(err, ConfigError::NonNumericValueField("amount".to_string()));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert_eq!(
            config_from(&[("BATCHFOLD_DELIMITER", ";;")]).unwrap_err(),
            ConfigError::InvalidDelimiter(";;".to_string())
        );
        assert!(matches!(
            config_from(&[("BATCHFOLD_BUSY_TIMEOUT_MS", "soon")]),
            Err(ConfigError::InvalidValue { name: "BATCHFOLD_BUSY_TIMEOUT_MS", .. })
        ));
    }
}
