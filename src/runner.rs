//! Batch runner
//!
//! Per batch:
//! ```text
//! Skipped    (label already in the ledger, terminal)
//! Extracting → RowLoop → Completed (ledger marked)
//!          ↘          ↘ Failed    (ledger untouched, batch retried next run)
//! ```
//!
//! Row-level failures (schema violation, transaction log or fold error) are
//! logged with the row position and skipped; the loop continues. A row whose
//! fold fails is also removed from the transaction log. Stream failures
//! abort the batch before any ledger write; folds made before the failure
//! stay, and the abort line reports how many.
//!
//! Deployment assumes one runner per database: the ledger check at the
//! start of a run and the mark at the end of a batch are not one atomic
//! step. A concurrent completion is detected at mark time
//! (`MarkOutcome::AlreadyPresent`) and logged as an error.

use crate::aggregate::{AggregateSnapshot, BatchTotals, StreamingAggregator};
use crate::coerce::{coerce, FieldSchema};
use crate::error::{IngestError, RowError, SchemaViolation};
use crate::extract::{discover_batches, BatchFile, ExtractedRow, RowStream};
use crate::report;
use crate::store::{AggregateStore, BatchLedger, LoggedRow, MarkOutcome, SqliteStore, TransactionLog};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::sync::Arc;

/// Every attempted batch completed or was skipped.
pub const EXIT_OK: u8 = 0;
/// Configuration, storage or unexpected failure before the run could finish.
pub const EXIT_FATAL: u8 = 1;
/// At least one batch failed and was left unmarked.
pub const EXIT_PARTIAL: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// All unprocessed batches except the reserved one, in file-name order.
    Normal,
    /// Only the reserved batch.
    Validation,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub data_dir: PathBuf,
    pub file_extension: String,
    pub reserved_batch: String,
    pub delimiter: u8,
    pub schema: FieldSchema,
    pub value_field: String,
    pub timestamp_field: Option<String>,
    pub row_progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub batch_label: String,
    pub rows_seen: u64,
    pub rows_skipped: u64,
    pub totals: BatchTotals,
    pub cumulative: Option<AggregateSnapshot>,
    pub ledger: MarkOutcome,
}

#[derive(Debug)]
pub enum BatchOutcome {
    Skipped { batch_label: String },
    Completed(BatchSummary),
    Failed { batch_label: String, error: IngestError },
}

impl BatchOutcome {
    pub fn batch_label(&self) -> &str {
        match self {
            BatchOutcome::Skipped { batch_label } | BatchOutcome::Failed { batch_label, .. } => batch_label,
            BatchOutcome::Completed(summary) => &summary.batch_label,
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub mode: RunMode,
    pub outcomes: Vec<BatchOutcome>,
    /// Effective global aggregate after the run.
    pub final_snapshot: Option<AggregateSnapshot>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Completed(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Failed { .. }))
            .count()
    }

    pub fn exit_code(&self) -> u8 {
        if self.failed() > 0 {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        }
    }
}

/// A row that made it into the aggregate.
struct FoldedRow {
    observed_at: Option<NaiveDateTime>,
    snapshot: AggregateSnapshot,
}

pub struct BatchRunner {
    aggregates: Arc<dyn AggregateStore>,
    ledger: Arc<dyn BatchLedger>,
    log: Arc<dyn TransactionLog>,
    options: RunnerOptions,
}

impl BatchRunner {
    pub fn new(
        aggregates: Arc<dyn AggregateStore>,
        ledger: Arc<dyn BatchLedger>,
        log: Arc<dyn TransactionLog>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            aggregates,
            ledger,
            log,
            options,
        }
    }

    /// Runner with all three storage roles backed by one SQLite store.
    pub fn from_store(store: Arc<SqliteStore>, options: RunnerOptions) -> Self {
        Self::new(store.clone(), store.clone(), store, options)
    }

    /// Run every eligible batch for `mode` to completion.
    ///
    /// Only batch discovery failure is returned as `Err`; batch-level
    /// failures are reported in the `RunReport`.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport, IngestError> {
        let processed = self.ledger.list_processed().await;
        log::info!("📋 Batches already processed: {:?}", processed);

        let candidates = match mode {
            RunMode::Normal => discover_batches(
                &self.options.data_dir,
                &self.options.file_extension,
                &self.options.reserved_batch,
            )?,
            RunMode::Validation => vec![BatchFile::in_dir(
                &self.options.data_dir,
                &self.options.reserved_batch,
                &self.options.file_extension,
            )],
        };

        log::info!("🔍 {} candidate batch(es) for {:?} run", candidates.len(), mode);

        let mut outcomes = Vec::with_capacity(candidates.len());
        for batch in &candidates {
            let outcome = if processed.contains(&batch.label) {
                log::warn!("⚠️  '{}' already processed, skipping", batch.label);
                BatchOutcome::Skipped {
                    batch_label: batch.label.clone(),
                }
            } else {
                self.run_batch(batch).await
            };
            outcomes.push(outcome);
        }

        let final_snapshot = match self.aggregates.latest().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("❌ Failed to read final aggregate: {}", e);
                None
            }
        };

        Ok(RunReport {
            mode,
            outcomes,
            final_snapshot,
        })
    }

    /// Fold one batch and mark it in the ledger. The ledger is not consulted here.
    pub async fn run_batch(&self, batch: &BatchFile) -> BatchOutcome {
        let label = batch.label.as_str();
        log::info!("🚀 Processing batch '{}' from {}", label, batch.path.display());

        let stream = match RowStream::open(&batch.path, self.options.delimiter) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("❌ Batch '{}' aborted, extraction failed: {}", label, e);
                return BatchOutcome::Failed {
                    batch_label: label.to_string(),
                    error: e.into(),
                };
            }
        };

        let mut aggregator = StreamingAggregator::new(self.aggregates.clone(), label);
        let mut rows_seen = 0u64;
        let mut rows_skipped = 0u64;

        for next in stream {
            let row = match next {
                Ok(row) => row,
                Err(e) => {
                    log::error!(
                        "{}",
                        report::stream_abort_line(label, rows_seen, aggregator.totals().rows_folded, &e)
                    );
                    return BatchOutcome::Failed {
                        batch_label: label.to_string(),
                        error: e.into(),
                    };
                }
            };

            rows_seen += 1;
            let index = row.index;

            match self.process_row(&mut aggregator, row).await {
                Ok(folded) => {
                    let line = report::row_line(folded.observed_at, index, &folded.snapshot);
                    if self.options.row_progress {
                        log::info!("{}", line);
                    } else {
                        log::debug!("{}", line);
                    }
                }
                Err(e) => {
                    rows_skipped += 1;
                    log::error!(
                        "❌ Row {} in batch '{}' ({}) not processed: {}",
                        index,
                        label,
                        batch.path.display(),
                        e
                    );
                }
            }
        }

        let fold = aggregator.finish();
        if let Some(snapshot) = &fold.cumulative {
            log::info!("{}", report::batch_line(label, snapshot));
        }

        let ledger = match self.ledger.mark_loaded(label).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("❌ Batch '{}' folded but could not be recorded in the ledger: {}", label, e);
                return BatchOutcome::Failed {
                    batch_label: label.to_string(),
                    error: e.into(),
                };
            }
        };

        match ledger {
            MarkOutcome::Inserted => log::info!(
                "✅ '{}' processed: {} row(s) folded, {} skipped",
                label,
                fold.totals.rows_folded,
                rows_skipped
            ),
            MarkOutcome::AlreadyPresent => log::error!(
                "❌ '{}' was recorded by another runner during this run; its rows may be counted twice",
                label
            ),
        }

        BatchOutcome::Completed(BatchSummary {
            batch_label: fold.batch_label,
            rows_seen,
            rows_skipped,
            totals: fold.totals,
            cumulative: fold.cumulative,
            ledger,
        })
    }

    async fn process_row(
        &self,
        aggregator: &mut StreamingAggregator,
        row: ExtractedRow,
    ) -> Result<FoldedRow, RowError> {
        let raw = row.fields?;
        let coerced = coerce(&raw, &self.options.schema)?;

        let measure = coerced
            .number(&self.options.value_field)
            .ok_or_else(|| SchemaViolation::MissingField {
                field: self.options.value_field.clone(),
            })?;
        let observed_at = self
            .options
            .timestamp_field
            .as_deref()
            .and_then(|field| coerced.timestamp(field));

        let log_id = self
            .log
            .append(&LoggedRow {
                batch_label: aggregator.batch_label(),
                row_index: row.index,
                measure,
                observed_at,
                row: &coerced,
            })
            .await?;

        match aggregator.fold_value(measure).await {
            Ok(snapshot) => Ok(FoldedRow {
                observed_at,
                snapshot,
            }),
            Err(fold_err) => {
                if let Err(e) = self.log.discard(log_id).await {
                    log::error!(
                        "❌ Row {} of batch '{}' stays in the transaction log (id {}) without a fold: {}",
                        row.index,
                        aggregator.batch_label(),
                        log_id,
                        e
                    );
                }
                Err(fold_err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;

    fn failed(label: &str) -> BatchOutcome {
        BatchOutcome::Failed {
            batch_label: label.to_string(),
            error: ExtractionError::EmptyHeader {
                path: PathBuf::from(format!("{}.csv", label)),
            }
            .into(),
        }
    }

    #[test]
    fn test_exit_code_reflects_failed_batches() {
        let mut report = RunReport {
            mode: RunMode::Normal,
            outcomes: vec![BatchOutcome::Skipped {
                batch_label: "2012-1".to_string(),
            }],
            final_snapshot: None,
        };
        assert_eq!(report.exit_code(), EXIT_OK);
        assert_eq!(report.skipped(), 1);

        report.outcomes.push(failed("2012-2"));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.completed(), 0);
        assert_eq!(report.exit_code(), EXIT_PARTIAL);
        assert_eq!(report.outcomes[1].batch_label(), "2012-2");
    }
}
