//! Human-readable progress and summary lines (not a stable format).

use crate::aggregate::AggregateSnapshot;
use crate::runner::{RunMode, RunReport};
use chrono::NaiveDateTime;

/// `1234567` → `1,234,567`
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn stats_fields(snapshot: &AggregateSnapshot) -> String {
    format!(
        "cum_count={} | cum_avg={:.2} | cum_min={:.2} | cum_max={:.2}",
        format_count(snapshot.cumulative_count()),
        snapshot.cumulative_average(),
        snapshot.cumulative_min(),
        snapshot.cumulative_max(),
    )
}

/// Per-row progress line.
pub fn row_line(observed_at: Option<NaiveDateTime>, row_index: u64, snapshot: &AggregateSnapshot) -> String {
    match observed_at {
        Some(ts) => format!("🟢 date={} | {}", ts, stats_fields(snapshot)),
        None => format!("🟢 row={} | {}", row_index, stats_fields(snapshot)),
    }
}

/// Per-batch completion line.
pub fn batch_line(batch_label: &str, snapshot: &AggregateSnapshot) -> String {
    format!("🔵 batch={} | {}", batch_label, stats_fields(snapshot))
}

/// Logged when a batch stream fails part way. Folds already made stay in the
/// aggregate, so both counts are needed to reconcile a rerun.
pub fn stream_abort_line(batch_label: &str, rows_read: u64, rows_folded: u64, error: &dyn std::fmt::Display) -> String {
    format!(
        "❌ Batch '{}' aborted after {} row(s) read, {} already folded, stream failed: {}",
        batch_label,
        format_count(rows_read),
        format_count(rows_folded),
        error
    )
}

/// Title of the summary printed once the run is over.
pub fn closing_title(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Normal => "Statistics before validation",
        RunMode::Validation => "Statistics after validation",
    }
}

/// Multi-line summary of the effective global aggregate.
pub fn summary(title: &str, value_field: &str, snapshot: Option<&AggregateSnapshot>) -> String {
    let mut out = format!("=== {} ===\n", title);
    match snapshot {
        Some(s) if !s.stats.is_empty() => {
            out.push_str(&format!("Total rows: {}\n", format_count(s.cumulative_count())));
            out.push_str(&format!("Average {}: {:.2}\n", value_field, s.cumulative_average()));
            out.push_str(&format!("Minimum {}: {}\n", value_field, s.cumulative_min()));
            out.push_str(&format!("Maximum {}: {}\n", value_field, s.cumulative_max()));
            out.push_str(&format!("Last batch: {} (updated {})", s.batch_label, s.updated_at.to_rfc3339()));
        }
        _ => out.push_str("No values have been aggregated yet"),
    }
    out
}

/// One-line tally of batch outcomes.
pub fn run_overview(report: &RunReport) -> String {
    format!(
        "Batches: {} completed, {} skipped, {} failed",
        report.completed(),
        report.skipped(),
        report.failed()
    )
}
