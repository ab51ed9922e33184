//! Incremental fold of summary statistics
//!
//! `RunningStats` is a mergeable summary (count, mean, min, max). Folding
//! one value is a merge with a single-sample summary; merging two arbitrary
//! summaries uses the Welford-style weighted mean update:
//!
//! ```text
//! n    = a.count + b.count
//! mean = a.mean + (b.mean - a.mean) * b.count / n
//! min  = min(a.min, b.min)
//! max  = max(a.max, b.max)
//! ```
//!
//! Empty summaries use `+inf` / `-inf` for min / max so the first value
//! seeds both exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: u64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl RunningStats {
    pub const EMPTY: RunningStats = RunningStats {
        count: 0,
        average: 0.0,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    /// Summary of one data point.
    pub fn single(value: f64) -> Self {
        Self {
            count: 1,
            average: value,
            min: value,
            max: value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Replace invalid fields with the corresponding `prev` values.
    ///
    /// A non-finite average (NaN or ±inf) carries no weight: the
    /// contribution's count drops to zero, so the merged count and mean stay
    /// where `prev` left them. NaN bounds fall back to `prev`; infinite bounds
    /// are only valid as the empty-summary sentinels.
    pub fn sanitized_against(self, prev: &RunningStats) -> RunningStats {
        if !self.average.is_finite() {
            return RunningStats {
                count: 0,
                average: prev.average,
                min: prev.min,
                max: prev.max,
            };
        }
        let bound = |value: f64, fallback: f64| if value.is_nan() { fallback } else { value };
        RunningStats {
            count: self.count,
            average: self.average,
            min: bound(self.min, prev.min),
            max: bound(self.max, prev.max),
        }
    }

    /// Merge two summaries. Inputs are expected to be NaN-free.
    pub fn merge(&self, other: &RunningStats) -> RunningStats {
        let count = self.count.saturating_add(other.count);
        let min = self.min.min(other.min);
        let max = self.max.max(other.max);

        if count == 0 {
            return RunningStats {
                count: 0,
                average: 0.0,
                min,
                max,
            };
        }

        let average = if other.count == 0 {
            self.average
        } else if self.count == 0 {
            other.average
        } else {
            let weight = other.count as f64 / count as f64;
            self.average + (other.average - self.average) * weight
        };

        // Rounding can push the mean an ulp outside [min, max].
        let average = if min <= max { average.clamp(min, max) } else { average };

        RunningStats {
            count,
            average,
            min,
            max,
        }
    }

    /// Fold a contribution into the previous cumulative state (`None` when
    /// nothing has been folded yet), applying the invalid-value policy.
    pub fn fold(prev: Option<&RunningStats>, contribution: RunningStats) -> RunningStats {
        let prev = prev.copied().unwrap_or(RunningStats::EMPTY);
        prev.merge(&contribution.sanitized_against(&prev))
    }

    /// Fold one value into `self`.
    pub fn push(&mut self, value: f64) {
        *self = RunningStats::fold(Some(&*self), RunningStats::single(value));
    }
}
