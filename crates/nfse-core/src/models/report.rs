//! Result types produced by the ingestion pipelines.
//!
//! Explicit structs with named fields; callers get a per-batch breakdown
//! rather than a single pass/fail signal, so partial success is always
//! distinguishable from total failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dedup::{DuplicateVerdict, MatchStrategy};

/// Outcome of the single-document pipeline.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The candidate was unique; blob and metadata were written.
    Stored { id: Uuid, storage_key: String },
    /// The candidate matched an existing record; no side effects.
    Duplicate(DuplicateVerdict),
}

impl IngestOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate(_))
    }
}

/// Per-document outcome within a batch, indexed by input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchItemOutcome {
    Stored {
        id: Uuid,
        storage_key: String,
    },
    Duplicate {
        /// `None` when the duplicate was caught by a persistence-layer
        /// constraint rather than by a detector strategy.
        strategy: Option<MatchStrategy>,
        reason: String,
    },
    Failed {
        error: String,
    },
}

/// Summary of one batch-pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub elapsed: Duration,
    /// One outcome per input document, in input order.
    pub outcomes: Vec<BatchItemOutcome>,
}

impl BatchReport {
    /// Build a report from per-document outcomes, deriving the counts.
    pub fn from_outcomes(outcomes: Vec<BatchItemOutcome>, elapsed: Duration) -> Self {
        let mut processed = 0;
        let mut duplicates = 0;
        let mut errors = 0;
        for outcome in &outcomes {
            match outcome {
                BatchItemOutcome::Stored { .. } => processed += 1,
                BatchItemOutcome::Duplicate { .. } => duplicates += 1,
                BatchItemOutcome::Failed { .. } => errors += 1,
            }
        }
        BatchReport {
            processed,
            duplicates,
            errors,
            elapsed,
            outcomes,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let outcomes = vec![
            BatchItemOutcome::Stored {
                id: Uuid::new_v4(),
                storage_key: "nfse/2025/082025/1/a.xml".to_string(),
            },
            BatchItemOutcome::Duplicate {
                strategy: Some(MatchStrategy::VerificationCode),
                reason: "verification code matched".to_string(),
            },
            BatchItemOutcome::Failed {
                error: "schema unmarshal failed".to_string(),
            },
            BatchItemOutcome::Stored {
                id: Uuid::new_v4(),
                storage_key: "nfse/2025/082025/1/b.xml".to_string(),
            },
        ];
        let report = BatchReport::from_outcomes(outcomes, Duration::from_millis(12));

        assert_eq!(report.processed, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.total(), 4);
    }
}
