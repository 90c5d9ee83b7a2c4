// src/report.rs

use crate::data_model::{JobOutcome, WorkItem};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;

/// Rendered error messages of this many characters or more are shortened.
pub const ERROR_DISPLAY_LIMIT: usize = 60;
const ELLIPSIS: &str = "...";

/// A failed input and the full message the remover gave for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub file_name: String,
    pub error: String,
}

impl FailedItem {
    /// The message as shown in tables; the stored `error` is untouched.
    pub fn display_error(&self) -> String {
        truncate_error(&self.error, ERROR_DISPLAY_LIMIT)
    }
}

/// Aggregate view over the outcomes of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration: Duration,
    /// Input file names in processing order.
    pub successful: Vec<String>,
    /// Failed inputs in processing order.
    pub failed: Vec<FailedItem>,
    pub success_rate: f64,
}

impl SummaryReport {
    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total_attempted(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Looks up the stored (untruncated) error for `file_name`.
    pub fn error_for(&self, file_name: &str) -> Option<&str> {
        self.failed
            .iter()
            .find(|f| f.file_name == file_name)
            .map(|f| f.error.as_str())
    }
}

/// Builds the report for `outcomes`, which must be in processing order.
pub fn summarize(
    outcomes: &[(WorkItem, JobOutcome)],
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
) -> SummaryReport {
    let mut successful = Vec::new();
    let mut failed = Vec::new();
    for (item, outcome) in outcomes {
        match outcome {
            JobOutcome::Success { .. } => successful.push(item.file_name()),
            JobOutcome::Failure { error_detail } => failed.push(FailedItem {
                file_name: item.file_name(),
                error: error_detail.clone(),
            }),
        }
    }

    let total = successful.len() + failed.len();
    let success_rate = if total > 0 {
        successful.len() as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    SummaryReport {
        started_at,
        finished_at,
        duration: (finished_at - started_at).to_std().unwrap_or_default(),
        successful,
        failed,
        success_rate,
    }
}

/// Shortens `message` to `limit - 3` characters plus `...` once it reaches
/// `limit` characters. Counts chars, not bytes.
pub fn truncate_error(message: &str, limit: usize) -> String {
    if message.chars().count() < limit {
        return message.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut shortened: String = message.chars().take(keep).collect();
    shortened.push_str(ELLIPSIS);
    shortened
}
