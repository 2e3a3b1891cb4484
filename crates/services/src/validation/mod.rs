//! Read-only comparison of the legacy and tables representations.
//!
//! Validations re-derive the expected target records from the legacy rows
//! with the same transform the migration uses, then compare them with what
//! the tables backend holds.

mod progress;
mod quiz;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use storage::repository::StorageError;

pub use progress::ProgressValidation;
pub use quiz::QuizSubmissionValidation;

/// Legacy rows read per page while validating.
const PAGE_SIZE: u32 = 500;

/// Column name and rendered value, in display order.
pub type ValidationRow = Vec<(&'static str, String)>;

/// One discrepancy, optionally with the offending rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub message: String,
    pub data: Option<Vec<ValidationRow>>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_rows(message: impl Into<String>, rows: Vec<ValidationRow>) -> Self {
        Self {
            message: message.into(),
            data: Some(rows),
        }
    }
}

#[async_trait]
pub trait Validation: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recompute all discrepancies, replacing those of a previous run.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if either representation cannot be read.
    async fn run(&mut self) -> Result<(), StorageError>;

    fn errors(&self) -> &[ValidationError];

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

/// Groups offending rows under a fixed message; empty groups report nothing.
struct Finding {
    message: &'static str,
    rows: Vec<ValidationRow>,
}

impl Finding {
    fn new(message: &'static str) -> Self {
        Self {
            message,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: ValidationRow) {
        self.rows.push(row);
    }

    fn into_error(self) -> Option<ValidationError> {
        if self.rows.is_empty() {
            return None;
        }
        Some(ValidationError::with_rows(
            format!("{} ({})", self.message, self.rows.len()),
            self.rows,
        ))
    }
}

fn count_mismatch(what: &str, legacy: u64, tables: u64) -> Option<ValidationError> {
    (legacy != tables).then(|| {
        ValidationError::new(format!(
            "{what} count mismatch: legacy {legacy}, tables {tables}"
        ))
    })
}

/// Legacy dates have second precision.
fn same_instant(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    a.map(|t| t.trunc_subsecs(0)) == b.map(|t| t.trunc_subsecs(0))
}

fn show_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_owned(), |t| t.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::time::fixed_now;

    #[test]
    fn empty_finding_reports_nothing() {
        assert_eq!(Finding::new("missing").into_error(), None);

        let mut finding = Finding::new("missing");
        finding.push(vec![("id", "1".to_owned())]);
        let err = finding.into_error().unwrap();
        assert_eq!(err.message, "missing (1)");
        assert_eq!(err.data.unwrap().len(), 1);
    }

    #[test]
    fn counts_and_instants() {
        assert_eq!(count_mismatch("course progress", 3, 3), None);
        assert_eq!(
            count_mismatch("course progress", 3, 2).unwrap().message,
            "course progress count mismatch: legacy 3, tables 2"
        );

        let now = fixed_now();
        assert!(same_instant(Some(now), Some(now + Duration::milliseconds(400))));
        assert!(!same_instant(Some(now), None));
        assert!(same_instant(None, None));
    }
}
