use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{LegacyRowId, ProgressType, SubjectId, UserId};
use storage::records::ProgressRecord;
use storage::repository::{LegacyProgressSource, ProgressTarget, StorageError};
use tracing::info;

use super::{
    Finding, PAGE_SIZE, Validation, ValidationError, ValidationRow, count_mismatch, same_instant,
    show_time,
};
use crate::migration::transform::progress_records;

/// Compares legacy status comments with the `progress` table.
pub struct ProgressValidation {
    source: Arc<dyn LegacyProgressSource>,
    target: Arc<dyn ProgressTarget>,
    errors: Vec<ValidationError>,
}

fn key_row(kind: ProgressType, subject_id: SubjectId, user_id: UserId) -> ValidationRow {
    vec![
        ("type", kind.to_string()),
        ("subject_id", subject_id.to_string()),
        ("user_id", user_id.to_string()),
    ]
}

fn diff_row(
    expected: &ProgressRecord,
    field: &'static str,
    legacy: String,
    tables: String,
) -> ValidationRow {
    let mut row = key_row(expected.kind, expected.subject_id, expected.user_id);
    row.push(("field", field.to_owned()));
    row.push(("legacy", legacy));
    row.push(("tables", tables));
    row
}

/// Field-level differences between a record derived from legacy and the stored one.
fn compare(expected: &ProgressRecord, actual: &ProgressRecord) -> Vec<ValidationRow> {
    let mut out = Vec::new();
    if expected.status != actual.status {
        out.push(diff_row(
            expected,
            "status",
            expected.status.clone(),
            actual.status.clone(),
        ));
    }
    if !same_instant(expected.started_at, actual.started_at) {
        out.push(diff_row(
            expected,
            "started_at",
            show_time(expected.started_at),
            show_time(actual.started_at),
        ));
    }
    if !same_instant(expected.completed_at, actual.completed_at) {
        out.push(diff_row(
            expected,
            "completed_at",
            show_time(expected.completed_at),
            show_time(actual.completed_at),
        ));
    }
    out
}

fn keep_newest(
    expected: &mut BTreeMap<(ProgressType, SubjectId, UserId), ProgressRecord>,
    record: ProgressRecord,
) {
    let key = (record.kind, record.subject_id, record.user_id);
    match expected.get(&key) {
        Some(kept) if kept.updated_at > record.updated_at => {}
        _ => {
            expected.insert(key, record);
        }
    }
}

impl ProgressValidation {
    #[must_use]
    pub fn new(source: Arc<dyn LegacyProgressSource>, target: Arc<dyn ProgressTarget>) -> Self {
        Self {
            source,
            target,
            errors: Vec::new(),
        }
    }

    async fn check_counts(&mut self) -> Result<(), StorageError> {
        for kind in ProgressType::ALL {
            let legacy = self.source.count_legacy_progress(kind).await?;
            let tables = self.target.count_progress(kind).await?;
            self.errors
                .extend(count_mismatch(&format!("{kind} progress"), legacy, tables));
        }
        Ok(())
    }
}

#[async_trait]
impl Validation for ProgressValidation {
    fn name(&self) -> &'static str {
        "progress"
    }

    async fn run(&mut self) -> Result<(), StorageError> {
        self.errors.clear();
        self.check_counts().await?;

        let mut unmigratable = Finding::new("legacy rows that cannot be migrated");
        let mut missing = Finding::new("progress missing from tables");
        let mut mismatched = Finding::new("progress differs between legacy and tables");
        // Duplicate legacy comments collapse onto the newest, as in the tables upsert.
        let mut expected: BTreeMap<(ProgressType, SubjectId, UserId), ProgressRecord> =
            BTreeMap::new();

        let mut after = LegacyRowId::START;
        loop {
            let rows = self.source.find_for_migration(after, PAGE_SIZE).await?;
            let Some(last) = rows.last() else {
                break;
            };
            after = last.source_id;

            for row in &rows {
                let records = match progress_records(row) {
                    Ok(records) => records,
                    Err(err) => {
                        unmigratable.push(vec![
                            ("source_id", row.source_id.to_string()),
                            ("subject_id", row.post_id.to_string()),
                            ("user_id", row.user_id.to_string()),
                            ("error", err.to_string()),
                        ]);
                        continue;
                    }
                };
                for record in records {
                    keep_newest(&mut expected, record);
                }
            }
        }

        for record in expected.values() {
            match self
                .target
                .find_progress_record(record.kind, record.subject_id, record.user_id)
                .await?
            {
                Some(actual) => {
                    for diff in compare(record, &actual) {
                        mismatched.push(diff);
                    }
                }
                None => missing.push(key_row(record.kind, record.subject_id, record.user_id)),
            }
        }

        let mut extra = Finding::new("progress only in tables");
        for kind in ProgressType::ALL {
            for (subject_id, user_id) in self.target.list_progress_keys(kind).await? {
                if !expected.contains_key(&(kind, subject_id, user_id)) {
                    extra.push(key_row(kind, subject_id, user_id));
                }
            }
        }

        self.errors.extend(
            [unmigratable, missing, mismatched, extra]
                .into_iter()
                .filter_map(Finding::into_error),
        );
        info!(
            validation = self.name(),
            discrepancies = self.errors.len(),
            "validation finished"
        );
        Ok(())
    }

    fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}
