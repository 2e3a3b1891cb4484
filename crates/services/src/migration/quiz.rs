use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::LegacyRowId;
use storage::records::{LegacyAttemptRow, SubmissionRecord};
use storage::repository::{LegacyAttemptSource, StorageError, SubmissionTarget};

use super::transform::{referenced_questions, submission_record};
use super::{MigrationTask, RowOutcome};

/// Quiz attempts on lesson comments into submissions with answers and grades.
#[derive(Clone)]
pub struct QuizSubmissionMigration {
    source: Arc<dyn LegacyAttemptSource>,
    target: Arc<dyn SubmissionTarget>,
}

impl QuizSubmissionMigration {
    pub const NAME: &'static str = "quiz-submissions";

    #[must_use]
    pub fn new(source: Arc<dyn LegacyAttemptSource>, target: Arc<dyn SubmissionTarget>) -> Self {
        Self { source, target }
    }
}

#[async_trait]
impl MigrationTask for QuizSubmissionMigration {
    type Row = LegacyAttemptRow;
    type Record = SubmissionRecord;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source_id(row: &LegacyAttemptRow) -> LegacyRowId {
        row.source_id
    }

    async fn fetch(
        &self,
        after: LegacyRowId,
        limit: u32,
    ) -> Result<Vec<LegacyAttemptRow>, StorageError> {
        self.source.find_attempts_for_migration(after, limit).await
    }

    async fn transform(
        &self,
        rows: &[LegacyAttemptRow],
    ) -> Result<Vec<RowOutcome<SubmissionRecord>>, StorageError> {
        let known = self
            .source
            .existing_questions(&referenced_questions(rows))
            .await?;
        Ok(rows
            .iter()
            .map(|row| RowOutcome {
                source_id: row.source_id,
                result: submission_record(row, &known).map(|record| vec![record]),
            })
            .collect())
    }

    async fn commit(&self, records: &[SubmissionRecord]) -> Result<(), StorageError> {
        self.target.upsert_submission_batch(records).await
    }
}
