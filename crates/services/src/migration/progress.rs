use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::LegacyRowId;
use storage::records::{LegacyProgressRow, ProgressRecord};
use storage::repository::{LegacyProgressSource, ProgressTarget, StorageError};

use super::transform::progress_records;
use super::{MigrationTask, RowOutcome};

/// Course and lesson status comments into course, lesson and quiz progress rows.
#[derive(Clone)]
pub struct ProgressMigration {
    source: Arc<dyn LegacyProgressSource>,
    target: Arc<dyn ProgressTarget>,
}

impl ProgressMigration {
    pub const NAME: &'static str = "progress";

    #[must_use]
    pub fn new(source: Arc<dyn LegacyProgressSource>, target: Arc<dyn ProgressTarget>) -> Self {
        Self { source, target }
    }
}

#[async_trait]
impl MigrationTask for ProgressMigration {
    type Row = LegacyProgressRow;
    type Record = ProgressRecord;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source_id(row: &LegacyProgressRow) -> LegacyRowId {
        row.source_id
    }

    async fn fetch(
        &self,
        after: LegacyRowId,
        limit: u32,
    ) -> Result<Vec<LegacyProgressRow>, StorageError> {
        self.source.find_for_migration(after, limit).await
    }

    async fn transform(
        &self,
        rows: &[LegacyProgressRow],
    ) -> Result<Vec<RowOutcome<ProgressRecord>>, StorageError> {
        Ok(rows
            .iter()
            .map(|row| RowOutcome {
                source_id: row.source_id,
                result: progress_records(row),
            })
            .collect())
    }

    async fn commit(&self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        self.target.upsert_progress_batch(records).await
    }
}
