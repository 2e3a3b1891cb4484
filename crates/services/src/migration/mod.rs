//! Batch migration of legacy progress into the tables backend.
//!
//! A migration walks legacy rows in ascending source-id order, one batch per
//! `run()`. Each batch is transformed row by row, written in one transaction
//! and only then recorded in the checkpoint, so a failed batch is retried
//! from the same cursor.

mod progress;
mod quiz;
pub mod transform;

use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::LegacyRowId;
use storage::checkpoint::Checkpoint;
use storage::repository::StorageError;
use tracing::{error, info, warn};

use crate::error::{MigrationError, TransformationError};

pub use progress::ProgressMigration;
pub use quiz::QuizSubmissionMigration;

/// Rows fetched per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationConfig {
    pub batch_size: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Cursor threaded through `Migration::step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationState {
    pub last_id: LegacyRowId,
    pub batch_size: u32,
}

/// Outcome of transforming one legacy row.
#[derive(Debug)]
pub struct RowOutcome<R> {
    pub source_id: LegacyRowId,
    pub result: Result<Vec<R>, TransformationError>,
}

/// One migration kind: where rows come from, how they map, where they go.
#[async_trait]
pub trait MigrationTask: Send + Sync {
    type Row: Send + Sync;
    type Record: Send + Sync;

    /// Checkpoint name for this kind.
    fn name(&self) -> &'static str;

    fn source_id(row: &Self::Row) -> LegacyRowId;

    /// Up to `limit` rows with a source id above `after`, ascending.
    async fn fetch(&self, after: LegacyRowId, limit: u32) -> Result<Vec<Self::Row>, StorageError>;

    /// Transform a fetched batch, one outcome per row.
    async fn transform(
        &self,
        rows: &[Self::Row],
    ) -> Result<Vec<RowOutcome<Self::Record>>, StorageError>;

    /// Write all records in a single transaction.
    async fn commit(&self, records: &[Self::Record]) -> Result<(), StorageError>;
}

/// Totals for `run_to_completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationSummary {
    pub batches: u32,
    pub rows: usize,
    pub skipped: usize,
}

pub struct Migration<T: MigrationTask> {
    task: T,
    checkpoint: Arc<dyn Checkpoint>,
    config: MigrationConfig,
    errors: Vec<MigrationError>,
}

impl<T: MigrationTask> Migration<T> {
    #[must_use]
    pub fn new(task: T, checkpoint: Arc<dyn Checkpoint>, config: MigrationConfig) -> Self {
        Self {
            task,
            checkpoint,
            config,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    /// Rows skipped so far, in the order they were encountered.
    #[must_use]
    pub fn errors(&self) -> &[MigrationError] {
        &self.errors
    }

    /// Process one batch after `state.last_id` without touching the checkpoint.
    ///
    /// Returns the number of legacy rows read and the advanced cursor. Skipped
    /// rows still move the cursor past their id; they are recorded in
    /// `errors()` only once the batch has been written.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Fetch` if the source cannot be read and
    /// `MigrationError::BatchCommit` if the write fails; the returned state is
    /// then not advanced.
    pub async fn step(
        &mut self,
        state: MigrationState,
        dry_run: bool,
    ) -> Result<(usize, MigrationState), MigrationError> {
        let rows = self
            .task
            .fetch(state.last_id, state.batch_size)
            .await
            .map_err(MigrationError::Fetch)?;
        let Some(last_id) = rows.iter().map(T::source_id).max() else {
            return Ok((0, state));
        };

        let outcomes = self
            .task
            .transform(&rows)
            .await
            .map_err(MigrationError::Fetch)?;
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(mut batch) => records.append(&mut batch),
                Err(err) => {
                    warn!(
                        migration = self.task.name(),
                        source_id = %outcome.source_id,
                        error = %err,
                        "skipping legacy row"
                    );
                    skipped.push(MigrationError::Transformation {
                        source_id: outcome.source_id,
                        error: err,
                    });
                }
            }
        }

        if !dry_run && !records.is_empty() {
            if let Err(err) = self.task.commit(&records).await {
                error!(
                    migration = self.task.name(),
                    after = %state.last_id,
                    rows = rows.len(),
                    error = %err,
                    "batch commit failed"
                );
                return Err(MigrationError::BatchCommit(err));
            }
        }

        info!(
            migration = self.task.name(),
            rows = rows.len(),
            records = records.len(),
            skipped = skipped.len(),
            last_id = %last_id,
            dry_run,
            "migrated batch"
        );
        self.errors.append(&mut skipped);
        Ok((rows.len(), MigrationState { last_id, ..state }))
    }

    async fn load_state(&self) -> Result<MigrationState, MigrationError> {
        let last_id = self
            .checkpoint
            .load(self.task.name())
            .await
            .map_err(MigrationError::Configuration)?;
        Ok(MigrationState {
            last_id,
            batch_size: self.config.batch_size,
        })
    }

    /// Migrate the next batch after the stored checkpoint.
    ///
    /// Returns the number of legacy rows processed; 0 once everything is
    /// migrated. A dry run reads and transforms but writes nothing, the
    /// checkpoint included.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the checkpoint cannot be
    /// read, plus the errors of `step`.
    pub async fn run(&mut self, dry_run: bool) -> Result<usize, MigrationError> {
        let state = self.load_state().await?;
        let (count, next) = self.step(state, dry_run).await?;
        if !dry_run && count > 0 {
            self.checkpoint
                .store(self.task.name(), next.last_id)
                .await
                .map_err(MigrationError::Checkpoint)?;
        }
        Ok(count)
    }

    /// Run batches until the source is exhausted.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by `run` or `step`.
    pub async fn run_to_completion(
        &mut self,
        dry_run: bool,
    ) -> Result<MigrationSummary, MigrationError> {
        let skipped_before = self.errors.len();
        let mut summary = MigrationSummary::default();

        if dry_run {
            let mut state = self.load_state().await?;
            loop {
                let (count, next) = self.step(state, true).await?;
                if count == 0 {
                    break;
                }
                summary.batches += 1;
                summary.rows += count;
                state = next;
            }
        } else {
            loop {
                let count = self.run(false).await?;
                if count == 0 {
                    break;
                }
                summary.batches += 1;
                summary.rows += count;
            }
        }

        summary.skipped = self.errors.len() - skipped_before;
        Ok(summary)
    }

    /// Forget the checkpoint so the next run starts from the first legacy row.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Checkpoint` if the cursor cannot be stored.
    pub async fn reset(&self) -> Result<(), MigrationError> {
        self.checkpoint
            .reset(self.task.name())
            .await
            .map_err(MigrationError::Checkpoint)
    }
}
