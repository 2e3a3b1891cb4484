//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::codec::CodecError;
use progress_core::model::{LegacyRowId, QuestionId, SubjectId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Why a single legacy row could not be turned into target records.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformationError {
    #[error("subject {0} no longer exists")]
    MissingSubject(SubjectId),
    #[error("lesson {0} has no quiz")]
    MissingQuiz(SubjectId),
    #[error("invalid {field} timestamp: {raw:?}")]
    InvalidTimestamp { field: &'static str, raw: String },
    #[error("invalid final grade: {0:?}")]
    InvalidGrade(String),
    #[error("question {0} no longer exists")]
    UnknownQuestion(QuestionId),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors emitted by a `Migration`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MigrationError {
    /// The row was skipped; its id still advances the checkpoint.
    #[error("row {source_id} skipped: {error}")]
    Transformation {
        source_id: LegacyRowId,
        #[source]
        error: TransformationError,
    },
    /// Nothing from the batch was written; the checkpoint is unchanged.
    #[error("batch commit failed: {0}")]
    BatchCommit(#[source] StorageError),
    /// Checkpoint storage or schema is missing.
    #[error("migration is not configured: {0}")]
    Configuration(#[source] StorageError),
    #[error("checkpoint could not be stored: {0}")]
    Checkpoint(#[source] StorageError),
    #[error("legacy rows could not be read: {0}")]
    Fetch(#[source] StorageError),
}

/// Errors emitted by `DeletionCascade`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CascadeError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while assembling `ProgressServices`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServicesError {
    #[error(transparent)]
    Init(#[from] SqliteInitError),
}
