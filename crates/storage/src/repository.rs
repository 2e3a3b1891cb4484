use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use progress_core::Clock;
use progress_core::codec::Payload;
use progress_core::model::{
    Answer, Grade, LegacyRowId, Progress, ProgressId, ProgressStatus, ProgressType, QuestionId,
    SubjectId, Submission, SubmissionId, UserId,
};
use thiserror::Error;

use crate::records::{
    LegacyAttemptRow, LegacyProgressRow, OrphanRow, ProgressRecord, SubmissionRecord,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A required table is missing; the schema was never installed.
    #[error("schema error: {0}")]
    Schema(String),
}

//
// ─── LIVE CONTRACT ─────────────────────────────────────────────────────────────
//

/// Repository contract for one progress type, implemented by every backend.
#[async_trait]
pub trait ProgressRepository<S: ProgressStatus>: Send + Sync {
    /// Start progress for a learner, returning the stored record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn create(&self, subject_id: SubjectId, user_id: UserId)
    -> Result<Progress<S>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<S>>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn has(&self, subject_id: SubjectId, user_id: UserId) -> Result<bool, StorageError> {
        Ok(self.get(subject_id, user_id).await?.is_some())
    }

    /// All learners' progress for a subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_all(&self, subject_id: SubjectId) -> Result<Vec<Progress<S>>, StorageError>;

    /// Persist state changes. Stamps `updated_at` with the repository clock.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record was deleted meanwhile.
    async fn save(&self, progress: &mut Progress<S>) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if deletion fails.
    async fn delete(&self, progress: &Progress<S>) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if deletion fails.
    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if deletion fails.
    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError>;
}

/// Quiz submissions; only the tables backend stores them.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn create(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
        final_grade: Option<f64>,
    ) -> Result<Submission, StorageError>;

    async fn get(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Submission>, StorageError>;

    async fn get_or_create(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
        final_grade: Option<f64>,
    ) -> Result<Submission, StorageError> {
        match self.get(quiz_id, user_id).await? {
            Some(existing) => Ok(existing),
            None => self.create(quiz_id, user_id, final_grade).await,
        }
    }

    async fn save(&self, submission: &mut Submission) -> Result<(), StorageError>;

    /// Delete a submission together with its answers and grades.
    async fn delete(&self, submission: &Submission) -> Result<(), StorageError>;

    async fn delete_for_quiz(&self, quiz_id: SubjectId) -> Result<(), StorageError>;

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    async fn create_answer(
        &self,
        submission: &Submission,
        question_id: QuestionId,
        value: Payload,
    ) -> Result<Answer, StorageError>;

    async fn get_answers(&self, submission_id: SubmissionId) -> Result<Vec<Answer>, StorageError>;

    async fn delete_answers(&self, submission_id: SubmissionId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn create_grade(
        &self,
        answer: &Answer,
        points: i64,
        feedback: Option<Payload>,
    ) -> Result<Grade, StorageError>;

    async fn get_grades(&self, submission_id: SubmissionId) -> Result<Vec<Grade>, StorageError>;

    async fn save_grades(&self, grades: &mut [Grade]) -> Result<(), StorageError>;

    async fn delete_grades(&self, submission_id: SubmissionId) -> Result<(), StorageError>;
}

//
// ─── MIGRATION / VALIDATION PORTS ──────────────────────────────────────────────
//

/// Read-only access to legacy progress comments, in source-id order.
#[async_trait]
pub trait LegacyProgressSource: Send + Sync {
    /// Up to `limit` course/lesson status rows with `source_id > after`, ascending.
    async fn find_for_migration(
        &self,
        after: LegacyRowId,
        limit: u32,
    ) -> Result<Vec<LegacyProgressRow>, StorageError>;

    /// Number of legacy records that map to `kind` progress.
    async fn count_legacy_progress(&self, kind: ProgressType) -> Result<u64, StorageError>;
}

/// Read-only access to legacy quiz attempts.
#[async_trait]
pub trait LegacyAttemptSource: Send + Sync {
    async fn find_attempts_for_migration(
        &self,
        after: LegacyRowId,
        limit: u32,
    ) -> Result<Vec<LegacyAttemptRow>, StorageError>;

    async fn count_legacy_attempts(&self) -> Result<u64, StorageError>;

    /// The subset of `ids` that still exist as question posts.
    async fn existing_questions(
        &self,
        ids: &[QuestionId],
    ) -> Result<HashSet<QuestionId>, StorageError>;
}

/// Batch writes and lookups against the `progress` table.
#[async_trait]
pub trait ProgressTarget: Send + Sync {
    /// Upsert all records in one transaction, keyed on `(subject_id, user_id, type)`.
    async fn upsert_progress_batch(&self, records: &[ProgressRecord]) -> Result<(), StorageError>;

    async fn find_progress_record(
        &self,
        kind: ProgressType,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    async fn count_progress(&self, kind: ProgressType) -> Result<u64, StorageError>;

    /// Every `(subject_id, user_id)` stored for `kind`, ordered by row id.
    async fn list_progress_keys(
        &self,
        kind: ProgressType,
    ) -> Result<Vec<(SubjectId, UserId)>, StorageError>;
}

/// Batch writes and lookups against the submission tables.
#[async_trait]
pub trait SubmissionTarget: Send + Sync {
    /// Upsert submissions with all their answers and grades in one transaction.
    async fn upsert_submission_batch(
        &self,
        records: &[SubmissionRecord],
    ) -> Result<(), StorageError>;

    async fn find_submission_record(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<SubmissionRecord>, StorageError>;

    async fn count_submissions(&self) -> Result<u64, StorageError>;

    /// Every `(quiz_id, user_id)` with a submission, ordered by row id.
    async fn list_submission_keys(&self) -> Result<Vec<(SubjectId, UserId)>, StorageError>;

    /// Submissions without quiz progress, answers without submission, grades without answer.
    async fn orphaned_rows(&self) -> Result<Vec<OrphanRow>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory progress repository for testing and prototyping.
#[derive(Clone)]
pub struct InMemoryProgressRepository<S: ProgressStatus> {
    clock: Clock,
    next_id: Arc<Mutex<u64>>,
    rows: Arc<Mutex<HashMap<(SubjectId, UserId), Progress<S>>>>,
}

impl<S: ProgressStatus> InMemoryProgressRepository<S> {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            next_id: Arc::new(Mutex::new(0)),
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_rows(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(SubjectId, UserId), Progress<S>>>, StorageError>
    {
        self.rows
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl<S: ProgressStatus> ProgressRepository<S> for InMemoryProgressRepository<S> {
    async fn create(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Progress<S>, StorageError> {
        let id = {
            let mut next = self
                .next_id
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            *next += 1;
            ProgressId::new(*next)
        };
        let progress = Progress::started(id, subject_id, user_id, self.clock.now());
        let mut guard = self.lock_rows()?;
        if guard.contains_key(&(subject_id, user_id)) {
            return Err(StorageError::Conflict);
        }
        guard.insert((subject_id, user_id), progress.clone());
        Ok(progress)
    }

    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<S>>, StorageError> {
        Ok(self.lock_rows()?.get(&(subject_id, user_id)).cloned())
    }

    async fn get_all(&self, subject_id: SubjectId) -> Result<Vec<Progress<S>>, StorageError> {
        let guard = self.lock_rows()?;
        let mut out: Vec<_> = guard
            .values()
            .filter(|p| p.subject_id() == subject_id)
            .cloned()
            .collect();
        out.sort_by_key(Progress::id);
        Ok(out)
    }

    async fn save(&self, progress: &mut Progress<S>) -> Result<(), StorageError> {
        progress.set_updated_at(self.clock.now());
        let mut guard = self.lock_rows()?;
        match guard.get_mut(&(progress.subject_id(), progress.user_id())) {
            Some(slot) if slot.id() == progress.id() => {
                *slot = progress.clone();
                Ok(())
            }
            _ => Err(StorageError::NotFound),
        }
    }

    async fn delete(&self, progress: &Progress<S>) -> Result<(), StorageError> {
        self.lock_rows()?
            .remove(&(progress.subject_id(), progress.user_id()));
        Ok(())
    }

    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
        self.lock_rows()?.retain(|(s, _), _| *s != subject_id);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.lock_rows()?.retain(|(_, u), _| *u != user_id);
        Ok(())
    }
}
