//! Dual-write repository used while both representations are live.

use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{Progress, ProgressStatus, SubjectId, UserId};
use tracing::warn;

use crate::backend::ProgressBackend;
use crate::repository::{ProgressRepository, StorageError};

/// Reads from the primary backend and mirrors every write onto the other one.
///
/// Mirror failures are logged but never fail the live write; the migration
/// catch-up run and validation close such gaps.
pub struct AggregateProgressRepository<S: ProgressStatus> {
    primary: Arc<dyn ProgressRepository<S>>,
    secondary: Arc<dyn ProgressRepository<S>>,
    secondary_name: &'static str,
}

impl<S: ProgressStatus> AggregateProgressRepository<S> {
    #[must_use]
    pub fn new(
        comments: Arc<dyn ProgressRepository<S>>,
        tables: Arc<dyn ProgressRepository<S>>,
        read_from: ProgressBackend,
    ) -> Self {
        match read_from {
            ProgressBackend::Comments => Self {
                primary: comments,
                secondary: tables,
                secondary_name: ProgressBackend::Tables.as_str(),
            },
            ProgressBackend::Tables => Self {
                primary: tables,
                secondary: comments,
                secondary_name: ProgressBackend::Comments.as_str(),
            },
        }
    }

    async fn mirror(&self, progress: &Progress<S>) {
        if let Err(err) = self.try_mirror(progress).await {
            warn!(
                kind = %S::KIND,
                subject_id = %progress.subject_id(),
                user_id = %progress.user_id(),
                backend = self.secondary_name,
                error = %err,
                "failed to mirror progress write"
            );
        }
    }

    async fn try_mirror(&self, progress: &Progress<S>) -> Result<(), StorageError> {
        let mut other = match self
            .secondary
            .get(progress.subject_id(), progress.user_id())
            .await?
        {
            Some(existing) => existing,
            None => {
                self.secondary
                    .create(progress.subject_id(), progress.user_id())
                    .await?
            }
        };
        other.sync_state_from(progress);
        self.secondary.save(&mut other).await
    }
}

#[async_trait]
impl<S: ProgressStatus> ProgressRepository<S> for AggregateProgressRepository<S> {
    async fn create(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Progress<S>, StorageError> {
        let progress = self.primary.create(subject_id, user_id).await?;
        self.mirror(&progress).await;
        Ok(progress)
    }

    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<S>>, StorageError> {
        self.primary.get(subject_id, user_id).await
    }

    async fn get_all(&self, subject_id: SubjectId) -> Result<Vec<Progress<S>>, StorageError> {
        self.primary.get_all(subject_id).await
    }

    async fn save(&self, progress: &mut Progress<S>) -> Result<(), StorageError> {
        self.primary.save(progress).await?;
        self.mirror(progress).await;
        Ok(())
    }

    async fn delete(&self, progress: &Progress<S>) -> Result<(), StorageError> {
        self.primary.delete(progress).await?;
        if let Some(other) = self
            .secondary
            .get(progress.subject_id(), progress.user_id())
            .await?
        {
            self.secondary.delete(&other).await?;
        }
        Ok(())
    }

    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
        self.primary.delete_for_subject(subject_id).await?;
        self.secondary.delete_for_subject(subject_id).await
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.primary.delete_for_user(user_id).await?;
        self.secondary.delete_for_user(user_id).await
    }
}
