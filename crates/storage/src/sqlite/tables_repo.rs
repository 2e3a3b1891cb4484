use progress_core::model::{Progress, ProgressId, ProgressStatus, ProgressType, SubjectId, UserId};

use super::TablesRepository;
use super::content::parent_subject;
use super::mapping::{db_err, get_u64, id_i64, i64_to_u64, map_progress_record, map_progress_row};
use crate::records::ProgressRecord;
use crate::repository::{ProgressRepository, ProgressTarget, StorageError};

const PROGRESS_COLUMNS: &str = "id, subject_id, user_id, parent_subject_id, type, status, started_at, completed_at, created_at, updated_at";

/// Rows only move forward in time: an older write never replaces a newer one.
const UPSERT_PROGRESS: &str = r"
    INSERT INTO progress (subject_id, user_id, parent_subject_id, type, status, started_at, completed_at, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(subject_id, user_id, type) DO UPDATE SET
        parent_subject_id = excluded.parent_subject_id,
        status = excluded.status,
        started_at = excluded.started_at,
        completed_at = excluded.completed_at,
        created_at = MIN(progress.created_at, excluded.created_at),
        updated_at = excluded.updated_at
    WHERE excluded.updated_at >= progress.updated_at
";

#[async_trait::async_trait]
impl<S: ProgressStatus> ProgressRepository<S> for TablesRepository {
    async fn create(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Progress<S>, StorageError> {
        let parent = parent_subject(&self.pool, S::KIND, subject_id).await?;
        let now = self.clock.now();

        let res = sqlx::query(
            r"
            INSERT INTO progress (subject_id, user_id, parent_subject_id, type, status, started_at, completed_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?6, ?6)
            ",
        )
        .bind(id_i64("subject_id", subject_id.value())?)
        .bind(id_i64("user_id", user_id.value())?)
        .bind(parent.map(|p| id_i64("parent_subject_id", p.value())).transpose()?)
        .bind(S::KIND.as_str())
        .bind(S::in_progress().as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = ProgressId::new(i64_to_u64("id", res.last_insert_rowid())?);
        Ok(Progress::started(id, subject_id, user_id, now))
    }

    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<S>>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE subject_id = ?1 AND user_id = ?2 AND type = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("subject_id", subject_id.value())?)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(S::KIND.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_progress_row::<S>).transpose()
    }

    async fn get_all(&self, subject_id: SubjectId) -> Result<Vec<Progress<S>>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE subject_id = ?1 AND type = ?2 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("subject_id", subject_id.value())?)
            .bind(S::KIND.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_progress_row::<S>).collect()
    }

    async fn save(&self, progress: &mut Progress<S>) -> Result<(), StorageError> {
        progress.set_updated_at(self.clock.now());

        let res = sqlx::query(
            r"
            UPDATE progress
            SET status = ?1, started_at = ?2, completed_at = ?3, updated_at = ?4
            WHERE id = ?5 AND type = ?6
            ",
        )
        .bind(progress.status().as_str())
        .bind(progress.started_at())
        .bind(progress.completed_at())
        .bind(progress.updated_at())
        .bind(id_i64("id", progress.id().value())?)
        .bind(S::KIND.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, progress: &Progress<S>) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress WHERE id = ?1 AND type = ?2")
            .bind(id_i64("id", progress.id().value())?)
            .bind(S::KIND.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress WHERE subject_id = ?1 AND type = ?2")
            .bind(id_i64("subject_id", subject_id.value())?)
            .bind(S::KIND.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress WHERE user_id = ?1 AND type = ?2")
            .bind(id_i64("user_id", user_id.value())?)
            .bind(S::KIND.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressTarget for TablesRepository {
    async fn upsert_progress_batch(&self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in records {
            sqlx::query(UPSERT_PROGRESS)
                .bind(id_i64("subject_id", record.subject_id.value())?)
                .bind(id_i64("user_id", record.user_id.value())?)
                .bind(
                    record
                        .parent_subject_id
                        .map(|p| id_i64("parent_subject_id", p.value()))
                        .transpose()?,
                )
                .bind(record.kind.as_str())
                .bind(&record.status)
                .bind(record.started_at)
                .bind(record.completed_at)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn find_progress_record(
        &self,
        kind: ProgressType,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE subject_id = ?1 AND user_id = ?2 AND type = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("subject_id", subject_id.value())?)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_progress_record).transpose()
    }

    async fn count_progress(&self, kind: ProgressType) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM progress WHERE type = ?1")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        get_u64(&row, "n")
    }

    async fn list_progress_keys(
        &self,
        kind: ProgressType,
    ) -> Result<Vec<(SubjectId, UserId)>, StorageError> {
        let rows =
            sqlx::query("SELECT subject_id, user_id FROM progress WHERE type = ?1 ORDER BY id ASC")
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok((
                    SubjectId::new(get_u64(row, "subject_id")?),
                    UserId::new(get_u64(row, "user_id")?),
                ))
            })
            .collect()
    }
}
