use progress_core::Clock;
use progress_core::model::LegacyRowId;
use sqlx::SqlitePool;

use super::mapping::{db_err, get_u64, id_i64};
use crate::checkpoint::Checkpoint;
use crate::repository::StorageError;

/// Migration cursors kept in the `migration_checkpoints` table.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    clock: Clock,
}

impl SqliteCheckpointStore {
    #[must_use]
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        Self { pool, clock }
    }
}

#[async_trait::async_trait]
impl Checkpoint for SqliteCheckpointStore {
    async fn load(&self, name: &str) -> Result<LegacyRowId, StorageError> {
        let row = sqlx::query("SELECT last_id FROM migration_checkpoints WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(LegacyRowId::new(get_u64(&row, "last_id")?)),
            None => Ok(LegacyRowId::START),
        }
    }

    async fn store(&self, name: &str, last_id: LegacyRowId) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO migration_checkpoints (name, last_id, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                last_id = excluded.last_id,
                updated_at = excluded.updated_at
            ",
        )
        .bind(name)
        .bind(id_i64("last_id", last_id.value())?)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::debug!(checkpoint = name, last_id = last_id.value(), "stored migration cursor");
        Ok(())
    }
}
