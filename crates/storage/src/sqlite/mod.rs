use std::time::Duration;

use progress_core::Clock;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

mod checkpoint_store;
mod comments_repo;
mod content;
mod legacy_seed;
mod legacy_source;
mod mapping;
mod schema;
mod submission_repo;
mod tables_repo;

pub use checkpoint_store::SqliteCheckpointStore;
pub use legacy_seed::{LegacyAttempt, LegacySeed};

/// Connection to the site database, holding both the legacy comment tables
/// and the dedicated progress tables.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    clock: Clock,
}

/// Progress stored as typed comments and comment metadata (the legacy backend).
#[derive(Clone)]
pub struct CommentsRepository {
    pool: SqlitePool,
    clock: Clock,
}

/// Progress and quiz submissions stored in the dedicated tables.
#[derive(Clone)]
pub struct TablesRepository {
    pool: SqlitePool,
    clock: Clock,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteDatabase {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// enforcing foreign key constraints fails during setup.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self {
            pool,
            clock: Clock::default(),
        })
    }

    /// Override the clock used to stamp created/updated times.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the legacy and the progress tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        schema::run_migrations(&self.pool).await
    }

    #[must_use]
    pub fn comments(&self) -> CommentsRepository {
        CommentsRepository {
            pool: self.pool.clone(),
            clock: self.clock,
        }
    }

    #[must_use]
    pub fn tables(&self) -> TablesRepository {
        TablesRepository {
            pool: self.pool.clone(),
            clock: self.clock,
        }
    }

    #[must_use]
    pub fn checkpoints(&self) -> SqliteCheckpointStore {
        SqliteCheckpointStore::new(self.pool.clone(), self.clock)
    }

    /// Writer for content and legacy progress rows.
    #[must_use]
    pub fn legacy_seed(&self) -> LegacySeed {
        LegacySeed::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repositories_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommentsRepository>();
        assert_send_sync::<TablesRepository>();
        assert_send_sync::<SqliteCheckpointStore>();
    }
}
