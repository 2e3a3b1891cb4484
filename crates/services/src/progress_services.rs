use std::sync::Arc;

use storage::sqlite::SqliteDatabase;
use storage::{Checkpoint, ProgressBackend, ProgressStorage};

use crate::Clock;
use crate::cascade::DeletionCascade;
use crate::error::ProgressServicesError;
use crate::migration::{
    Migration, MigrationConfig, ProgressMigration, QuizSubmissionMigration,
};
use crate::validation::{ProgressValidation, QuizSubmissionValidation};

/// Where the services read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageOptions {
    pub backend: ProgressBackend,
    /// Mirror live progress writes into both representations.
    pub sync: bool,
    /// Install the schema before use.
    pub bootstrap_schema: bool,
}

/// Assembles migration, validation and cascade services over one database.
#[derive(Clone)]
pub struct ProgressServices {
    db: SqliteDatabase,
    storage: ProgressStorage,
    checkpoints: Arc<dyn Checkpoint>,
}

impl ProgressServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServicesError` if connecting or installing the schema fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        options: StorageOptions,
    ) -> Result<Self, ProgressServicesError> {
        let db = SqliteDatabase::connect(db_url).await?.with_clock(clock);
        if options.bootstrap_schema {
            db.migrate().await?;
        }
        let storage = ProgressStorage::build(&db, options.backend, options.sync);
        let checkpoints: Arc<dyn Checkpoint> = Arc::new(db.checkpoints());

        Ok(Self {
            db,
            storage,
            checkpoints,
        })
    }

    #[must_use]
    pub fn storage(&self) -> &ProgressStorage {
        &self.storage
    }

    #[must_use]
    pub fn progress_migration(&self, config: MigrationConfig) -> Migration<ProgressMigration> {
        let task = ProgressMigration::new(Arc::new(self.db.comments()), Arc::new(self.db.tables()));
        Migration::new(task, Arc::clone(&self.checkpoints), config)
    }

    #[must_use]
    pub fn quiz_submission_migration(
        &self,
        config: MigrationConfig,
    ) -> Migration<QuizSubmissionMigration> {
        let task =
            QuizSubmissionMigration::new(Arc::new(self.db.comments()), Arc::new(self.db.tables()));
        Migration::new(task, Arc::clone(&self.checkpoints), config)
    }

    #[must_use]
    pub fn progress_validation(&self) -> ProgressValidation {
        ProgressValidation::new(Arc::new(self.db.comments()), Arc::new(self.db.tables()))
    }

    #[must_use]
    pub fn quiz_submission_validation(&self) -> QuizSubmissionValidation {
        QuizSubmissionValidation::new(Arc::new(self.db.comments()), Arc::new(self.db.tables()))
    }

    #[must_use]
    pub fn cascade(&self) -> DeletionCascade {
        DeletionCascade::from_storage(&self.storage)
    }
}
