#![forbid(unsafe_code)]

pub mod cascade;
pub mod error;
pub mod migration;
pub mod progress_services;
pub mod validation;

pub use progress_core::Clock;

pub use cascade::DeletionCascade;
pub use error::{CascadeError, MigrationError, ProgressServicesError, TransformationError};
pub use migration::{
    Migration, MigrationConfig, MigrationState, MigrationSummary, MigrationTask,
    ProgressMigration, QuizSubmissionMigration,
};
pub use progress_services::{ProgressServices, StorageOptions};
pub use validation::{
    ProgressValidation, QuizSubmissionValidation, Validation, ValidationError, ValidationRow,
};
