use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use progress_core::Clock;
use progress_core::model::{CourseStatus, LessonStatus, ProgressStatus, QuizStatus};

use crate::aggregate::AggregateProgressRepository;
use crate::repository::{
    AnswerRepository, GradeRepository, ProgressRepository, SubmissionRepository,
};
use crate::sqlite::{SqliteDatabase, SqliteInitError};

/// Which representation serves progress reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressBackend {
    #[default]
    Comments,
    Tables,
}

impl ProgressBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressBackend::Comments => "comments",
            ProgressBackend::Tables => "tables",
        }
    }
}

impl fmt::Display for ProgressBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "comments" => Ok(Self::Comments),
            "tables" => Ok(Self::Tables),
            other => Err(format!("unknown progress backend: {other}")),
        }
    }
}

/// Aggregates the live repositories behind trait objects; the composition root.
#[derive(Clone)]
pub struct ProgressStorage {
    pub courses: Arc<dyn ProgressRepository<CourseStatus>>,
    pub lessons: Arc<dyn ProgressRepository<LessonStatus>>,
    pub quizzes: Arc<dyn ProgressRepository<QuizStatus>>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub grades: Arc<dyn GradeRepository>,
}

fn select<S: ProgressStatus>(
    comments: Arc<dyn ProgressRepository<S>>,
    tables: Arc<dyn ProgressRepository<S>>,
    backend: ProgressBackend,
    sync: bool,
) -> Arc<dyn ProgressRepository<S>> {
    match (backend, sync) {
        (_, true) => Arc::new(AggregateProgressRepository::new(comments, tables, backend)),
        (ProgressBackend::Comments, false) => comments,
        (ProgressBackend::Tables, false) => tables,
    }
}

impl ProgressStorage {
    /// Wire repositories over an open database.
    ///
    /// With `sync` enabled every progress write lands in both representations
    /// while reads are served by `backend`.
    #[must_use]
    pub fn build(db: &SqliteDatabase, backend: ProgressBackend, sync: bool) -> Self {
        let comments = Arc::new(db.comments());
        let tables = Arc::new(db.tables());

        Self {
            courses: select::<CourseStatus>(comments.clone(), tables.clone(), backend, sync),
            lessons: select::<LessonStatus>(comments.clone(), tables.clone(), backend, sync),
            quizzes: select::<QuizStatus>(comments, tables.clone(), backend, sync),
            submissions: tables.clone(),
            answers: tables.clone(),
            grades: tables,
        }
    }

    /// Build a `ProgressStorage` backed by `SQLite`, installing the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or schema bootstrap fails.
    pub async fn sqlite(
        database_url: &str,
        clock: Clock,
        backend: ProgressBackend,
        sync: bool,
    ) -> Result<Self, SqliteInitError> {
        let db = SqliteDatabase::connect(database_url).await?.with_clock(clock);
        db.migrate().await?;
        Ok(Self::build(&db, backend, sync))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_from_config_strings() {
        assert_eq!("tables".parse::<ProgressBackend>(), Ok(ProgressBackend::Tables));
        assert_eq!(" comments ".parse::<ProgressBackend>(), Ok(ProgressBackend::Comments));
        assert!("mysql".parse::<ProgressBackend>().is_err());
        assert_eq!(ProgressBackend::default().to_string(), "comments");
    }
}
