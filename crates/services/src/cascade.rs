use std::sync::Arc;

use progress_core::model::{CourseStatus, LessonStatus, QuizStatus, SubjectId, UserId};
use storage::ProgressStorage;
use storage::repository::{ProgressRepository, SubmissionRepository};
use tracing::info;

use crate::error::CascadeError;

/// Removes progress when a subject or a learner is deleted from the host platform.
#[derive(Clone)]
pub struct DeletionCascade {
    courses: Arc<dyn ProgressRepository<CourseStatus>>,
    lessons: Arc<dyn ProgressRepository<LessonStatus>>,
    quizzes: Arc<dyn ProgressRepository<QuizStatus>>,
    submissions: Arc<dyn SubmissionRepository>,
}

impl DeletionCascade {
    #[must_use]
    pub fn new(
        courses: Arc<dyn ProgressRepository<CourseStatus>>,
        lessons: Arc<dyn ProgressRepository<LessonStatus>>,
        quizzes: Arc<dyn ProgressRepository<QuizStatus>>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            courses,
            lessons,
            quizzes,
            submissions,
        }
    }

    #[must_use]
    pub fn from_storage(storage: &ProgressStorage) -> Self {
        Self::new(
            Arc::clone(&storage.courses),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.submissions),
        )
    }

    /// # Errors
    ///
    /// Returns `CascadeError` if the repository delete fails.
    pub async fn course_deleted(&self, course_id: SubjectId) -> Result<(), CascadeError> {
        self.courses.delete_for_subject(course_id).await?;
        info!(course_id = %course_id, "deleted course progress");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `CascadeError` if the repository delete fails.
    pub async fn lesson_deleted(&self, lesson_id: SubjectId) -> Result<(), CascadeError> {
        self.lessons.delete_for_subject(lesson_id).await?;
        info!(lesson_id = %lesson_id, "deleted lesson progress");
        Ok(())
    }

    /// Drops quiz progress and every submission for the quiz.
    ///
    /// # Errors
    ///
    /// Returns `CascadeError` if a repository delete fails.
    pub async fn quiz_deleted(&self, quiz_id: SubjectId) -> Result<(), CascadeError> {
        self.quizzes.delete_for_subject(quiz_id).await?;
        self.submissions.delete_for_quiz(quiz_id).await?;
        info!(quiz_id = %quiz_id, "deleted quiz progress and submissions");
        Ok(())
    }

    /// Drops all of a learner's progress and submissions.
    ///
    /// # Errors
    ///
    /// Returns `CascadeError` if a repository delete fails.
    pub async fn user_deleted(&self, user_id: UserId) -> Result<(), CascadeError> {
        self.quizzes.delete_for_user(user_id).await?;
        self.lessons.delete_for_user(user_id).await?;
        self.courses.delete_for_user(user_id).await?;
        self.submissions.delete_for_user(user_id).await?;
        info!(user_id = %user_id, "deleted learner progress");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use progress_core::model::{Progress, ProgressStatus, Submission};
    use storage::repository::StorageError;

    /// Records every bulk delete it receives.
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn record(&self, call: String) -> Result<(), StorageError> {
            self.calls
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?
                .push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<S: ProgressStatus> ProgressRepository<S> for Recorder {
        async fn create(&self, _: SubjectId, _: UserId) -> Result<Progress<S>, StorageError> {
            Err(StorageError::NotFound)
        }

        async fn get(&self, _: SubjectId, _: UserId) -> Result<Option<Progress<S>>, StorageError> {
            Ok(None)
        }

        async fn get_all(&self, _: SubjectId) -> Result<Vec<Progress<S>>, StorageError> {
            Ok(Vec::new())
        }

        async fn save(&self, _: &mut Progress<S>) -> Result<(), StorageError> {
            Ok(())
        }

        async fn delete(&self, _: &Progress<S>) -> Result<(), StorageError> {
            Ok(())
        }

        async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
            self.record(format!("{}:subject:{subject_id}", S::KIND))
        }

        async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
            self.record(format!("{}:user:{user_id}", S::KIND))
        }
    }

    #[async_trait]
    impl SubmissionRepository for Recorder {
        async fn create(
            &self,
            _: SubjectId,
            _: UserId,
            _: Option<f64>,
        ) -> Result<Submission, StorageError> {
            Err(StorageError::NotFound)
        }

        async fn get(&self, _: SubjectId, _: UserId) -> Result<Option<Submission>, StorageError> {
            Ok(None)
        }

        async fn save(&self, _: &mut Submission) -> Result<(), StorageError> {
            Ok(())
        }

        async fn delete(&self, _: &Submission) -> Result<(), StorageError> {
            Ok(())
        }

        async fn delete_for_quiz(&self, quiz_id: SubjectId) -> Result<(), StorageError> {
            self.record(format!("submissions:quiz:{quiz_id}"))
        }

        async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
            self.record(format!("submissions:user:{user_id}"))
        }
    }

    fn cascade(recorder: &Recorder) -> DeletionCascade {
        DeletionCascade::new(
            Arc::new(recorder.clone()),
            Arc::new(recorder.clone()),
            Arc::new(recorder.clone()),
            Arc::new(recorder.clone()),
        )
    }

    #[tokio::test]
    async fn subject_deletes_hit_one_repository_once() {
        let recorder = Recorder::default();
        let cascade = cascade(&recorder);

        cascade.course_deleted(SubjectId::new(10)).await.unwrap();
        cascade.lesson_deleted(SubjectId::new(20)).await.unwrap();
        cascade.quiz_deleted(SubjectId::new(30)).await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                "course:subject:10",
                "lesson:subject:20",
                "quiz:subject:30",
                "submissions:quiz:30",
            ]
        );
    }

    #[tokio::test]
    async fn user_delete_reaches_every_repository() {
        let recorder = Recorder::default();
        cascade(&recorder).user_deleted(UserId::new(7)).await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                "quiz:user:7",
                "lesson:user:7",
                "course:user:7",
                "submissions:user:7",
            ]
        );
    }
}
