//! Writes content and legacy progress rows in the host platform's layout.
//!
//! Used by the `seed` binary and by tests to stage data for the migration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use progress_core::codec::{Payload, encode_legacy_payloads, encode_legacy_points};
use progress_core::model::{LegacyRowId, QuestionId, SubjectId, UserId};
use progress_core::time::format_legacy_datetime;
use sqlx::SqlitePool;

use super::comments_repo::{ANSWERS_KEY, FEEDBACK_KEY, FINAL_GRADE_KEY, GRADES_KEY, START_KEY};
use super::content::{LESSON_COURSE_KEY, LESSON_QUIZ_KEY, PASS_REQUIRED_KEY, QUIZ_LESSON_KEY};
use super::mapping::{db_err, i64_to_u64, id_i64};
use crate::records::LegacyActivity;
use crate::repository::StorageError;

/// A quiz attempt as the legacy backend keeps it on the lesson comment.
#[derive(Debug, Clone, Default)]
pub struct LegacyAttempt {
    pub answers: BTreeMap<QuestionId, Payload>,
    pub points: BTreeMap<QuestionId, i64>,
    pub feedback: BTreeMap<QuestionId, Payload>,
    pub final_grade: Option<f64>,
}

#[derive(Clone)]
pub struct LegacySeed {
    pool: SqlitePool,
}

impl LegacySeed {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn post(&self, id: SubjectId, post_type: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO posts (id, post_type, post_status) VALUES (?1, ?2, 'publish')")
            .bind(id_i64("post_id", id.value())?)
            .bind(post_type)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn post_meta(&self, post: SubjectId, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)")
            .bind(id_i64("post_id", post.value())?)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn course(&self, id: SubjectId) -> Result<(), StorageError> {
        self.post(id, "course").await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn question(&self, id: QuestionId) -> Result<(), StorageError> {
        self.post(SubjectId::new(id.value()), "question").await
    }

    /// A lesson in `course`, optionally with its quiz and the quiz's pass-required flag.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if an insert fails.
    pub async fn lesson(
        &self,
        id: SubjectId,
        course: Option<SubjectId>,
        quiz: Option<(SubjectId, bool)>,
    ) -> Result<(), StorageError> {
        self.post(id, "lesson").await?;
        if let Some(course) = course {
            self.post_meta(id, LESSON_COURSE_KEY, &course.to_string())
                .await?;
        }
        if let Some((quiz, pass_required)) = quiz {
            self.post(quiz, "quiz").await?;
            self.post_meta(id, LESSON_QUIZ_KEY, &quiz.to_string()).await?;
            self.post_meta(quiz, QUIZ_LESSON_KEY, &id.to_string()).await?;
            if pass_required {
                self.post_meta(quiz, PASS_REQUIRED_KEY, "on").await?;
            }
        }
        Ok(())
    }

    /// Insert a raw status comment, returning its comment id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if an insert fails.
    pub async fn status_comment(
        &self,
        activity: LegacyActivity,
        post: SubjectId,
        user: UserId,
        status: &str,
        date: DateTime<Utc>,
        start: Option<DateTime<Utc>>,
    ) -> Result<LegacyRowId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO comments (comment_post_id, user_id, comment_type, comment_approved, comment_date_gmt)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id_i64("post_id", post.value())?)
        .bind(id_i64("user_id", user.value())?)
        .bind(activity.comment_type())
        .bind(status)
        .bind(format_legacy_datetime(date))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        let id = LegacyRowId::new(i64_to_u64("comment_id", res.last_insert_rowid())?);

        if let Some(start) = start {
            self.comment_meta(id, START_KEY, &format_legacy_datetime(start))
                .await?;
        }
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn comment_meta(
        &self,
        comment: LegacyRowId,
        key: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO commentmeta (comment_id, meta_key, meta_value) VALUES (?1, ?2, ?3)")
            .bind(id_i64("comment_id", comment.value())?)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Attach a quiz attempt to a lesson status comment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if an insert fails.
    pub async fn attempt(
        &self,
        comment: LegacyRowId,
        attempt: &LegacyAttempt,
    ) -> Result<(), StorageError> {
        self.comment_meta(comment, ANSWERS_KEY, &encode_legacy_payloads(&attempt.answers))
            .await?;
        if !attempt.points.is_empty() {
            self.comment_meta(comment, GRADES_KEY, &encode_legacy_points(&attempt.points))
                .await?;
        }
        if !attempt.feedback.is_empty() {
            self.comment_meta(comment, FEEDBACK_KEY, &encode_legacy_payloads(&attempt.feedback))
                .await?;
        }
        if let Some(grade) = attempt.final_grade {
            self.comment_meta(comment, FINAL_GRADE_KEY, &grade.to_string())
                .await?;
        }
        Ok(())
    }
}
