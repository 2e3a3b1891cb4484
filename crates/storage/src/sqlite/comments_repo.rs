//! Legacy backend: progress kept as typed status comments.
//!
//! Course progress is a `sensei_course_status` comment on the course post.
//! Lesson and quiz progress share the `sensei_lesson_status` comment on the
//! lesson post; quiz progress finds its lesson through `_quiz_lesson`.
//! Dates are stored as GMT strings with second precision.

use chrono::{DateTime, SubsecRound, Utc};
use progress_core::model::{
    CourseStatus, LessonStatus, Progress, ProgressId, ProgressStatus, QuizStatus, SubjectId,
    UserId,
};
use progress_core::status::{
    LegacyStatus, LessonContext, normalize_course_status, normalize_lesson_status,
    normalize_quiz_status,
};
use progress_core::time::{format_legacy_datetime, parse_legacy_datetime};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::CommentsRepository;
use super::content::{lesson_context, quiz_lesson};
use super::mapping::{db_err, get_u64, id_i64, ser};
use crate::records::LegacyActivity;
use crate::repository::{ProgressRepository, StorageError};

pub(crate) const START_KEY: &str = "start";
pub(crate) const ANSWERS_KEY: &str = "quiz_answers";
pub(crate) const GRADES_KEY: &str = "quiz_grades";
pub(crate) const FEEDBACK_KEY: &str = "quiz_answers_feedback";
pub(crate) const FINAL_GRADE_KEY: &str = "grade";

const SELECT_STATUS_COMMENT: &str = r"
    SELECT c.comment_id, c.comment_post_id, c.user_id, c.comment_approved, c.comment_date_gmt,
        (SELECT m.meta_value FROM commentmeta m
            WHERE m.comment_id = c.comment_id AND m.meta_key = 'start'
            ORDER BY m.meta_id DESC LIMIT 1) AS start
    FROM comments c
";

/// Among duplicate status comments for one key the newest wins, the same row
/// the tables upsert keeps.
const NEWEST_FIRST: &str = "c.comment_date_gmt DESC, c.comment_id DESC";

const LATEST_FOR_KEY: &str = r"(
    SELECT d.comment_id FROM comments d
    WHERE d.comment_type = c.comment_type
      AND d.comment_post_id = c.comment_post_id
      AND d.user_id = c.user_id
    ORDER BY d.comment_date_gmt DESC, d.comment_id DESC
    LIMIT 1)";

struct StatusComment {
    comment_id: u64,
    user_id: UserId,
    status: String,
    date: String,
    start: Option<String>,
}

fn status_comment(row: &SqliteRow) -> Result<StatusComment, StorageError> {
    Ok(StatusComment {
        comment_id: get_u64(row, "comment_id")?,
        user_id: UserId::new(get_u64(row, "user_id")?),
        status: row.try_get("comment_approved").map_err(ser)?,
        date: row.try_get("comment_date_gmt").map_err(ser)?,
        start: row.try_get("start").map_err(ser)?,
    })
}

impl StatusComment {
    fn into_progress<S: ProgressStatus>(
        self,
        subject_id: SubjectId,
        status: S,
    ) -> Result<Progress<S>, StorageError> {
        let date = parse_legacy_datetime(&self.date).ok_or_else(|| {
            StorageError::Serialization(format!("invalid comment date: {}", self.date))
        })?;
        let started_at = self.start.as_deref().and_then(parse_legacy_datetime);
        let created_at = started_at.map_or(date, |start| start.min(date));

        Progress::from_persisted(
            ProgressId::new(self.comment_id),
            subject_id,
            self.user_id,
            status,
            started_at,
            status.carries_completion().then_some(date),
            created_at,
            date,
        )
        .map_err(ser)
    }
}

fn lesson_progress(
    comment: StatusComment,
    lesson_id: SubjectId,
    ctx: LessonContext,
) -> Result<Progress<LessonStatus>, StorageError> {
    let status = normalize_lesson_status(&comment.status, ctx);
    comment.into_progress(lesson_id, status)
}

/// Which status comments a bulk statement targets.
#[derive(Clone, Copy)]
enum Scope {
    Comment(u64),
    Post(SubjectId),
    User(UserId),
}

impl Scope {
    fn column(self) -> &'static str {
        match self {
            Scope::Comment(_) => "comment_id",
            Scope::Post(_) => "comment_post_id",
            Scope::User(_) => "user_id",
        }
    }

    fn value(self) -> Result<i64, StorageError> {
        match self {
            Scope::Comment(id) => id_i64("comment_id", id),
            Scope::Post(id) => id_i64("comment_post_id", id.value()),
            Scope::User(id) => id_i64("user_id", id.value()),
        }
    }
}

async fn replace_meta(
    conn: &mut SqliteConnection,
    comment_id: i64,
    key: &str,
    value: Option<String>,
) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM commentmeta WHERE comment_id = ?1 AND meta_key = ?2")
        .bind(comment_id)
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    if let Some(value) = value {
        sqlx::query("INSERT INTO commentmeta (comment_id, meta_key, meta_value) VALUES (?1, ?2, ?3)")
            .bind(comment_id)
            .bind(key)
            .bind(value)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

impl CommentsRepository {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(0)
    }

    async fn find_comment(
        &self,
        activity: LegacyActivity,
        post_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<StatusComment>, StorageError> {
        let sql = format!(
            "{SELECT_STATUS_COMMENT}
            WHERE c.comment_type = ?1 AND c.comment_post_id = ?2 AND c.user_id = ?3
            ORDER BY {NEWEST_FIRST}
            LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(activity.comment_type())
            .bind(id_i64("post_id", post_id.value())?)
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(status_comment).transpose()
    }

    async fn comments_for_post(
        &self,
        activity: LegacyActivity,
        post_id: SubjectId,
    ) -> Result<Vec<StatusComment>, StorageError> {
        let sql = format!(
            "{SELECT_STATUS_COMMENT}
            WHERE c.comment_type = ?1 AND c.comment_post_id = ?2
              AND c.comment_id = {LATEST_FOR_KEY}
            ORDER BY c.comment_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(activity.comment_type())
            .bind(id_i64("post_id", post_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(status_comment).collect()
    }

    async fn raw_status(&self, comment_id: u64) -> Result<String, StorageError> {
        let row = sqlx::query("SELECT comment_approved FROM comments WHERE comment_id = ?1")
            .bind(id_i64("comment_id", comment_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        row.try_get("comment_approved").map_err(ser)
    }

    /// Insert a fresh in-progress status comment with its `start` meta.
    async fn insert_comment(
        &self,
        activity: LegacyActivity,
        post_id: SubjectId,
        user_id: UserId,
    ) -> Result<(ProgressId, DateTime<Utc>), StorageError> {
        let now = self.now();
        let post = id_i64("post_id", post_id.value())?;
        let user = id_i64("user_id", user_id.value())?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let exists = sqlx::query(
            "SELECT 1 FROM comments WHERE comment_type = ?1 AND comment_post_id = ?2 AND user_id = ?3",
        )
        .bind(activity.comment_type())
        .bind(post)
        .bind(user)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .is_some();
        if exists {
            return Err(StorageError::Conflict);
        }

        let res = sqlx::query(
            r"
            INSERT INTO comments (comment_post_id, user_id, comment_type, comment_approved, comment_date_gmt)
            VALUES (?1, ?2, ?3, 'in-progress', ?4)
            ",
        )
        .bind(post)
        .bind(user)
        .bind(activity.comment_type())
        .bind(format_legacy_datetime(now))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let comment_id = res.last_insert_rowid();

        replace_meta(&mut tx, comment_id, START_KEY, Some(format_legacy_datetime(now))).await?;
        tx.commit().await.map_err(db_err)?;

        let id = u64::try_from(comment_id)
            .map_err(|_| StorageError::Serialization("comment_id sign overflow".into()))?;
        Ok((ProgressId::new(id), now))
    }

    /// Write status, date and `start` back onto an existing comment.
    async fn write_status<S: ProgressStatus>(
        &self,
        activity: LegacyActivity,
        post_id: SubjectId,
        progress: &mut Progress<S>,
        raw_status: &str,
    ) -> Result<(), StorageError> {
        let now = self.now();
        progress.set_updated_at(now);
        let date = if progress.status().carries_completion() {
            progress.completed_at().unwrap_or(now)
        } else {
            now
        };
        let comment_id = id_i64("comment_id", progress.id().value())?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let res = sqlx::query(
            r"
            UPDATE comments SET comment_approved = ?1, comment_date_gmt = ?2
            WHERE comment_id = ?3 AND comment_type = ?4 AND comment_post_id = ?5 AND user_id = ?6
            ",
        )
        .bind(raw_status)
        .bind(format_legacy_datetime(date))
        .bind(comment_id)
        .bind(activity.comment_type())
        .bind(id_i64("post_id", post_id.value())?)
        .bind(id_i64("user_id", progress.user_id().value())?)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        replace_meta(
            &mut tx,
            comment_id,
            START_KEY,
            progress.started_at().map(format_legacy_datetime),
        )
        .await?;
        tx.commit().await.map_err(db_err)
    }

    async fn delete_comments(
        &self,
        activity: LegacyActivity,
        scope: Scope,
    ) -> Result<(), StorageError> {
        let column = scope.column();
        let value = scope.value()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(&format!(
            r"
            DELETE FROM commentmeta WHERE comment_id IN (
                SELECT comment_id FROM comments WHERE comment_type = ?1 AND {column} = ?2
            )
            "
        ))
        .bind(activity.comment_type())
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let res = sqlx::query(&format!(
            "DELETE FROM comments WHERE comment_type = ?1 AND {column} = ?2"
        ))
        .bind(activity.comment_type())
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        tracing::debug!(
            comment_type = activity.comment_type(),
            scope = column,
            deleted = res.rows_affected(),
            "deleted legacy status comments"
        );
        Ok(())
    }

    /// Drop quiz attempt metadata from lesson comments, optionally reopening them.
    async fn clear_attempts(&self, scope: Scope, reset_status: bool) -> Result<(), StorageError> {
        let column = scope.column();
        let value = scope.value()?;
        let lesson_type = LegacyActivity::LessonStatus.comment_type();

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(&format!(
            r"
            DELETE FROM commentmeta
            WHERE meta_key IN (?1, ?2, ?3, ?4)
              AND comment_id IN (
                SELECT comment_id FROM comments WHERE comment_type = ?5 AND {column} = ?6
              )
            "
        ))
        .bind(ANSWERS_KEY)
        .bind(GRADES_KEY)
        .bind(FEEDBACK_KEY)
        .bind(FINAL_GRADE_KEY)
        .bind(lesson_type)
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if reset_status {
            sqlx::query(&format!(
                "UPDATE comments SET comment_approved = 'in-progress' WHERE comment_type = ?1 AND {column} = ?2"
            ))
            .bind(lesson_type)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

#[async_trait::async_trait]
impl ProgressRepository<CourseStatus> for CommentsRepository {
    async fn create(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Progress<CourseStatus>, StorageError> {
        let (id, now) = self
            .insert_comment(LegacyActivity::CourseStatus, subject_id, user_id)
            .await?;
        Ok(Progress::started(id, subject_id, user_id, now))
    }

    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<CourseStatus>>, StorageError> {
        match self
            .find_comment(LegacyActivity::CourseStatus, subject_id, user_id)
            .await?
        {
            Some(comment) => {
                let status = normalize_course_status(&comment.status);
                comment.into_progress(subject_id, status).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn get_all(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Progress<CourseStatus>>, StorageError> {
        self.comments_for_post(LegacyActivity::CourseStatus, subject_id)
            .await?
            .into_iter()
            .map(|comment| {
                let status = normalize_course_status(&comment.status);
                comment.into_progress(subject_id, status)
            })
            .collect()
    }

    async fn save(&self, progress: &mut Progress<CourseStatus>) -> Result<(), StorageError> {
        let raw = progress.status().as_str();
        let subject_id = progress.subject_id();
        self.write_status(LegacyActivity::CourseStatus, subject_id, progress, raw)
            .await
    }

    async fn delete(&self, progress: &Progress<CourseStatus>) -> Result<(), StorageError> {
        self.delete_comments(
            LegacyActivity::CourseStatus,
            Scope::Comment(progress.id().value()),
        )
        .await
    }

    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
        self.delete_comments(LegacyActivity::CourseStatus, Scope::Post(subject_id))
            .await
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.delete_comments(LegacyActivity::CourseStatus, Scope::User(user_id))
            .await
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

#[async_trait::async_trait]
impl ProgressRepository<LessonStatus> for CommentsRepository {
    async fn create(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Progress<LessonStatus>, StorageError> {
        let (id, now) = self
            .insert_comment(LegacyActivity::LessonStatus, subject_id, user_id)
            .await?;
        Ok(Progress::started(id, subject_id, user_id, now))
    }

    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<LessonStatus>>, StorageError> {
        let Some(comment) = self
            .find_comment(LegacyActivity::LessonStatus, subject_id, user_id)
            .await?
        else {
            return Ok(None);
        };
        let ctx = lesson_context(&self.pool, subject_id).await?;
        lesson_progress(comment, subject_id, ctx).map(Some)
    }

    async fn get_all(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Progress<LessonStatus>>, StorageError> {
        let ctx = lesson_context(&self.pool, subject_id).await?;
        self.comments_for_post(LegacyActivity::LessonStatus, subject_id)
            .await?
            .into_iter()
            .map(|comment| lesson_progress(comment, subject_id, ctx))
            .collect()
    }

    async fn save(&self, progress: &mut Progress<LessonStatus>) -> Result<(), StorageError> {
        let subject_id = progress.subject_id();
        let ctx = lesson_context(&self.pool, subject_id).await?;
        let current = self.raw_status(progress.id().value()).await?;

        // Keep quiz outcomes on the shared comment unless the lesson view changes.
        let raw = if normalize_lesson_status(&current, ctx) == progress.status() {
            current
        } else {
            progress.status().as_str().to_owned()
        };
        self.write_status(LegacyActivity::LessonStatus, subject_id, progress, &raw)
            .await
    }

    async fn delete(&self, progress: &Progress<LessonStatus>) -> Result<(), StorageError> {
        self.delete_comments(
            LegacyActivity::LessonStatus,
            Scope::Comment(progress.id().value()),
        )
        .await
    }

    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
        self.delete_comments(LegacyActivity::LessonStatus, Scope::Post(subject_id))
            .await
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.delete_comments(LegacyActivity::LessonStatus, Scope::User(user_id))
            .await
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

#[async_trait::async_trait]
impl ProgressRepository<QuizStatus> for CommentsRepository {
    async fn create(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Progress<QuizStatus>, StorageError> {
        let lesson_id = quiz_lesson(&self.pool, subject_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let (id, now) = self
            .insert_comment(LegacyActivity::LessonStatus, lesson_id, user_id)
            .await?;
        Ok(Progress::started(id, subject_id, user_id, now))
    }

    async fn get(
        &self,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Progress<QuizStatus>>, StorageError> {
        let Some(lesson_id) = quiz_lesson(&self.pool, subject_id).await? else {
            return Ok(None);
        };
        match self
            .find_comment(LegacyActivity::LessonStatus, lesson_id, user_id)
            .await?
        {
            Some(comment) => {
                let status = normalize_quiz_status(&comment.status);
                comment.into_progress(subject_id, status).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn get_all(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Progress<QuizStatus>>, StorageError> {
        let Some(lesson_id) = quiz_lesson(&self.pool, subject_id).await? else {
            return Ok(Vec::new());
        };
        self.comments_for_post(LegacyActivity::LessonStatus, lesson_id)
            .await?
            .into_iter()
            .map(|comment| {
                let status = normalize_quiz_status(&comment.status);
                comment.into_progress(subject_id, status)
            })
            .collect()
    }

    async fn save(&self, progress: &mut Progress<QuizStatus>) -> Result<(), StorageError> {
        let lesson_id = quiz_lesson(&self.pool, progress.subject_id())
            .await?
            .ok_or(StorageError::NotFound)?;
        let current = self.raw_status(progress.id().value()).await?;

        let raw = match (progress.status(), LegacyStatus::parse(&current)) {
            (QuizStatus::Passed, LegacyStatus::Complete) => current,
            (status, _) => status.as_str().to_owned(),
        };
        self.write_status(LegacyActivity::LessonStatus, lesson_id, progress, &raw)
            .await
    }

    /// Quiz progress lives on the lesson comment; deleting it only clears the attempt.
    async fn delete(&self, progress: &Progress<QuizStatus>) -> Result<(), StorageError> {
        self.clear_attempts(Scope::Comment(progress.id().value()), true)
            .await
    }

    async fn delete_for_subject(&self, subject_id: SubjectId) -> Result<(), StorageError> {
        match quiz_lesson(&self.pool, subject_id).await? {
            Some(lesson_id) => self.clear_attempts(Scope::Post(lesson_id), true).await,
            None => Ok(()),
        }
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.clear_attempts(Scope::User(user_id), false).await
    }
}
