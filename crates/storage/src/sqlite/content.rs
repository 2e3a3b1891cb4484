//! Lookups against the host platform's content tables (posts and post metadata).
//!
//! Both backends need them: the legacy backend to resolve a quiz's lesson and
//! the pass-required flag, the tables backend to fill `parent_subject_id`.

use progress_core::model::{ProgressType, SubjectId};
use progress_core::status::LessonContext;
use sqlx::{Row, SqlitePool};

use super::mapping::{db_err, id_i64, meta_id, ser};
use crate::records::LessonLinks;
use crate::repository::StorageError;

pub(crate) const LESSON_COURSE_KEY: &str = "_lesson_course";
pub(crate) const LESSON_QUIZ_KEY: &str = "_lesson_quiz";
pub(crate) const QUIZ_LESSON_KEY: &str = "_quiz_lesson";
pub(crate) const PASS_REQUIRED_KEY: &str = "_pass_required";

async fn post_meta(
    pool: &SqlitePool,
    post_id: SubjectId,
    key: &str,
) -> Result<Option<String>, StorageError> {
    let row = sqlx::query(
        r"
            SELECT meta_value FROM postmeta
            WHERE post_id = ?1 AND meta_key = ?2
            ORDER BY meta_id ASC
            LIMIT 1
        ",
    )
    .bind(id_i64("post_id", post_id.value())?)
    .bind(key)
    .fetch_optional(pool)
    .await
    .map_err(db_err)?;

    row.map(|r| r.try_get::<Option<String>, _>("meta_value").map_err(ser))
        .transpose()
        .map(Option::flatten)
}

/// Stored as `"on"` when the quiz must be passed.
pub(crate) fn is_pass_required(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("on" | "1" | "yes"))
}

pub(crate) async fn quiz_lesson(
    pool: &SqlitePool,
    quiz_id: SubjectId,
) -> Result<Option<SubjectId>, StorageError> {
    Ok(meta_id(post_meta(pool, quiz_id, QUIZ_LESSON_KEY).await?.as_deref()))
}

pub(crate) async fn lesson_links(
    pool: &SqlitePool,
    lesson_id: SubjectId,
) -> Result<LessonLinks, StorageError> {
    let course_id = meta_id(post_meta(pool, lesson_id, LESSON_COURSE_KEY).await?.as_deref());
    let quiz_id = meta_id(post_meta(pool, lesson_id, LESSON_QUIZ_KEY).await?.as_deref());
    let quiz_pass_required = match quiz_id {
        Some(quiz) => is_pass_required(post_meta(pool, quiz, PASS_REQUIRED_KEY).await?.as_deref()),
        None => false,
    };
    Ok(LessonLinks {
        course_id,
        quiz_id,
        quiz_pass_required,
    })
}

/// Normalization context for a lesson, read at query time.
pub(crate) async fn lesson_context(
    pool: &SqlitePool,
    lesson_id: SubjectId,
) -> Result<LessonContext, StorageError> {
    let links = lesson_links(pool, lesson_id).await?;
    Ok(LessonContext {
        pass_required: links.quiz_pass_required,
    })
}

/// The lesson's course or the quiz's lesson; courses have no parent.
pub(crate) async fn parent_subject(
    pool: &SqlitePool,
    kind: ProgressType,
    subject_id: SubjectId,
) -> Result<Option<SubjectId>, StorageError> {
    match kind {
        ProgressType::Course => Ok(None),
        ProgressType::Lesson => Ok(meta_id(
            post_meta(pool, subject_id, LESSON_COURSE_KEY).await?.as_deref(),
        )),
        ProgressType::Quiz => quiz_lesson(pool, subject_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_required_flag_values() {
        assert!(is_pass_required(Some("on")));
        assert!(is_pass_required(Some(" on ")));
        assert!(!is_pass_required(Some("")));
        assert!(!is_pass_required(Some("off")));
        assert!(!is_pass_required(None));
    }
}
