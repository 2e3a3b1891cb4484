use std::collections::{HashMap, HashSet};

use progress_core::model::{LegacyRowId, ProgressType, QuestionId, SubjectId, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::CommentsRepository;
use super::comments_repo::{ANSWERS_KEY, FEEDBACK_KEY, FINAL_GRADE_KEY, GRADES_KEY, START_KEY};
use super::content::{LESSON_QUIZ_KEY, lesson_links};
use super::mapping::{db_err, get_u64, id_i64, meta_id, ser};
use crate::records::{LegacyActivity, LegacyAttemptRow, LegacyProgressRow, LessonLinks};
use crate::repository::{LegacyAttemptSource, LegacyProgressSource, StorageError};

/// Latest value of a comment meta key, as a correlated sub-select.
fn comment_meta(key: &str, alias: &str) -> String {
    format!(
        "(SELECT m.meta_value FROM commentmeta m
            WHERE m.comment_id = c.comment_id AND m.meta_key = '{key}'
            ORDER BY m.meta_id DESC LIMIT 1) AS {alias}"
    )
}

fn has_answers_clause() -> String {
    format!(
        "EXISTS (SELECT 1 FROM commentmeta a WHERE a.comment_id = c.comment_id AND a.meta_key = '{ANSWERS_KEY}')"
    )
}

async fn count(sql: &str, comment_type: &str, pool: &sqlx::SqlitePool) -> Result<u64, StorageError> {
    let row = sqlx::query(sql)
        .bind(comment_type)
        .fetch_one(pool)
        .await
        .map_err(db_err)?;
    get_u64(&row, "n")
}

#[async_trait::async_trait]
impl LegacyProgressSource for CommentsRepository {
    async fn find_for_migration(
        &self,
        after: LegacyRowId,
        limit: u32,
    ) -> Result<Vec<LegacyProgressRow>, StorageError> {
        let sql = format!(
            r"
            SELECT c.comment_id, c.comment_type, c.comment_post_id, c.user_id,
                c.comment_approved, c.comment_date_gmt,
                {start},
                EXISTS (SELECT 1 FROM posts p WHERE p.id = c.comment_post_id) AS post_exists
            FROM comments c
            WHERE c.comment_type IN (?1, ?2) AND c.comment_id > ?3
            ORDER BY c.comment_id ASC
            LIMIT ?4
            ",
            start = comment_meta(START_KEY, "start"),
        );
        let rows = sqlx::query(&sql)
            .bind(LegacyActivity::CourseStatus.comment_type())
            .bind(LegacyActivity::LessonStatus.comment_type())
            .bind(id_i64("comment_id", after.value())?)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut links: HashMap<SubjectId, LessonLinks> = HashMap::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let comment_type: String = row.try_get("comment_type").map_err(ser)?;
            let activity = LegacyActivity::from_comment_type(&comment_type).ok_or_else(|| {
                StorageError::Serialization(format!("unexpected comment type: {comment_type}"))
            })?;
            let post_id = SubjectId::new(get_u64(&row, "comment_post_id")?);

            let lesson = match activity {
                LegacyActivity::CourseStatus => LessonLinks::default(),
                LegacyActivity::LessonStatus => match links.get(&post_id) {
                    Some(cached) => *cached,
                    None => {
                        let resolved = lesson_links(&self.pool, post_id).await?;
                        links.insert(post_id, resolved);
                        resolved
                    }
                },
            };

            out.push(LegacyProgressRow {
                source_id: LegacyRowId::new(get_u64(&row, "comment_id")?),
                activity,
                post_id,
                post_exists: row.try_get::<i64, _>("post_exists").map_err(ser)? != 0,
                user_id: UserId::new(get_u64(&row, "user_id")?),
                status: row.try_get("comment_approved").map_err(ser)?,
                date: row.try_get("comment_date_gmt").map_err(ser)?,
                start: row.try_get("start").map_err(ser)?,
                lesson,
            });
        }
        Ok(out)
    }

    async fn count_legacy_progress(&self, kind: ProgressType) -> Result<u64, StorageError> {
        let activity = match kind {
            ProgressType::Course => LegacyActivity::CourseStatus,
            ProgressType::Lesson | ProgressType::Quiz => LegacyActivity::LessonStatus,
        };
        let rows = sqlx::query(
            r"
            SELECT comment_post_id, COUNT(DISTINCT user_id) AS n
            FROM comments
            WHERE comment_type = ?1
            GROUP BY comment_post_id
            ",
        )
        .bind(activity.comment_type())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut total = 0;
        for row in rows {
            let learners = get_u64(&row, "n")?;
            // Quiz progress exists for every lesson learner whose lesson has a quiz.
            if kind == ProgressType::Quiz {
                let lesson = SubjectId::new(get_u64(&row, "comment_post_id")?);
                if lesson_links(&self.pool, lesson).await?.quiz_id.is_none() {
                    continue;
                }
            }
            total += learners;
        }
        Ok(total)
    }
}

fn attempt_row(row: &SqliteRow) -> Result<LegacyAttemptRow, StorageError> {
    let lesson_quiz: Option<String> = row.try_get("lesson_quiz").map_err(ser)?;
    Ok(LegacyAttemptRow {
        source_id: LegacyRowId::new(get_u64(row, "comment_id")?),
        lesson_id: SubjectId::new(get_u64(row, "comment_post_id")?),
        user_id: UserId::new(get_u64(row, "user_id")?),
        quiz_id: meta_id(lesson_quiz.as_deref()),
        status: row.try_get("comment_approved").map_err(ser)?,
        date: row.try_get("comment_date_gmt").map_err(ser)?,
        start: row.try_get("start").map_err(ser)?,
        answers: row
            .try_get::<Option<String>, _>("answers")
            .map_err(ser)?
            .unwrap_or_default(),
        grades: row.try_get("grades").map_err(ser)?,
        feedback: row.try_get("feedback").map_err(ser)?,
        final_grade: row.try_get("final_grade").map_err(ser)?,
    })
}

#[async_trait::async_trait]
impl LegacyAttemptSource for CommentsRepository {
    async fn find_attempts_for_migration(
        &self,
        after: LegacyRowId,
        limit: u32,
    ) -> Result<Vec<LegacyAttemptRow>, StorageError> {
        let sql = format!(
            r"
            SELECT c.comment_id, c.comment_post_id, c.user_id,
                c.comment_approved, c.comment_date_gmt,
                {start}, {answers}, {grades}, {feedback}, {final_grade},
                (SELECT pm.meta_value FROM postmeta pm
                    WHERE pm.post_id = c.comment_post_id AND pm.meta_key = '{LESSON_QUIZ_KEY}'
                    ORDER BY pm.meta_id ASC LIMIT 1) AS lesson_quiz
            FROM comments c
            WHERE c.comment_type = ?1 AND c.comment_id > ?2 AND {has_answers}
            ORDER BY c.comment_id ASC
            LIMIT ?3
            ",
            start = comment_meta(START_KEY, "start"),
            answers = comment_meta(ANSWERS_KEY, "answers"),
            grades = comment_meta(GRADES_KEY, "grades"),
            feedback = comment_meta(FEEDBACK_KEY, "feedback"),
            final_grade = comment_meta(FINAL_GRADE_KEY, "final_grade"),
            has_answers = has_answers_clause(),
        );
        let rows = sqlx::query(&sql)
            .bind(LegacyActivity::LessonStatus.comment_type())
            .bind(id_i64("comment_id", after.value())?)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(attempt_row).collect()
    }

    async fn count_legacy_attempts(&self) -> Result<u64, StorageError> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM (
                SELECT DISTINCT c.comment_post_id, c.user_id FROM comments c
                WHERE c.comment_type = ?1 AND {}
            )",
            has_answers_clause()
        );
        count(&sql, LegacyActivity::LessonStatus.comment_type(), &self.pool).await
    }

    async fn existing_questions(
        &self,
        ids: &[QuestionId],
    ) -> Result<HashSet<QuestionId>, StorageError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT id FROM posts WHERE post_type = 'question' AND id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id_i64("question_id", id.value())?);
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter()
            .map(|row| get_u64(row, "id").map(QuestionId::new))
            .collect()
    }
}
