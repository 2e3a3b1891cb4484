use progress_core::codec::Payload;
use progress_core::model::{
    Answer, AnswerId, Grade, GradeId, QuestionId, SubjectId, Submission, SubmissionId, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::TablesRepository;
use super::mapping::{db_err, get_opt_u64, get_u64, i64_to_u64, id_i64, ser};
use crate::records::{AnswerRecord, GradeRecord, OrphanRow, SubmissionRecord};
use crate::repository::{
    AnswerRepository, GradeRepository, StorageError, SubmissionRepository, SubmissionTarget,
};

const SUBMISSION_COLUMNS: &str = "id, quiz_id, user_id, final_grade, created_at, updated_at";

fn decode_payload(raw: &str) -> Result<Payload, StorageError> {
    Payload::decode(raw).map_err(ser)
}

fn map_submission(row: &SqliteRow) -> Result<Submission, StorageError> {
    Ok(Submission::from_persisted(
        SubmissionId::new(get_u64(row, "id")?),
        SubjectId::new(get_u64(row, "quiz_id")?),
        UserId::new(get_u64(row, "user_id")?),
        row.try_get("final_grade").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    ))
}

fn map_answer(row: &SqliteRow) -> Result<Answer, StorageError> {
    let value: String = row.try_get("value").map_err(ser)?;
    Ok(Answer {
        id: AnswerId::new(get_u64(row, "id")?),
        submission_id: SubmissionId::new(get_u64(row, "submission_id")?),
        question_id: QuestionId::new(get_u64(row, "question_id")?),
        value: decode_payload(&value)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

fn map_grade(row: &SqliteRow) -> Result<Grade, StorageError> {
    let feedback: Option<String> = row.try_get("feedback").map_err(ser)?;
    Ok(Grade {
        id: GradeId::new(get_u64(row, "id")?),
        answer_id: AnswerId::new(get_u64(row, "answer_id")?),
        question_id: QuestionId::new(get_u64(row, "question_id")?),
        points: row.try_get("points").map_err(ser)?,
        feedback: feedback.as_deref().map(decode_payload).transpose()?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

/// Remove a submission's grades and answers, leaving the submission row.
async fn clear_answers(conn: &mut SqliteConnection, submission_id: i64) -> Result<(), StorageError> {
    sqlx::query(
        "DELETE FROM quiz_grades WHERE answer_id IN (SELECT id FROM quiz_answers WHERE submission_id = ?1)",
    )
    .bind(submission_id)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    sqlx::query("DELETE FROM quiz_answers WHERE submission_id = ?1")
        .bind(submission_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

impl TablesRepository {
    /// Delete submissions matching `column = value`, grades and answers first.
    async fn delete_submissions_where(&self, column: &str, value: i64) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(&format!(
            r"
            DELETE FROM quiz_grades WHERE answer_id IN (
                SELECT a.id FROM quiz_answers a
                JOIN quiz_submissions s ON s.id = a.submission_id
                WHERE s.{column} = ?1
            )
            "
        ))
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query(&format!(
            "DELETE FROM quiz_answers WHERE submission_id IN (SELECT id FROM quiz_submissions WHERE {column} = ?1)"
        ))
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query(&format!("DELETE FROM quiz_submissions WHERE {column} = ?1"))
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for TablesRepository {
    async fn create(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
        final_grade: Option<f64>,
    ) -> Result<Submission, StorageError> {
        let now = self.clock.now();
        let res = sqlx::query(
            r"
            INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
        )
        .bind(id_i64("quiz_id", quiz_id.value())?)
        .bind(id_i64("user_id", user_id.value())?)
        .bind(final_grade)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Submission::from_persisted(
            SubmissionId::new(i64_to_u64("id", res.last_insert_rowid())?),
            quiz_id,
            user_id,
            final_grade,
            now,
            now,
        ))
    }

    async fn get(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<Submission>, StorageError> {
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM quiz_submissions WHERE quiz_id = ?1 AND user_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("quiz_id", quiz_id.value())?)
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_submission).transpose()
    }

    async fn save(&self, submission: &mut Submission) -> Result<(), StorageError> {
        submission.set_updated_at(self.clock.now());
        let res = sqlx::query(
            "UPDATE quiz_submissions SET final_grade = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(submission.final_grade())
        .bind(submission.updated_at())
        .bind(id_i64("id", submission.id().value())?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, submission: &Submission) -> Result<(), StorageError> {
        self.delete_submissions_where("id", id_i64("id", submission.id().value())?)
            .await
    }

    async fn delete_for_quiz(&self, quiz_id: SubjectId) -> Result<(), StorageError> {
        self.delete_submissions_where("quiz_id", id_i64("quiz_id", quiz_id.value())?)
            .await
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.delete_submissions_where("user_id", id_i64("user_id", user_id.value())?)
            .await
    }
}

#[async_trait::async_trait]
impl AnswerRepository for TablesRepository {
    async fn create_answer(
        &self,
        submission: &Submission,
        question_id: QuestionId,
        value: Payload,
    ) -> Result<Answer, StorageError> {
        let now = self.clock.now();
        let res = sqlx::query(
            r"
            INSERT INTO quiz_answers (submission_id, question_id, value, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
        )
        .bind(id_i64("submission_id", submission.id().value())?)
        .bind(id_i64("question_id", question_id.value())?)
        .bind(value.encode())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Answer {
            id: AnswerId::new(i64_to_u64("id", res.last_insert_rowid())?),
            submission_id: submission.id(),
            question_id,
            value,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_answers(&self, submission_id: SubmissionId) -> Result<Vec<Answer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, submission_id, question_id, value, created_at, updated_at
            FROM quiz_answers
            WHERE submission_id = ?1
            ORDER BY question_id ASC, id ASC
            ",
        )
        .bind(id_i64("submission_id", submission_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_answer).collect()
    }

    async fn delete_answers(&self, submission_id: SubmissionId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        clear_answers(&mut tx, id_i64("submission_id", submission_id.value())?).await?;
        tx.commit().await.map_err(db_err)
    }
}

#[async_trait::async_trait]
impl GradeRepository for TablesRepository {
    async fn create_grade(
        &self,
        answer: &Answer,
        points: i64,
        feedback: Option<Payload>,
    ) -> Result<Grade, StorageError> {
        let now = self.clock.now();
        let res = sqlx::query(
            r"
            INSERT INTO quiz_grades (answer_id, question_id, points, feedback, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ",
        )
        .bind(id_i64("answer_id", answer.id.value())?)
        .bind(id_i64("question_id", answer.question_id.value())?)
        .bind(points)
        .bind(feedback.as_ref().map(Payload::encode))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Grade {
            id: GradeId::new(i64_to_u64("id", res.last_insert_rowid())?),
            answer_id: answer.id,
            question_id: answer.question_id,
            points,
            feedback,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_grades(&self, submission_id: SubmissionId) -> Result<Vec<Grade>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT g.id, g.answer_id, g.question_id, g.points, g.feedback, g.created_at, g.updated_at
            FROM quiz_grades g
            JOIN quiz_answers a ON a.id = g.answer_id
            WHERE a.submission_id = ?1
            ORDER BY g.question_id ASC, g.id ASC
            ",
        )
        .bind(id_i64("submission_id", submission_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_grade).collect()
    }

    async fn save_grades(&self, grades: &mut [Grade]) -> Result<(), StorageError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for grade in grades.iter_mut() {
            grade.updated_at = now.max(grade.created_at);
            let res = sqlx::query(
                "UPDATE quiz_grades SET points = ?1, feedback = ?2, updated_at = ?3 WHERE id = ?4",
            )
            .bind(grade.points)
            .bind(grade.feedback.as_ref().map(Payload::encode))
            .bind(grade.updated_at)
            .bind(id_i64("id", grade.id.value())?)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if res.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
        }
        tx.commit().await.map_err(db_err)
    }

    async fn delete_grades(&self, submission_id: SubmissionId) -> Result<(), StorageError> {
        sqlx::query(
            "DELETE FROM quiz_grades WHERE answer_id IN (SELECT id FROM quiz_answers WHERE submission_id = ?1)",
        )
        .bind(id_i64("submission_id", submission_id.value())?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubmissionTarget for TablesRepository {
    async fn upsert_submission_batch(
        &self,
        records: &[SubmissionRecord],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in records {
            // No id comes back when a newer submission already exists; leave it alone.
            let row = sqlx::query(
                r"
                INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(quiz_id, user_id) DO UPDATE SET
                    final_grade = excluded.final_grade,
                    created_at = MIN(quiz_submissions.created_at, excluded.created_at),
                    updated_at = excluded.updated_at
                WHERE excluded.updated_at >= quiz_submissions.updated_at
                RETURNING id
                ",
            )
            .bind(id_i64("quiz_id", record.quiz_id.value())?)
            .bind(id_i64("user_id", record.user_id.value())?)
            .bind(record.final_grade)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
            let Some(row) = row else {
                continue;
            };
            let submission_id: i64 = row.try_get("id").map_err(ser)?;

            clear_answers(&mut tx, submission_id).await?;
            for answer in &record.answers {
                let res = sqlx::query(
                    r"
                    INSERT INTO quiz_answers (submission_id, question_id, value, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                )
                .bind(submission_id)
                .bind(id_i64("question_id", answer.question_id.value())?)
                .bind(answer.value.encode())
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

                if let Some(grade) = &answer.grade {
                    sqlx::query(
                        r"
                        INSERT INTO quiz_grades (answer_id, question_id, points, feedback, created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        ",
                    )
                    .bind(res.last_insert_rowid())
                    .bind(id_i64("question_id", answer.question_id.value())?)
                    .bind(grade.points)
                    .bind(grade.feedback.as_ref().map(Payload::encode))
                    .bind(record.created_at)
                    .bind(record.updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
            }
        }
        tx.commit().await.map_err(db_err)
    }

    async fn find_submission_record(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<SubmissionRecord>, StorageError> {
        let Some(submission) = SubmissionRepository::get(self, quiz_id, user_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r"
            SELECT a.question_id, a.value, g.points, g.feedback
            FROM quiz_answers a
            LEFT JOIN quiz_grades g ON g.answer_id = a.id
            WHERE a.submission_id = ?1
            ORDER BY a.question_id ASC, a.id ASC
            ",
        )
        .bind(id_i64("submission_id", submission.id().value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut answers = Vec::with_capacity(rows.len());
        for row in &rows {
            let value: String = row.try_get("value").map_err(ser)?;
            let points: Option<i64> = row.try_get("points").map_err(ser)?;
            let feedback: Option<String> = row.try_get("feedback").map_err(ser)?;
            answers.push(AnswerRecord {
                question_id: QuestionId::new(get_u64(row, "question_id")?),
                value: decode_payload(&value)?,
                grade: match points {
                    Some(points) => Some(GradeRecord {
                        points,
                        feedback: feedback.as_deref().map(decode_payload).transpose()?,
                    }),
                    None => None,
                },
            });
        }

        Ok(Some(SubmissionRecord {
            quiz_id,
            user_id,
            final_grade: submission.final_grade(),
            created_at: submission.created_at(),
            updated_at: submission.updated_at(),
            answers,
        }))
    }

    async fn count_submissions(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM quiz_submissions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        get_u64(&row, "n")
    }

    async fn list_submission_keys(&self) -> Result<Vec<(SubjectId, UserId)>, StorageError> {
        let rows = sqlx::query("SELECT quiz_id, user_id FROM quiz_submissions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok((
                    SubjectId::new(get_u64(row, "quiz_id")?),
                    UserId::new(get_u64(row, "user_id")?),
                ))
            })
            .collect()
    }

    async fn orphaned_rows(&self) -> Result<Vec<OrphanRow>, StorageError> {
        let checks: [(&'static str, &'static str, &str); 3] = [
            (
                "quiz_submissions",
                "quiz_id",
                r"
                SELECT s.id, s.quiz_id AS reference FROM quiz_submissions s
                WHERE NOT EXISTS (
                    SELECT 1 FROM progress p
                    WHERE p.type = 'quiz' AND p.subject_id = s.quiz_id AND p.user_id = s.user_id
                )
                ORDER BY s.id ASC
                ",
            ),
            (
                "quiz_answers",
                "submission_id",
                r"
                SELECT a.id, a.submission_id AS reference FROM quiz_answers a
                LEFT JOIN quiz_submissions s ON s.id = a.submission_id
                WHERE s.id IS NULL
                ORDER BY a.id ASC
                ",
            ),
            (
                "quiz_grades",
                "answer_id",
                r"
                SELECT g.id, g.answer_id AS reference FROM quiz_grades g
                LEFT JOIN quiz_answers a ON a.id = g.answer_id
                WHERE a.id IS NULL
                ORDER BY g.id ASC
                ",
            ),
        ];

        let mut out = Vec::new();
        for (table, column, sql) in checks {
            let rows = sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            for row in &rows {
                out.push(OrphanRow {
                    table,
                    id: get_u64(row, "id")?,
                    column,
                    reference: get_opt_u64(row, "reference")?.unwrap_or_default(),
                });
            }
        }
        Ok(out)
    }
}
