use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{LegacyRowId, QuestionId, SubjectId, UserId};
use storage::records::{AnswerRecord, SubmissionRecord};
use storage::repository::{LegacyAttemptSource, StorageError, SubmissionTarget};
use tracing::info;

use super::{Finding, PAGE_SIZE, Validation, ValidationError, ValidationRow, count_mismatch};
use crate::migration::transform::{referenced_questions, submission_record};

/// Compares legacy quiz attempts with the submission tables.
pub struct QuizSubmissionValidation {
    source: Arc<dyn LegacyAttemptSource>,
    target: Arc<dyn SubmissionTarget>,
    errors: Vec<ValidationError>,
}

fn key_row(quiz_id: SubjectId, user_id: UserId) -> ValidationRow {
    vec![
        ("quiz_id", quiz_id.to_string()),
        ("user_id", user_id.to_string()),
    ]
}

fn show_grade(grade: Option<f64>) -> String {
    grade.map_or_else(|| "-".to_owned(), |g| g.to_string())
}

fn show_answer(answer: Option<&AnswerRecord>) -> String {
    let Some(answer) = answer else {
        return "-".to_owned();
    };
    match &answer.grade {
        Some(grade) => format!("{} ({} pts)", answer.value.encode(), grade.points),
        None => answer.value.encode(),
    }
}

/// Differences in final grade, answer values and points.
fn compare(expected: &SubmissionRecord, actual: &SubmissionRecord) -> Vec<ValidationRow> {
    let diff = |field: String, legacy: String, tables: String| {
        let mut row = key_row(expected.quiz_id, expected.user_id);
        row.push(("field", field));
        row.push(("legacy", legacy));
        row.push(("tables", tables));
        row
    };

    let mut out = Vec::new();
    if expected.final_grade != actual.final_grade {
        out.push(diff(
            "final_grade".to_owned(),
            show_grade(expected.final_grade),
            show_grade(actual.final_grade),
        ));
    }

    let by_question = |answers: &[AnswerRecord]| -> BTreeMap<QuestionId, AnswerRecord> {
        answers
            .iter()
            .map(|a| (a.question_id, a.clone()))
            .collect()
    };
    let legacy = by_question(&expected.answers);
    let tables = by_question(&actual.answers);
    let questions: BTreeSet<QuestionId> = legacy.keys().chain(tables.keys()).copied().collect();

    for question_id in questions {
        let (l, t) = (legacy.get(&question_id), tables.get(&question_id));
        let same = match (l, t) {
            (Some(l), Some(t)) => {
                l.value == t.value
                    && l.grade.as_ref().map(|g| g.points) == t.grade.as_ref().map(|g| g.points)
            }
            _ => false,
        };
        if !same {
            out.push(diff(
                format!("answer {question_id}"),
                show_answer(l),
                show_answer(t),
            ));
        }
    }
    out
}

impl QuizSubmissionValidation {
    #[must_use]
    pub fn new(source: Arc<dyn LegacyAttemptSource>, target: Arc<dyn SubmissionTarget>) -> Self {
        Self {
            source,
            target,
            errors: Vec::new(),
        }
    }
}

#[async_trait]
impl Validation for QuizSubmissionValidation {
    fn name(&self) -> &'static str {
        "quiz-submission"
    }

    async fn run(&mut self) -> Result<(), StorageError> {
        self.errors.clear();
        let legacy = self.source.count_legacy_attempts().await?;
        let tables = self.target.count_submissions().await?;
        self.errors
            .extend(count_mismatch("quiz submission", legacy, tables));

        let mut unmigratable = Finding::new("legacy attempts that cannot be migrated");
        let mut missing = Finding::new("submissions missing from tables");
        let mut mismatched = Finding::new("submissions differ between legacy and tables");
        // Several attempts for one learner collapse onto the newest, as in the upsert.
        let mut expected: BTreeMap<(SubjectId, UserId), SubmissionRecord> = BTreeMap::new();

        let mut after = LegacyRowId::START;
        loop {
            let rows = self
                .source
                .find_attempts_for_migration(after, PAGE_SIZE)
                .await?;
            let Some(last) = rows.last() else {
                break;
            };
            after = last.source_id;
            let known = self
                .source
                .existing_questions(&referenced_questions(&rows))
                .await?;

            for row in &rows {
                let record = match submission_record(row, &known) {
                    Ok(record) => record,
                    Err(err) => {
                        unmigratable.push(vec![
                            ("source_id", row.source_id.to_string()),
                            ("lesson_id", row.lesson_id.to_string()),
                            ("user_id", row.user_id.to_string()),
                            ("error", err.to_string()),
                        ]);
                        continue;
                    }
                };
                let key = (record.quiz_id, record.user_id);
                if expected
                    .get(&key)
                    .is_none_or(|kept| kept.updated_at <= record.updated_at)
                {
                    expected.insert(key, record);
                }
            }
        }

        for record in expected.values() {
            match self
                .target
                .find_submission_record(record.quiz_id, record.user_id)
                .await?
            {
                Some(actual) => {
                    for diff in compare(record, &actual) {
                        mismatched.push(diff);
                    }
                }
                None => missing.push(key_row(record.quiz_id, record.user_id)),
            }
        }

        let mut extra = Finding::new("submissions only in tables");
        for (quiz_id, user_id) in self.target.list_submission_keys().await? {
            if !expected.contains_key(&(quiz_id, user_id)) {
                extra.push(key_row(quiz_id, user_id));
            }
        }

        let mut orphans = Finding::new("rows referencing a missing parent");
        for orphan in self.target.orphaned_rows().await? {
            orphans.push(vec![
                ("table", orphan.table.to_owned()),
                ("id", orphan.id.to_string()),
                ("column", orphan.column.to_owned()),
                ("reference", orphan.reference.to_string()),
            ]);
        }

        self.errors.extend(
            [unmigratable, missing, mismatched, extra, orphans]
                .into_iter()
                .filter_map(Finding::into_error),
        );
        info!(
            validation = self.name(),
            discrepancies = self.errors.len(),
            "validation finished"
        );
        Ok(())
    }

    fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::codec::Payload;
    use progress_core::time::fixed_now;
    use storage::records::GradeRecord;

    fn submission(points: i64) -> SubmissionRecord {
        SubmissionRecord {
            quiz_id: SubjectId::new(30),
            user_id: UserId::new(1),
            final_grade: Some(100.0),
            created_at: fixed_now(),
            updated_at: fixed_now(),
            answers: vec![AnswerRecord {
                question_id: QuestionId::new(41),
                value: Payload::new("true"),
                grade: Some(GradeRecord {
                    points,
                    feedback: None,
                }),
            }],
        }
    }

    #[test]
    fn identical_submissions_match() {
        assert!(compare(&submission(1), &submission(1)).is_empty());
    }

    #[test]
    fn point_and_answer_differences_are_reported() {
        let mut actual = submission(0);
        actual.answers.push(AnswerRecord {
            question_id: QuestionId::new(42),
            value: Payload::new("extra"),
            grade: None,
        });
        let diffs = compare(&submission(1), &actual);
        assert_eq!(diffs.len(), 2);
        assert!(diffs[0].contains(&("field", "answer 41".to_owned())));
        assert!(diffs[1].contains(&("legacy", "-".to_owned())));
    }
}
