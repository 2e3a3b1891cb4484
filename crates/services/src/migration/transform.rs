//! Pure legacy-row to target-record mapping, shared by migration and validation.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use progress_core::codec::{Payload, decode_legacy_payloads, decode_legacy_points, legacy_question_ids};
use progress_core::model::{ProgressType, QuestionId, SubjectId, UserId};
use progress_core::status::{
    CanonicalStatus, LessonContext, NormalizationContext, normalize_legacy_status,
};
use progress_core::time::parse_legacy_datetime;
use storage::records::{
    AnswerRecord, GradeRecord, LegacyActivity, LegacyAttemptRow, LegacyProgressRow,
    ProgressRecord, SubmissionRecord,
};

use crate::error::TransformationError;

/// Timestamps carried by a legacy status comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LegacyTimes {
    started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LegacyTimes {
    /// The comment date is the last write; an unreadable `start` is treated as absent.
    fn parse(date: &str, start: Option<&str>) -> Result<Self, TransformationError> {
        let updated_at =
            parse_legacy_datetime(date).ok_or_else(|| TransformationError::InvalidTimestamp {
                field: "date",
                raw: date.to_owned(),
            })?;
        let started_at = start.and_then(parse_legacy_datetime);
        Ok(Self {
            started_at,
            created_at: started_at.map_or(updated_at, |s| s.min(updated_at)),
            updated_at,
        })
    }

    fn record(
        self,
        subject_id: SubjectId,
        user_id: UserId,
        parent_subject_id: Option<SubjectId>,
        status: CanonicalStatus,
        kind: ProgressType,
    ) -> ProgressRecord {
        ProgressRecord {
            kind,
            subject_id,
            user_id,
            parent_subject_id,
            status: status.as_str().to_owned(),
            started_at: self.started_at,
            completed_at: status.carries_completion().then_some(self.updated_at),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Map a course or lesson status comment to its progress records.
///
/// A lesson comment yields the lesson record and, when the lesson has a quiz,
/// the quiz record parented to the lesson.
///
/// # Errors
///
/// Returns `TransformationError` if the subject is gone or the date is unreadable.
pub fn progress_records(row: &LegacyProgressRow) -> Result<Vec<ProgressRecord>, TransformationError> {
    if !row.post_exists {
        return Err(TransformationError::MissingSubject(row.post_id));
    }
    let times = LegacyTimes::parse(&row.date, row.start.as_deref())?;

    match row.activity {
        LegacyActivity::CourseStatus => {
            let ctx = NormalizationContext::Course;
            Ok(vec![times.record(
                row.post_id,
                row.user_id,
                None,
                normalize_legacy_status(&row.status, ctx),
                ctx.kind(),
            )])
        }
        LegacyActivity::LessonStatus => {
            let ctx = NormalizationContext::Lesson(LessonContext {
                pass_required: row.lesson.quiz_pass_required,
            });
            let mut out = vec![times.record(
                row.post_id,
                row.user_id,
                row.lesson.course_id,
                normalize_legacy_status(&row.status, ctx),
                ctx.kind(),
            )];
            if let Some(quiz_id) = row.lesson.quiz_id {
                let ctx = NormalizationContext::Quiz;
                out.push(times.record(
                    quiz_id,
                    row.user_id,
                    Some(row.post_id),
                    normalize_legacy_status(&row.status, ctx),
                    ctx.kind(),
                ));
            }
            Ok(out)
        }
    }
}

/// Every question id referenced by a batch of attempts; undecodable blobs are ignored here
/// and rejected later by `submission_record`.
#[must_use]
pub fn referenced_questions(rows: &[LegacyAttemptRow]) -> Vec<QuestionId> {
    let mut ids: Vec<QuestionId> = rows
        .iter()
        .filter_map(|row| legacy_question_ids(&row.answers).ok())
        .flatten()
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn final_grade(raw: Option<&str>) -> Result<Option<f64>, TransformationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => match value.parse::<f64>() {
            Ok(grade) if grade.is_finite() => Ok(Some(grade)),
            _ => Err(TransformationError::InvalidGrade(value.to_owned())),
        },
    }
}

/// Map a legacy quiz attempt to a submission with its answers and grades.
///
/// The whole attempt is rejected when any answer references a question that
/// is not in `known_questions`.
///
/// # Errors
///
/// Returns `TransformationError` for a lesson without quiz, unreadable dates,
/// malformed blobs or unknown questions.
pub fn submission_record(
    row: &LegacyAttemptRow,
    known_questions: &HashSet<QuestionId>,
) -> Result<SubmissionRecord, TransformationError> {
    let quiz_id = row
        .quiz_id
        .ok_or(TransformationError::MissingQuiz(row.lesson_id))?;
    let times = LegacyTimes::parse(&row.date, row.start.as_deref())?;

    let answers = decode_legacy_payloads(&row.answers)?;
    let points = row
        .grades
        .as_deref()
        .map(decode_legacy_points)
        .transpose()?
        .unwrap_or_default();
    let mut feedback: BTreeMap<QuestionId, Payload> = row
        .feedback
        .as_deref()
        .map(decode_legacy_payloads)
        .transpose()?
        .unwrap_or_default();

    let answers = answers
        .into_iter()
        .map(|(question_id, value)| {
            if !known_questions.contains(&question_id) {
                return Err(TransformationError::UnknownQuestion(question_id));
            }
            let grade = points.get(&question_id).map(|&points| GradeRecord {
                points,
                feedback: feedback.remove(&question_id),
            });
            Ok(AnswerRecord {
                question_id,
                value,
                grade,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SubmissionRecord {
        quiz_id,
        user_id: row.user_id,
        final_grade: final_grade(row.final_grade.as_deref())?,
        created_at: times.created_at,
        updated_at: times.updated_at,
        answers,
    })
}
