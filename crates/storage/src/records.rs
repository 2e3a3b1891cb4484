//! Storage-level shapes exchanged with the migration and validation engines.
//!
//! Legacy rows are handed over raw (status vocabulary, date strings, encoded
//! blobs) so that decoding failures surface as per-row transformation errors
//! rather than storage errors.

use chrono::{DateTime, Utc};
use progress_core::codec::Payload;
use progress_core::model::{LegacyRowId, ProgressType, QuestionId, SubjectId, UserId};

/// Comment types used by the legacy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyActivity {
    CourseStatus,
    LessonStatus,
}

impl LegacyActivity {
    #[must_use]
    pub fn comment_type(self) -> &'static str {
        match self {
            LegacyActivity::CourseStatus => "sensei_course_status",
            LegacyActivity::LessonStatus => "sensei_lesson_status",
        }
    }

    #[must_use]
    pub fn from_comment_type(raw: &str) -> Option<Self> {
        match raw {
            "sensei_course_status" => Some(Self::CourseStatus),
            "sensei_lesson_status" => Some(Self::LessonStatus),
            _ => None,
        }
    }
}

/// Content relations of a lesson, resolved from post metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LessonLinks {
    pub course_id: Option<SubjectId>,
    pub quiz_id: Option<SubjectId>,
    pub quiz_pass_required: bool,
}

/// A legacy course or lesson status comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyProgressRow {
    pub source_id: LegacyRowId,
    pub activity: LegacyActivity,
    pub post_id: SubjectId,
    /// False when the course or lesson post no longer exists.
    pub post_exists: bool,
    pub user_id: UserId,
    pub status: String,
    pub date: String,
    pub start: Option<String>,
    /// Only meaningful for lesson rows.
    pub lesson: LessonLinks,
}

/// A legacy lesson status comment carrying a quiz attempt in its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAttemptRow {
    pub source_id: LegacyRowId,
    pub lesson_id: SubjectId,
    pub user_id: UserId,
    pub quiz_id: Option<SubjectId>,
    pub status: String,
    pub date: String,
    pub start: Option<String>,
    pub answers: String,
    pub grades: Option<String>,
    pub feedback: Option<String>,
    pub final_grade: Option<String>,
}

/// One row of the `progress` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub kind: ProgressType,
    pub subject_id: SubjectId,
    pub user_id: UserId,
    pub parent_subject_id: Option<SubjectId>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A submission together with its answers and grades; written atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub quiz_id: SubjectId,
    pub user_id: UserId,
    pub final_grade: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered by question id.
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub value: Payload,
    pub grade: Option<GradeRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub points: i64,
    pub feedback: Option<Payload>,
}

/// A tables row whose referenced parent is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRow {
    pub table: &'static str,
    pub id: u64,
    pub column: &'static str,
    pub reference: u64,
}
