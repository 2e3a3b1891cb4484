//! Translation of the legacy comment-status vocabulary into canonical statuses.
//!
//! Legacy lesson and quiz progress share one status value on the lesson's
//! comment row. Everything here is pure so it can be exercised without a
//! database, and the migration and validation engines reuse the exact same
//! rules as the legacy repository.

use crate::model::{CourseStatus, LessonStatus, ProgressType, QuizStatus};

/// Raw status values found in the legacy `comment_approved` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyStatus {
    InProgress,
    /// Historical value for a lesson without questions, or graded by an older release.
    Complete,
    Passed,
    Graded,
    Ungraded,
    Failed,
    Other(String),
}

impl LegacyStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "in-progress" => Self::InProgress,
            "complete" => Self::Complete,
            "passed" => Self::Passed,
            "graded" => Self::Graded,
            "ungraded" => Self::Ungraded,
            "failed" => Self::Failed,
            other => Self::Other(other.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Passed => "passed",
            Self::Graded => "graded",
            Self::Ungraded => "ungraded",
            Self::Failed => "failed",
            Self::Other(raw) => raw.as_str(),
        }
    }

    /// Submission predicate over the raw vocabulary; legacy `complete` is not a submission.
    #[must_use]
    pub fn is_quiz_submitted(&self) -> bool {
        matches!(
            self,
            Self::Graded | Self::Failed | Self::Passed | Self::Ungraded
        )
    }

    #[must_use]
    pub fn is_quiz_completed(&self) -> bool {
        matches!(self, Self::Passed | Self::Graded | Self::Failed)
    }
}

/// Lesson-level facts the lesson normalization depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LessonContext {
    /// The lesson's quiz must be passed before the lesson counts as complete.
    pub pass_required: bool,
}

/// What kind of record a raw status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationContext {
    Course,
    Lesson(LessonContext),
    Quiz,
}

impl NormalizationContext {
    #[must_use]
    pub fn kind(self) -> ProgressType {
        match self {
            Self::Course => ProgressType::Course,
            Self::Lesson(_) => ProgressType::Lesson,
            Self::Quiz => ProgressType::Quiz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalStatus {
    Course(CourseStatus),
    Lesson(LessonStatus),
    Quiz(QuizStatus),
}

impl CanonicalStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        use crate::model::ProgressStatus;
        match self {
            Self::Course(s) => s.as_str(),
            Self::Lesson(s) => s.as_str(),
            Self::Quiz(s) => s.as_str(),
        }
    }

    /// Whether `completed_at` accompanies this status.
    #[must_use]
    pub fn carries_completion(self) -> bool {
        use crate::model::ProgressStatus;
        match self {
            Self::Course(s) => s.carries_completion(),
            Self::Lesson(s) => s.carries_completion(),
            Self::Quiz(s) => s.carries_completion(),
        }
    }
}

#[must_use]
pub fn normalize_legacy_status(raw: &str, context: NormalizationContext) -> CanonicalStatus {
    match context {
        NormalizationContext::Course => CanonicalStatus::Course(normalize_course_status(raw)),
        NormalizationContext::Lesson(ctx) => {
            CanonicalStatus::Lesson(normalize_lesson_status(raw, ctx))
        }
        NormalizationContext::Quiz => CanonicalStatus::Quiz(normalize_quiz_status(raw)),
    }
}

#[must_use]
pub fn normalize_course_status(raw: &str) -> CourseStatus {
    match raw {
        "complete" => CourseStatus::Complete,
        _ => CourseStatus::InProgress,
    }
}

#[must_use]
pub fn normalize_lesson_status(raw: &str, context: LessonContext) -> LessonStatus {
    match LegacyStatus::parse(raw) {
        LegacyStatus::Complete | LegacyStatus::Graded | LegacyStatus::Passed => {
            LessonStatus::Complete
        }
        LegacyStatus::Failed if !context.pass_required => LessonStatus::Complete,
        _ => LessonStatus::InProgress,
    }
}

#[must_use]
pub fn normalize_quiz_status(raw: &str) -> QuizStatus {
    match LegacyStatus::parse(raw) {
        LegacyStatus::InProgress => QuizStatus::InProgress,
        LegacyStatus::Failed => QuizStatus::Failed,
        LegacyStatus::Graded => QuizStatus::Graded,
        LegacyStatus::Passed | LegacyStatus::Complete => QuizStatus::Passed,
        LegacyStatus::Ungraded => QuizStatus::Ungraded,
        LegacyStatus::Other(_) => QuizStatus::InProgress,
    }
}
