use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{ProgressId, SubjectId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("updated_at is before created_at")]
    InvalidTimeRange,

    #[error("completed_at is set while status is {status}")]
    CompletedWhileOpen { status: &'static str },

    #[error("unknown {kind} progress status: {raw}")]
    UnknownStatus { kind: ProgressType, raw: String },
}

//
// ─── PROGRESS TYPE ─────────────────────────────────────────────────────────────
//

/// Which subject a progress record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgressType {
    Course,
    Lesson,
    Quiz,
}

impl ProgressType {
    pub const ALL: [ProgressType; 3] = [Self::Course, Self::Lesson, Self::Quiz];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressType::Course => "course",
            ProgressType::Lesson => "lesson",
            ProgressType::Quiz => "quiz",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "course" => Some(Self::Course),
            "lesson" => Some(Self::Lesson),
            "quiz" => Some(Self::Quiz),
            _ => None,
        }
    }
}

impl fmt::Display for ProgressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── STATUS VOCABULARIES ───────────────────────────────────────────────────────
//

/// Status vocabulary of one progress type.
pub trait ProgressStatus: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const KIND: ProgressType;

    /// The "in-progress" equivalent entered by `start()`.
    fn in_progress() -> Self;

    /// Whether `completed_at` may be set while in this status.
    fn carries_completion(self) -> bool;

    fn as_str(self) -> &'static str;

    fn parse(raw: &str) -> Option<Self>;
}

/// Statuses that can be completed directly (courses and lessons).
pub trait CompletableStatus: ProgressStatus {
    fn complete() -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourseStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LessonStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizStatus {
    InProgress,
    Passed,
    Graded,
    Ungraded,
    Failed,
}

impl ProgressStatus for CourseStatus {
    const KIND: ProgressType = ProgressType::Course;

    fn in_progress() -> Self {
        Self::InProgress
    }

    fn carries_completion(self) -> bool {
        self == Self::Complete
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in-progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl CompletableStatus for CourseStatus {
    fn complete() -> Self {
        Self::Complete
    }
}

impl ProgressStatus for LessonStatus {
    const KIND: ProgressType = ProgressType::Lesson;

    fn in_progress() -> Self {
        Self::InProgress
    }

    fn carries_completion(self) -> bool {
        self == Self::Complete
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in-progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl CompletableStatus for LessonStatus {
    fn complete() -> Self {
        Self::Complete
    }
}

impl ProgressStatus for QuizStatus {
    const KIND: ProgressType = ProgressType::Quiz;

    fn in_progress() -> Self {
        Self::InProgress
    }

    fn carries_completion(self) -> bool {
        matches!(self, Self::Passed | Self::Graded)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Passed => "passed",
            Self::Graded => "graded",
            Self::Ungraded => "ungraded",
            Self::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in-progress" => Some(Self::InProgress),
            "passed" => Some(Self::Passed),
            "graded" => Some(Self::Graded),
            "ungraded" => Some(Self::Ungraded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl QuizStatus {
    /// The learner handed the quiz in.
    #[must_use]
    pub fn is_submitted(self) -> bool {
        matches!(
            self,
            Self::Graded | Self::Failed | Self::Passed | Self::Ungraded
        )
    }

    /// The quiz has a final outcome.
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Passed | Self::Graded | Self::Failed)
    }
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// A learner's progress through one course, lesson or quiz.
///
/// The behaviour is identical whichever backend persisted the record; the
/// legacy backend normalizes its raw vocabulary before building one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress<S: ProgressStatus> {
    id: ProgressId,
    subject_id: SubjectId,
    user_id: UserId,
    status: S,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub type CourseProgress = Progress<CourseStatus>;
pub type LessonProgress = Progress<LessonStatus>;
pub type QuizProgress = Progress<QuizStatus>;

impl<S: ProgressStatus> Progress<S> {
    /// A freshly started record, as created by a repository's `create`.
    #[must_use]
    pub fn started(
        id: ProgressId,
        subject_id: SubjectId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject_id,
            user_id,
            status: S::in_progress(),
            started_at: Some(now),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a progress record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidTimeRange` if `updated_at < created_at`, or
    /// `ProgressError::CompletedWhileOpen` if `completed_at` is set for a status
    /// that cannot carry it.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ProgressId,
        subject_id: SubjectId,
        user_id: UserId,
        status: S,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if updated_at < created_at {
            return Err(ProgressError::InvalidTimeRange);
        }
        if completed_at.is_some() && !status.carries_completion() {
            return Err(ProgressError::CompletedWhileOpen {
                status: status.as_str(),
            });
        }
        Ok(Self {
            id,
            subject_id,
            user_id,
            status,
            started_at,
            completed_at,
            created_at,
            updated_at,
        })
    }

    /// Move back to the in-progress status. Re-entrant calls overwrite `started_at`.
    pub fn start(&mut self, started_at: Option<DateTime<Utc>>) {
        self.status = S::in_progress();
        self.started_at = Some(started_at.unwrap_or_else(Utc::now));
        self.completed_at = None;
    }

    #[must_use]
    pub fn kind(&self) -> ProgressType {
        S::KIND
    }

    #[must_use]
    pub fn id(&self) -> ProgressId {
        self.id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> S {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Record a modification time. Never moves `updated_at` before `created_at`.
    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at.max(self.created_at);
    }

    /// Copy the mutable state of `other` onto this record, keeping identity and `created_at`.
    pub fn sync_state_from(&mut self, other: &Self) {
        self.status = other.status;
        self.started_at = other.started_at;
        self.completed_at = other.completed_at;
        self.set_updated_at(other.updated_at);
    }
}

impl<S: CompletableStatus> Progress<S> {
    pub fn complete(&mut self, completed_at: Option<DateTime<Utc>>) {
        self.status = S::complete();
        self.completed_at = Some(completed_at.unwrap_or_else(Utc::now));
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == S::complete()
    }
}

impl Progress<QuizStatus> {
    pub fn pass(&mut self, at: Option<DateTime<Utc>>) {
        self.status = QuizStatus::Passed;
        self.completed_at = Some(at.unwrap_or_else(Utc::now));
    }

    pub fn grade(&mut self, at: Option<DateTime<Utc>>) {
        self.status = QuizStatus::Graded;
        self.completed_at = Some(at.unwrap_or_else(Utc::now));
    }

    /// Submitted and awaiting grading. `at` becomes the modification time.
    pub fn ungrade(&mut self, at: Option<DateTime<Utc>>) {
        self.status = QuizStatus::Ungraded;
        self.completed_at = None;
        self.set_updated_at(at.unwrap_or_else(Utc::now));
    }

    pub fn fail(&mut self, at: Option<DateTime<Utc>>) {
        self.status = QuizStatus::Failed;
        self.completed_at = None;
        self.set_updated_at(at.unwrap_or_else(Utc::now));
    }

    #[must_use]
    pub fn is_quiz_submitted(&self) -> bool {
        self.status.is_submitted()
    }

    #[must_use]
    pub fn is_quiz_completed(&self) -> bool {
        self.status.is_completed()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn quiz() -> QuizProgress {
        Progress::started(ProgressId::new(1), SubjectId::new(10), UserId::new(2), fixed_now())
    }

    #[test]
    fn start_defaults_to_now() {
        let mut p: CourseProgress =
            Progress::started(ProgressId::new(1), SubjectId::new(5), UserId::new(1), fixed_now());
        p.complete(None);
        let before = Utc::now();
        p.start(None);
        let after = Utc::now();

        assert_eq!(p.status(), CourseStatus::InProgress);
        let started = p.started_at().unwrap();
        assert!(started >= before && started <= after);
        assert_eq!(p.completed_at(), None);
    }

    #[test]
    fn supplied_timestamps_are_stored_verbatim() {
        let mut p: LessonProgress =
            Progress::started(ProgressId::new(1), SubjectId::new(5), UserId::new(1), fixed_now());
        let at = fixed_now() + Duration::hours(2);
        p.complete(Some(at));
        assert!(p.is_complete());
        assert_eq!(p.status(), LessonStatus::Complete);
        assert_eq!(p.completed_at(), Some(at));
    }

    #[test]
    fn quiz_transitions_follow_state_table() {
        let at = fixed_now() + Duration::minutes(30);
        let mut p = quiz();

        p.pass(Some(at));
        assert_eq!(p.status(), QuizStatus::Passed);
        assert_eq!(p.completed_at(), Some(at));

        p.ungrade(Some(at));
        assert_eq!(p.status(), QuizStatus::Ungraded);
        assert_eq!(p.completed_at(), None);
        assert_eq!(p.updated_at(), at);

        p.grade(Some(at));
        assert_eq!(p.status(), QuizStatus::Graded);
        assert_eq!(p.completed_at(), Some(at));

        let later = at + Duration::minutes(5);
        p.fail(Some(later));
        assert_eq!(p.status(), QuizStatus::Failed);
        assert_eq!(p.completed_at(), None);
        assert_eq!(p.updated_at(), later);
    }

    #[test]
    fn quiz_predicates() {
        let mut p = quiz();
        assert!(!p.is_quiz_submitted());
        assert!(!p.is_quiz_completed());

        p.ungrade(None);
        assert!(p.is_quiz_submitted());
        assert!(!p.is_quiz_completed());

        p.fail(None);
        assert!(p.is_quiz_submitted());
        assert!(p.is_quiz_completed());

        p.grade(None);
        assert!(p.is_quiz_submitted());
        assert!(p.is_quiz_completed());
    }

    #[test]
    fn from_persisted_rejects_inverted_timestamps() {
        let err = CourseProgress::from_persisted(
            ProgressId::new(1),
            SubjectId::new(1),
            UserId::new(1),
            CourseStatus::InProgress,
            None,
            None,
            fixed_now(),
            fixed_now() - Duration::seconds(1),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::InvalidTimeRange);
    }

    #[test]
    fn from_persisted_rejects_completion_on_open_status() {
        let err = QuizProgress::from_persisted(
            ProgressId::new(1),
            SubjectId::new(1),
            UserId::new(1),
            QuizStatus::Failed,
            None,
            Some(fixed_now()),
            fixed_now(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::CompletedWhileOpen { status: "failed" }));
    }

    #[test]
    fn updated_at_never_precedes_created_at() {
        let mut p = quiz();
        p.set_updated_at(fixed_now() - Duration::days(1));
        assert_eq!(p.updated_at(), fixed_now());
        p.set_updated_at(fixed_now() + Duration::days(1));
        assert_eq!(p.updated_at(), fixed_now() + Duration::days(1));
    }

    #[test]
    fn status_vocabulary_round_trips() {
        for status in [
            QuizStatus::InProgress,
            QuizStatus::Passed,
            QuizStatus::Graded,
            QuizStatus::Ungraded,
            QuizStatus::Failed,
        ] {
            assert_eq!(QuizStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(QuizStatus::parse("complete"), None);
        assert_eq!(ProgressType::parse("lesson"), Some(ProgressType::Lesson));
    }
}
