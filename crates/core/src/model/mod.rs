mod ids;
mod progress;
mod submission;

pub use ids::{
    AnswerId, GradeId, LegacyRowId, ParseIdError, ProgressId, QuestionId, SubjectId, SubmissionId,
    UserId,
};

pub use progress::{
    CompletableStatus, CourseProgress, CourseStatus, LessonProgress, LessonStatus, Progress,
    ProgressError, ProgressStatus, ProgressType, QuizProgress, QuizStatus,
};
pub use submission::{Answer, Grade, Submission, grade_for};
