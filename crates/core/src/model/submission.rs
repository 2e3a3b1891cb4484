use chrono::{DateTime, Utc};

use crate::codec::Payload;
use crate::model::ids::{AnswerId, GradeId, QuestionId, SubjectId, SubmissionId, UserId};

/// One learner attempt at a quiz. Unique per `(quiz_id, user_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    id: SubmissionId,
    quiz_id: SubjectId,
    user_id: UserId,
    final_grade: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Submission {
    #[must_use]
    pub fn from_persisted(
        id: SubmissionId,
        quiz_id: SubjectId,
        user_id: UserId,
        final_grade: Option<f64>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            quiz_id,
            user_id,
            final_grade,
            created_at,
            updated_at: updated_at.max(created_at),
        }
    }

    #[must_use]
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> SubjectId {
        self.quiz_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn final_grade(&self) -> Option<f64> {
        self.final_grade
    }

    pub fn set_final_grade(&mut self, grade: Option<f64>) {
        self.final_grade = grade;
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at.max(self.created_at);
    }
}

/// A learner's answer to one question of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: AnswerId,
    pub submission_id: SubmissionId,
    pub question_id: QuestionId,
    pub value: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Points awarded for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub id: GradeId,
    pub answer_id: AnswerId,
    pub question_id: QuestionId,
    pub points: i64,
    pub feedback: Option<Payload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Find the grade awarded for a question.
#[must_use]
pub fn grade_for(grades: &[Grade], question_id: QuestionId) -> Option<&Grade> {
    grades.iter().find(|g| g.question_id == question_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn submission_keeps_updated_at_after_created_at() {
        let mut sub = Submission::from_persisted(
            SubmissionId::new(1),
            SubjectId::new(3),
            UserId::new(4),
            Some(75.0),
            fixed_now(),
            fixed_now() - Duration::hours(1),
        );
        assert_eq!(sub.updated_at(), fixed_now());

        sub.set_final_grade(None);
        sub.set_updated_at(fixed_now() + Duration::hours(1));
        assert_eq!(sub.final_grade(), None);
        assert_eq!(sub.updated_at(), fixed_now() + Duration::hours(1));
    }

    #[test]
    fn grade_lookup_by_question() {
        let grade = Grade {
            id: GradeId::new(1),
            answer_id: AnswerId::new(9),
            question_id: QuestionId::new(30),
            points: 2,
            feedback: Some(Payload::new("nice")),
            created_at: fixed_now(),
            updated_at: fixed_now(),
        };
        let grades = vec![grade.clone()];
        assert_eq!(grade_for(&grades, QuestionId::new(30)), Some(&grade));
        assert_eq!(grade_for(&grades, QuestionId::new(31)), None);
    }
}
