use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use progress_core::codec::Payload;
use progress_core::model::{
    CourseStatus, LegacyRowId, LessonStatus, ProgressType, QuestionId, QuizStatus, SubjectId,
    UserId,
};
use progress_core::time::{fixed_clock, fixed_now};
use services::{
    Migration, MigrationConfig, MigrationError, ProgressMigration, ProgressServices,
    ProgressValidation, QuizSubmissionMigration, QuizSubmissionValidation, StorageOptions,
    TransformationError, Validation,
};
use storage::records::{LegacyActivity, OrphanRow, ProgressRecord, SubmissionRecord};
use storage::repository::{ProgressRepository, ProgressTarget, StorageError, SubmissionTarget};
use storage::sqlite::{LegacyAttempt, SqliteDatabase, TablesRepository};
use storage::{Checkpoint, InMemoryCheckpoint, ProgressBackend};

const COURSE: SubjectId = SubjectId::new(10);
const LESSON: SubjectId = SubjectId::new(20);
const STRICT_LESSON: SubjectId = SubjectId::new(21);
const QUIZ: SubjectId = SubjectId::new(30);
const STRICT_QUIZ: SubjectId = SubjectId::new(31);
const QUESTION: QuestionId = QuestionId::new(41);
const ALICE: UserId = UserId::new(1);
const BOB: UserId = UserId::new(2);

fn db_url(name: &str) -> String {
    format!("sqlite:file:memdb_{name}?mode=memory&cache=shared")
}

async fn setup(name: &str) -> SqliteDatabase {
    let db = SqliteDatabase::connect(&db_url(name))
        .await
        .expect("connect")
        .with_clock(fixed_clock());
    db.migrate().await.expect("migrate");

    let seed = db.legacy_seed();
    seed.course(COURSE).await.unwrap();
    seed.lesson(LESSON, Some(COURSE), Some((QUIZ, false)))
        .await
        .unwrap();
    seed.lesson(STRICT_LESSON, Some(COURSE), Some((STRICT_QUIZ, true)))
        .await
        .unwrap();
    seed.question(QUESTION).await.unwrap();
    db
}

async fn status_comment(
    db: &SqliteDatabase,
    activity: LegacyActivity,
    post: SubjectId,
    user: UserId,
    status: &str,
) -> LegacyRowId {
    let start = fixed_now() - Duration::hours(3);
    db.legacy_seed()
        .status_comment(activity, post, user, status, start + Duration::hours(1), Some(start))
        .await
        .unwrap()
}

fn progress_migration(db: &SqliteDatabase) -> (Migration<ProgressMigration>, Arc<InMemoryCheckpoint>) {
    let checkpoint = Arc::new(InMemoryCheckpoint::new());
    let task = ProgressMigration::new(Arc::new(db.comments()), Arc::new(db.tables()));
    (
        Migration::new(task, checkpoint.clone(), MigrationConfig::default()),
        checkpoint,
    )
}

fn quiz_migration(db: &SqliteDatabase) -> Migration<QuizSubmissionMigration> {
    let task = QuizSubmissionMigration::new(Arc::new(db.comments()), Arc::new(db.tables()));
    Migration::new(
        task,
        Arc::new(InMemoryCheckpoint::new()),
        MigrationConfig::default(),
    )
}

fn progress_validation(db: &SqliteDatabase) -> ProgressValidation {
    ProgressValidation::new(Arc::new(db.comments()), Arc::new(db.tables()))
}

async fn seed_course_learners(db: &SqliteDatabase, learners: u64) {
    for user in 1..=learners {
        status_comment(
            db,
            LegacyActivity::CourseStatus,
            COURSE,
            UserId::new(user),
            if user % 2 == 0 { "complete" } else { "in-progress" },
        )
        .await;
    }
}

#[tokio::test]
async fn progress_migration_runs_in_batches_of_fifty() {
    let db = setup("batches_of_fifty").await;
    seed_course_learners(&db, 150).await;
    let (mut migration, checkpoint) = progress_migration(&db);

    let mut counts = Vec::new();
    for _ in 0..4 {
        counts.push(migration.run(false).await.unwrap());
    }
    assert_eq!(counts, vec![50, 50, 50, 0]);
    assert!(migration.errors().is_empty());

    let tables = db.tables();
    assert_eq!(tables.count_progress(ProgressType::Course).await.unwrap(), 150);
    assert_eq!(
        checkpoint.load(ProgressMigration::NAME).await.unwrap(),
        LegacyRowId::new(150)
    );

    let mut validation = progress_validation(&db);
    validation.run().await.unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors());
}

#[tokio::test]
async fn rerunning_from_scratch_is_idempotent() {
    let db = setup("idempotent_rerun").await;
    seed_course_learners(&db, 60).await;
    status_comment(&db, LegacyActivity::LessonStatus, LESSON, ALICE, "graded").await;
    let (mut migration, _) = progress_migration(&db);

    let first = migration.run_to_completion(false).await.unwrap();
    assert_eq!(first.rows, 61);
    assert_eq!(first.batches, 2);

    let tables = db.tables();
    let before = tables
        .find_progress_record(ProgressType::Quiz, QUIZ, ALICE)
        .await
        .unwrap()
        .unwrap();

    migration.reset().await.unwrap();
    let second = migration.run_to_completion(false).await.unwrap();
    assert_eq!(second.rows, 61);

    assert_eq!(tables.count_progress(ProgressType::Course).await.unwrap(), 60);
    assert_eq!(tables.count_progress(ProgressType::Lesson).await.unwrap(), 1);
    assert_eq!(tables.count_progress(ProgressType::Quiz).await.unwrap(), 1);
    let after = tables
        .find_progress_record(ProgressType::Quiz, QUIZ, ALICE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

/// Delegates to the tables backend but fails the next commit on demand.
struct FlakyTarget {
    inner: TablesRepository,
    fail_next: AtomicBool,
}

#[async_trait]
impl ProgressTarget for FlakyTarget {
    async fn upsert_progress_batch(&self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.upsert_progress_batch(records).await
    }

    async fn find_progress_record(
        &self,
        kind: ProgressType,
        subject_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        self.inner
            .find_progress_record(kind, subject_id, user_id)
            .await
    }

    async fn count_progress(&self, kind: ProgressType) -> Result<u64, StorageError> {
        self.inner.count_progress(kind).await
    }

    async fn list_progress_keys(
        &self,
        kind: ProgressType,
    ) -> Result<Vec<(SubjectId, UserId)>, StorageError> {
        self.inner.list_progress_keys(kind).await
    }
}

#[tokio::test]
async fn failed_commit_leaves_checkpoint_for_retry() {
    let db = setup("resume_after_failure").await;
    seed_course_learners(&db, 70).await;

    let target = Arc::new(FlakyTarget {
        inner: db.tables(),
        fail_next: AtomicBool::new(false),
    });
    let checkpoint = Arc::new(InMemoryCheckpoint::new());
    let mut migration = Migration::new(
        ProgressMigration::new(Arc::new(db.comments()), target.clone()),
        checkpoint.clone(),
        MigrationConfig::default(),
    );

    assert_eq!(migration.run(false).await.unwrap(), 50);
    target.fail_next.store(true, Ordering::SeqCst);
    let err = migration.run(false).await.unwrap_err();
    assert!(matches!(err, MigrationError::BatchCommit(_)));
    assert_eq!(
        checkpoint.load(ProgressMigration::NAME).await.unwrap(),
        LegacyRowId::new(50)
    );
    assert_eq!(
        db.tables().count_progress(ProgressType::Course).await.unwrap(),
        50
    );

    assert_eq!(migration.run(false).await.unwrap(), 20);
    assert_eq!(migration.run(false).await.unwrap(), 0);
    assert_eq!(
        db.tables().count_progress(ProgressType::Course).await.unwrap(),
        70
    );
}

#[tokio::test]
async fn dry_run_reads_but_never_writes() {
    let db = setup("dry_run").await;
    seed_course_learners(&db, 55).await;
    let (mut migration, checkpoint) = progress_migration(&db);

    assert_eq!(migration.run(true).await.unwrap(), 50);
    assert_eq!(migration.run(true).await.unwrap(), 50);
    let summary = migration.run_to_completion(true).await.unwrap();
    assert_eq!(summary.rows, 55);

    assert_eq!(
        db.tables().count_progress(ProgressType::Course).await.unwrap(),
        0
    );
    assert_eq!(
        checkpoint.load(ProgressMigration::NAME).await.unwrap(),
        LegacyRowId::START
    );
}

#[tokio::test]
async fn failed_lesson_migrates_per_pass_requirement() {
    let db = setup("failed_equivalence").await;
    status_comment(&db, LegacyActivity::CourseStatus, COURSE, ALICE, "complete").await;
    status_comment(&db, LegacyActivity::LessonStatus, LESSON, ALICE, "failed").await;
    status_comment(&db, LegacyActivity::LessonStatus, STRICT_LESSON, BOB, "failed").await;
    let (mut migration, _) = progress_migration(&db);
    migration.run_to_completion(false).await.unwrap();

    let tables = db.tables();
    let lesson = tables
        .find_progress_record(ProgressType::Lesson, LESSON, ALICE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lesson.status, "complete");
    assert_eq!(lesson.parent_subject_id, Some(COURSE));
    assert!(lesson.completed_at.is_some());

    let strict = tables
        .find_progress_record(ProgressType::Lesson, STRICT_LESSON, BOB)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(strict.status, "in-progress");
    assert_eq!(strict.completed_at, None);

    let quiz = tables
        .find_progress_record(ProgressType::Quiz, STRICT_QUIZ, BOB)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quiz.status, "failed");
    assert_eq!(quiz.parent_subject_id, Some(STRICT_LESSON));

    let mut validation = progress_validation(&db);
    validation.run().await.unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors());
}

#[tokio::test]
async fn validation_reports_drift_and_tables_only_rows() {
    let db = setup("validation_drift").await;
    status_comment(&db, LegacyActivity::LessonStatus, LESSON, ALICE, "passed").await;
    let (mut migration, _) = progress_migration(&db);
    migration.run_to_completion(false).await.unwrap();

    let tables = db.tables();
    let mut drifted = tables
        .find_progress_record(ProgressType::Lesson, LESSON, ALICE)
        .await
        .unwrap()
        .unwrap();
    drifted.status = "in-progress".to_owned();
    drifted.completed_at = None;
    drifted.updated_at += Duration::hours(1);
    let stray = ProgressRecord {
        user_id: UserId::new(99),
        ..drifted.clone()
    };
    tables
        .upsert_progress_batch(&[drifted, stray])
        .await
        .unwrap();

    let mut validation = progress_validation(&db);
    validation.run().await.unwrap();
    let messages: Vec<&str> = validation
        .errors()
        .iter()
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(
        messages,
        vec![
            "lesson progress count mismatch: legacy 1, tables 2",
            "progress differs between legacy and tables (2)",
            "progress only in tables (1)",
        ]
    );
    let rows = validation.errors()[1].data.as_ref().unwrap();
    assert!(rows[0].contains(&("field", "status".to_owned())));
    assert!(rows[0].contains(&("tables", "in-progress".to_owned())));
}

#[tokio::test]
async fn row_for_deleted_lesson_is_skipped_and_passed() {
    let db = setup("skip_missing_lesson").await;
    status_comment(&db, LegacyActivity::LessonStatus, SubjectId::new(404), ALICE, "complete")
        .await;
    let last = status_comment(&db, LegacyActivity::CourseStatus, COURSE, ALICE, "complete").await;
    let (mut migration, checkpoint) = progress_migration(&db);

    assert_eq!(migration.run(false).await.unwrap(), 2);
    assert_eq!(migration.errors().len(), 1);
    assert!(matches!(
        &migration.errors()[0],
        MigrationError::Transformation {
            error: TransformationError::MissingSubject(id),
            ..
        } if *id == SubjectId::new(404)
    ));
    assert_eq!(
        checkpoint.load(ProgressMigration::NAME).await.unwrap(),
        last
    );
    assert_eq!(
        db.tables().count_progress(ProgressType::Course).await.unwrap(),
        1
    );
}

async fn attempt(db: &SqliteDatabase, user: UserId, questions: &[QuestionId]) {
    let comment = status_comment(db, LegacyActivity::LessonStatus, LESSON, user, "graded").await;
    let answers: BTreeMap<QuestionId, Payload> = questions
        .iter()
        .map(|&q| (q, Payload::new(serde_json::json!({ "choice": q.value() }))))
        .collect();
    let points = questions.iter().map(|&q| (q, 2)).collect();
    let feedback = BTreeMap::from([(questions[0], Payload::new("nice"))]);
    db.legacy_seed()
        .attempt(
            comment,
            &LegacyAttempt {
                answers,
                points,
                feedback,
                final_grade: Some(80.0),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn submission_with_unknown_question_is_skipped_whole() {
    let db = setup("submission_atomicity").await;
    attempt(&db, ALICE, &[QUESTION]).await;
    attempt(&db, BOB, &[QUESTION, QuestionId::new(999)]).await;

    let mut migration = quiz_migration(&db);
    assert_eq!(migration.run(false).await.unwrap(), 2);
    assert_eq!(migration.errors().len(), 1);
    assert!(matches!(
        &migration.errors()[0],
        MigrationError::Transformation {
            error: TransformationError::UnknownQuestion(q),
            ..
        } if *q == QuestionId::new(999)
    ));

    let tables = db.tables();
    assert_eq!(tables.count_submissions().await.unwrap(), 1);
    assert!(tables.find_submission_record(QUIZ, BOB).await.unwrap().is_none());

    let alice = tables
        .find_submission_record(QUIZ, ALICE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.final_grade, Some(80.0));
    assert_eq!(alice.answers.len(), 1);
    let grade = alice.answers[0].grade.as_ref().unwrap();
    assert_eq!(grade.points, 2);
    assert_eq!(grade.feedback, Some(Payload::new("nice")));
}

#[tokio::test]
async fn migrated_submissions_validate_clean() {
    let db = setup("submission_validation").await;
    attempt(&db, ALICE, &[QUESTION]).await;
    let (mut progress, _) = progress_migration(&db);
    progress.run_to_completion(false).await.unwrap();
    quiz_migration(&db).run_to_completion(false).await.unwrap();

    let mut validation = QuizSubmissionValidation::new(Arc::new(db.comments()), Arc::new(db.tables()));
    validation.run().await.unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors());
}

#[tokio::test]
async fn submission_without_quiz_progress_is_an_orphan() {
    let db = setup("submission_orphan").await;
    attempt(&db, ALICE, &[QUESTION]).await;
    quiz_migration(&db).run_to_completion(false).await.unwrap();

    let mut validation = QuizSubmissionValidation::new(Arc::new(db.comments()), Arc::new(db.tables()));
    validation.run().await.unwrap();
    assert_eq!(validation.errors().len(), 1);
    let err = &validation.errors()[0];
    assert_eq!(err.message, "rows referencing a missing parent (1)");
    let row = &err.data.as_ref().unwrap()[0];
    assert!(row.contains(&("table", "quiz_submissions".to_owned())));
}

#[tokio::test]
async fn services_wire_migration_and_cascade() {
    let services = ProgressServices::new_sqlite(
        &db_url("services_wiring"),
        fixed_clock(),
        StorageOptions {
            backend: ProgressBackend::Tables,
            sync: false,
            bootstrap_schema: true,
        },
    )
    .await
    .unwrap();
    let db = setup("services_wiring").await;
    status_comment(&db, LegacyActivity::CourseStatus, COURSE, ALICE, "complete").await;
    status_comment(&db, LegacyActivity::LessonStatus, LESSON, ALICE, "passed").await;
    status_comment(&db, LegacyActivity::LessonStatus, LESSON, BOB, "ungraded").await;

    let summary = services
        .progress_migration(MigrationConfig { batch_size: 2 })
        .run_to_completion(false)
        .await
        .unwrap();
    assert_eq!(summary.batches, 2);

    let storage = services.storage();
    assert!(storage.courses.has(COURSE, ALICE).await.unwrap());
    let quiz = storage.quizzes.get(QUIZ, BOB).await.unwrap().unwrap();
    assert!(quiz.is_quiz_submitted());
    assert!(!quiz.is_quiz_completed());

    let cascade = services.cascade();
    cascade.user_deleted(ALICE).await.unwrap();
    assert!(!storage.courses.has(COURSE, ALICE).await.unwrap());
    assert!(!storage.lessons.has(LESSON, ALICE).await.unwrap());
    assert!(storage.lessons.has(LESSON, BOB).await.unwrap());

    cascade.quiz_deleted(QUIZ).await.unwrap();
    assert!(storage.quizzes.get_all(QUIZ).await.unwrap().is_empty());
    assert!(storage.lessons.has(LESSON, BOB).await.unwrap());
}

#[tokio::test]
async fn missing_schema_is_a_configuration_error() {
    let services = ProgressServices::new_sqlite(
        &db_url("services_no_schema"),
        fixed_clock(),
        StorageOptions::default(),
    )
    .await
    .unwrap();

    let err = services
        .progress_migration(MigrationConfig::default())
        .run(false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Configuration(StorageError::Schema(_))
    ));
}

#[tokio::test]
async fn retried_batch_reports_skipped_rows_once() {
    let db = setup("retry_skips_once").await;
    status_comment(&db, LegacyActivity::LessonStatus, SubjectId::new(404), ALICE, "complete")
        .await;
    status_comment(&db, LegacyActivity::CourseStatus, COURSE, ALICE, "complete").await;

    let target = Arc::new(FlakyTarget {
        inner: db.tables(),
        fail_next: AtomicBool::new(true),
    });
    let mut migration = Migration::new(
        ProgressMigration::new(Arc::new(db.comments()), target),
        Arc::new(InMemoryCheckpoint::new()),
        MigrationConfig::default(),
    );

    let err = migration.run(false).await.unwrap_err();
    assert!(matches!(err, MigrationError::BatchCommit(_)));
    assert!(migration.errors().is_empty());

    let summary = migration.run_to_completion(false).await.unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(migration.errors().len(), 1);
}

#[tokio::test]
async fn duplicate_legacy_comments_migrate_to_what_legacy_reads() {
    let db = setup("duplicate_comments").await;
    let seed = db.legacy_seed();
    let start = fixed_now() - Duration::hours(8);
    seed.status_comment(
        LegacyActivity::CourseStatus,
        COURSE,
        ALICE,
        "in-progress",
        fixed_now() - Duration::hours(5),
        Some(start),
    )
    .await
    .unwrap();
    seed.status_comment(LegacyActivity::CourseStatus, COURSE, ALICE, "complete", fixed_now(), Some(start))
        .await
        .unwrap();
    let (mut migration, _) = progress_migration(&db);
    migration.run_to_completion(false).await.unwrap();

    let comments = db.comments();
    let tables = db.tables();
    let legacy: &dyn ProgressRepository<CourseStatus> = &comments;
    let migrated: &dyn ProgressRepository<CourseStatus> = &tables;
    let legacy = legacy.get(COURSE, ALICE).await.unwrap().unwrap();
    let migrated = migrated.get(COURSE, ALICE).await.unwrap().unwrap();
    assert_eq!(legacy.status(), CourseStatus::Complete);
    assert_eq!(migrated.status(), legacy.status());
    assert_eq!(migrated.completed_at(), legacy.completed_at());

    let mut validation = progress_validation(&db);
    validation.run().await.unwrap();
    assert!(!validation.has_errors(), "{:?}", validation.errors());
}

#[tokio::test]
async fn migrated_statuses_read_the_same_on_both_backends() {
    let db = setup("status_equivalence").await;
    let raw = ["in-progress", "complete", "passed", "graded", "ungraded", "failed"];
    let mut learners = Vec::new();
    for (n, status) in (1_u64..).zip(raw) {
        let user = UserId::new(n);
        status_comment(&db, LegacyActivity::LessonStatus, LESSON, user, status).await;
        status_comment(&db, LegacyActivity::LessonStatus, STRICT_LESSON, user, status).await;
        learners.push(user);
    }
    let (mut migration, _) = progress_migration(&db);
    migration.run_to_completion(false).await.unwrap();
    assert!(migration.errors().is_empty());

    let comments = db.comments();
    let tables = db.tables();
    let legacy_lessons: &dyn ProgressRepository<LessonStatus> = &comments;
    let table_lessons: &dyn ProgressRepository<LessonStatus> = &tables;
    let legacy_quizzes: &dyn ProgressRepository<QuizStatus> = &comments;
    let table_quizzes: &dyn ProgressRepository<QuizStatus> = &tables;

    for user in learners {
        for (lesson, quiz) in [(LESSON, QUIZ), (STRICT_LESSON, STRICT_QUIZ)] {
            let before = legacy_lessons.get(lesson, user).await.unwrap().unwrap();
            let after = table_lessons.get(lesson, user).await.unwrap().unwrap();
            assert_eq!(after.status(), before.status(), "lesson {lesson} user {user}");
            assert_eq!(after.completed_at(), before.completed_at());

            let before = legacy_quizzes.get(quiz, user).await.unwrap().unwrap();
            let after = table_quizzes.get(quiz, user).await.unwrap().unwrap();
            assert_eq!(after.status(), before.status(), "quiz {quiz} user {user}");
            assert_eq!(after.is_quiz_submitted(), before.is_quiz_submitted());
            assert_eq!(after.is_quiz_completed(), before.is_quiz_completed());
        }
    }
}

/// Submission target that fails the next commit on demand.
struct FlakySubmissions {
    inner: TablesRepository,
    fail_next: AtomicBool,
}

#[async_trait]
impl SubmissionTarget for FlakySubmissions {
    async fn upsert_submission_batch(
        &self,
        records: &[SubmissionRecord],
    ) -> Result<(), StorageError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.upsert_submission_batch(records).await
    }

    async fn find_submission_record(
        &self,
        quiz_id: SubjectId,
        user_id: UserId,
    ) -> Result<Option<SubmissionRecord>, StorageError> {
        self.inner.find_submission_record(quiz_id, user_id).await
    }

    async fn count_submissions(&self) -> Result<u64, StorageError> {
        self.inner.count_submissions().await
    }

    async fn list_submission_keys(&self) -> Result<Vec<(SubjectId, UserId)>, StorageError> {
        self.inner.list_submission_keys().await
    }

    async fn orphaned_rows(&self) -> Result<Vec<OrphanRow>, StorageError> {
        self.inner.orphaned_rows().await
    }
}

#[tokio::test]
async fn quiz_submission_migration_resumes_after_failed_commit() {
    let db = setup("submission_resume").await;
    for user in 1..=3 {
        attempt(&db, UserId::new(user), &[QUESTION]).await;
    }

    let target = Arc::new(FlakySubmissions {
        inner: db.tables(),
        fail_next: AtomicBool::new(false),
    });
    let checkpoint = Arc::new(InMemoryCheckpoint::new());
    let mut migration = Migration::new(
        QuizSubmissionMigration::new(Arc::new(db.comments()), target.clone()),
        checkpoint.clone(),
        MigrationConfig { batch_size: 2 },
    );

    assert_eq!(migration.run(false).await.unwrap(), 2);
    let cursor = checkpoint.load(QuizSubmissionMigration::NAME).await.unwrap();

    target.fail_next.store(true, Ordering::SeqCst);
    let err = migration.run(false).await.unwrap_err();
    assert!(matches!(err, MigrationError::BatchCommit(_)));
    assert_eq!(
        checkpoint.load(QuizSubmissionMigration::NAME).await.unwrap(),
        cursor
    );
    assert_eq!(db.tables().count_submissions().await.unwrap(), 2);

    assert_eq!(migration.run(false).await.unwrap(), 1);
    assert_eq!(migration.run(false).await.unwrap(), 0);
    assert!(migration.errors().is_empty());

    let tables = db.tables();
    assert_eq!(tables.count_submissions().await.unwrap(), 3);
    let last = tables
        .find_submission_record(QUIZ, UserId::new(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.answers.len(), 1);
    assert_eq!(last.final_grade, Some(80.0));
}
