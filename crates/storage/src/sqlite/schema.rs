use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const LEGACY_SCHEMA: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            post_type TEXT NOT NULL,
            post_status TEXT NOT NULL DEFAULT 'publish'
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS postmeta (
            meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_postmeta_post_key
            ON postmeta (post_id, meta_key);
    ",
    r"
        CREATE TABLE IF NOT EXISTS comments (
            comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            comment_post_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            comment_type TEXT NOT NULL,
            comment_approved TEXT NOT NULL,
            comment_date_gmt TEXT NOT NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_comments_type_post_user
            ON comments (comment_type, comment_post_id, user_id);
    ",
    r"
        CREATE TABLE IF NOT EXISTS commentmeta (
            meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
            comment_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_commentmeta_comment_key
            ON commentmeta (comment_id, meta_key);
    ",
];

const TABLES_SCHEMA: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS progress (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            parent_subject_id INTEGER,
            type TEXT NOT NULL CHECK (type IN ('course', 'lesson', 'quiz')),
            status TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (subject_id, user_id, type)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_status
            ON progress (status);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_user_type
            ON progress (user_id, type);
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            quiz_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            final_grade REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (quiz_id, user_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_answers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            submission_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            value TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (submission_id) REFERENCES quiz_submissions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_answers_submission
            ON quiz_answers (submission_id, question_id);
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_grades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            answer_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            points INTEGER NOT NULL,
            feedback TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (answer_id) REFERENCES quiz_answers(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_grades_answer
            ON quiz_grades (answer_id);
    ",
    r"
        CREATE TABLE IF NOT EXISTS migration_checkpoints (
            name TEXT PRIMARY KEY,
            last_id INTEGER NOT NULL CHECK (last_id >= 0),
            updated_at TEXT NOT NULL
        );
    ",
];

/// Versioned schema bootstrap.
///
/// Version 1 installs the host platform's generic content and comment tables
/// (normally owned by the platform itself); version 2 the progress tables.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
        ",
    )
    .execute(pool)
    .await?;

    apply(pool, 1, LEGACY_SCHEMA).await?;
    apply(pool, 2, TABLES_SCHEMA).await?;
    Ok(())
}

async fn apply(pool: &SqlitePool, version: i64, statements: &[&str]) -> Result<(), SqliteInitError> {
    let applied = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
        .bind(version)
        .fetch_optional(pool)
        .await?
        .is_some();
    if applied {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(version)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(version, "applied schema migration");
    Ok(())
}
