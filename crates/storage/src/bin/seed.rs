use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use progress_core::codec::Payload;
use progress_core::model::{QuestionId, SubjectId, UserId};
use storage::records::LegacyActivity;
use storage::sqlite::{LegacyAttempt, SqliteDatabase};

const LESSON_STATUSES: [&str; 6] = [
    "in-progress",
    "complete",
    "passed",
    "graded",
    "ungraded",
    "failed",
];

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| format!("expected RFC3339, got {raw}"))
}

/// Seeds courses, lessons, quizzes and legacy progress comments.
#[derive(Parser, Debug, Clone)]
#[command(name = "seed")]
struct Args {
    /// SQLite URL
    #[arg(
        long = "db",
        env = "PROGRESS_DB_URL",
        default_value = "sqlite:dev.sqlite3",
        value_parser = NonEmptyStringValueParser::new()
    )]
    db_url: String,

    /// Number of courses
    #[arg(long, env = "PROGRESS_SEED_COURSES", default_value_t = 2)]
    courses: u32,

    /// Lessons per course, each with a quiz
    #[arg(long, env = "PROGRESS_SEED_LESSONS", default_value_t = 3)]
    lessons: u32,

    /// Learners with progress
    #[arg(long, env = "PROGRESS_SEED_USERS", default_value_t = 10)]
    users: u32,

    /// Fixed current time for deterministic seeding
    #[arg(long, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let db = SqliteDatabase::connect(&args.db_url).await?;
    db.migrate().await?;
    let seed = db.legacy_seed();
    let now = args.now.unwrap_or_else(Utc::now);

    // Ids: courses 1000+, lessons 2000+, quizzes 3000+, questions 4000+.
    let mut comments = 0_u32;
    for c in 0..args.courses {
        let course_id = SubjectId::new(1000 + u64::from(c));
        seed.course(course_id).await?;

        for l in 0..args.lessons {
            let n = u64::from(c * args.lessons + l);
            let lesson_id = SubjectId::new(2000 + n);
            let quiz_id = SubjectId::new(3000 + n);
            let question_id = QuestionId::new(4000 + n);
            seed.lesson(lesson_id, Some(course_id), Some((quiz_id, l % 2 == 0)))
                .await?;
            seed.question(question_id).await?;

            for u in 0..args.users {
                let user_id = UserId::new(1 + u64::from(u));
                let offset = u64::from(u) + n;
                let status = LESSON_STATUSES[(offset % 6) as usize];
                let start = now - Duration::days(i64::from(u) + 1);
                let comment = seed
                    .status_comment(
                        LegacyActivity::LessonStatus,
                        lesson_id,
                        user_id,
                        status,
                        start + Duration::hours(1),
                        Some(start),
                    )
                    .await?;
                comments += 1;

                if status != "in-progress" && status != "complete" {
                    let mut attempt = LegacyAttempt {
                        answers: BTreeMap::from([(question_id, Payload::new("true"))]),
                        final_grade: Some(if status == "failed" { 0.0 } else { 100.0 }),
                        ..LegacyAttempt::default()
                    };
                    if status != "ungraded" {
                        let points = if status == "failed" { 0 } else { 1 };
                        attempt.points.insert(question_id, points);
                    }
                    seed.attempt(comment, &attempt).await?;
                }
            }
        }

        for u in 0..args.users {
            let start = now - Duration::days(i64::from(u) + 2);
            let status = if u % 3 == 0 { "complete" } else { "in-progress" };
            seed.status_comment(
                LegacyActivity::CourseStatus,
                course_id,
                UserId::new(1 + u64::from(u)),
                status,
                start + Duration::days(1),
                Some(start),
            )
            .await?;
            comments += 1;
        }
    }

    println!(
        "Seeded {} courses with {} lessons each and {} legacy status comments into {}",
        args.courses, args.lessons, comments, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "seed",
            "--db",
            "sqlite::memory:",
            "--users",
            "4",
            "--now",
            "2024-03-01T12:00:00Z",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.users, 4);
        assert_eq!(args.lessons, 3);
        assert_eq!(args.now.unwrap().to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn rejects_empty_db_and_bad_time() {
        assert!(Args::try_parse_from(["seed", "--db", ""]).is_err());
        assert!(Args::try_parse_from(["seed", "--now", "yesterday"]).is_err());
        assert!(Args::try_parse_from(["seed", "--courses", "-1"]).is_err());
    }
}
