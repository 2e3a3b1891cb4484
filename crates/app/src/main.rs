mod config;
mod output;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use progress_core::model::{SubjectId, UserId};
use services::{
    Clock, Migration, MigrationConfig, MigrationSummary, MigrationTask, ProgressServices,
    Validation,
};
use tracing_subscriber::EnvFilter;

use crate::config::{
    CascadeArgs, CascadeTarget, Cli, Command, MigrateArgs, MigrationKind, ValidateArgs,
    ValidationKind,
};
use crate::output::{render_migration, render_validation};

/// Exit status when validation found discrepancies.
const EXIT_DISCREPANCIES: u8 = 1;
/// Exit status for configuration, storage and migration failures.
const EXIT_FAILURE: u8 = 2;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("progress_admin=info,services=info,storage=warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn drive<T: MigrationTask>(
    mut migration: Migration<T>,
    args: &MigrateArgs,
) -> anyhow::Result<ExitCode> {
    if args.reset && !args.dry_run {
        migration.reset().await?;
    }

    let summary = if args.once {
        let rows = migration.run(args.dry_run).await?;
        MigrationSummary {
            batches: u32::from(rows > 0),
            rows,
            skipped: migration.errors().len(),
        }
    } else {
        migration.run_to_completion(args.dry_run).await?
    };

    for err in migration.errors() {
        eprintln!("skipped: {err}");
    }
    println!("{}", render_migration(migration.name(), summary, args.dry_run));
    Ok(ExitCode::SUCCESS)
}

async fn migrate(services: &ProgressServices, args: &MigrateArgs) -> anyhow::Result<ExitCode> {
    let config = MigrationConfig {
        batch_size: args.batch_size,
    };
    match args.kind {
        MigrationKind::Progress => drive(services.progress_migration(config), args).await,
        MigrationKind::QuizSubmissions => {
            drive(services.quiz_submission_migration(config), args).await
        }
    }
}

async fn validate(services: &ProgressServices, args: &ValidateArgs) -> anyhow::Result<ExitCode> {
    let mut validation: Box<dyn Validation> = match args.kind {
        ValidationKind::Progress => Box::new(services.progress_validation()),
        ValidationKind::QuizSubmission => Box::new(services.quiz_submission_validation()),
    };
    validation
        .run()
        .await
        .with_context(|| format!("{} validation could not read storage", validation.name()))?;

    println!(
        "{}",
        render_validation(validation.name(), validation.errors(), args.format)?
    );
    Ok(if validation.has_errors() {
        ExitCode::from(EXIT_DISCREPANCIES)
    } else {
        ExitCode::SUCCESS
    })
}

async fn cascade(services: &ProgressServices, args: &CascadeArgs) -> anyhow::Result<ExitCode> {
    let cascade = services.cascade();
    match args.target {
        CascadeTarget::Course => cascade.course_deleted(SubjectId::new(args.id)).await?,
        CascadeTarget::Lesson => cascade.lesson_deleted(SubjectId::new(args.id)).await?,
        CascadeTarget::Quiz => cascade.quiz_deleted(SubjectId::new(args.id)).await?,
        CascadeTarget::User => cascade.user_deleted(UserId::new(args.id)).await?,
    }
    println!("removed progress for {:?} {}", args.target, args.id);
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let services = ProgressServices::new_sqlite(&cli.db, Clock::default(), cli.storage_options())
        .await
        .with_context(|| format!("failed to open {}", cli.db))?;
    tracing::info!(
        db = %cli.db,
        backend = %cli.backend,
        sync = cli.sync,
        "storage ready"
    );

    match &cli.command {
        Command::Migrate(args) => migrate(&services, args).await,
        Command::Validate(args) => validate(&services, args).await,
        Command::Cascade(args) => cascade(&services, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
