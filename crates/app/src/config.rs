//! Command-line configuration; every global flag has an environment fallback.

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use services::StorageOptions;
use services::migration::DEFAULT_BATCH_SIZE;
use storage::ProgressBackend;

use crate::output::OutputFormat;

/// Operator tooling for learner progress storage.
#[derive(Parser, Debug)]
#[command(name = "progress-admin")]
#[command(version, about = "Migrate, validate and clean up learner progress")]
pub struct Cli {
    /// SQLite database URL
    #[arg(long, env = "PROGRESS_DB_URL", default_value = "sqlite:dev.sqlite3")]
    pub db: String,

    /// Backend serving live progress reads (comments or tables)
    #[arg(long, env = "PROGRESS_BACKEND", default_value = "comments")]
    pub backend: ProgressBackend,

    /// Mirror live progress writes into both backends
    #[arg(long, env = "PROGRESS_SYNC", value_parser = FalseyValueParser::new())]
    pub sync: bool,

    /// Install the schema before running the command
    #[arg(long)]
    pub bootstrap_schema: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    #[must_use]
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            backend: self.backend,
            sync: self.sync,
            bootstrap_schema: self.bootstrap_schema,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy legacy progress into the tables backend
    Migrate(MigrateArgs),
    /// Compare the legacy and tables backends
    Validate(ValidateArgs),
    /// Delete progress after a subject or learner was removed
    Cascade(CascadeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MigrationKind {
    Progress,
    QuizSubmissions,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    pub kind: MigrationKind,

    /// Read and transform without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Legacy rows per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: u32,

    /// Process a single batch and exit
    #[arg(long)]
    pub once: bool,

    /// Start again from the first legacy row
    #[arg(long)]
    pub reset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValidationKind {
    Progress,
    QuizSubmission,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    pub kind: ValidationKind,

    /// Report format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CascadeTarget {
    Course,
    Lesson,
    Quiz,
    User,
}

#[derive(Args, Debug)]
pub struct CascadeArgs {
    pub target: CascadeTarget,
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("progress-admin").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn migrate_flags() {
        let cli = parse(&[
            "--db",
            "sqlite::memory:",
            "--backend",
            "tables",
            "--sync",
            "migrate",
            "quiz-submissions",
            "--dry-run",
            "--batch-size",
            "10",
        ]);
        assert_eq!(cli.db, "sqlite::memory:");
        assert_eq!(
            cli.storage_options(),
            StorageOptions {
                backend: ProgressBackend::Tables,
                sync: true,
                bootstrap_schema: false,
            }
        );
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.kind, MigrationKind::QuizSubmissions);
        assert!(args.dry_run);
        assert!(!args.once);
        assert_eq!(args.batch_size, 10);
    }

    #[test]
    fn batch_size_defaults_to_fifty_and_rejects_zero() {
        let Command::Migrate(args) = parse(&["--db", "x", "migrate", "progress"]).command else {
            panic!("expected migrate");
        };
        assert_eq!(args.batch_size, 50);

        let err = Cli::try_parse_from([
            "progress-admin",
            "migrate",
            "progress",
            "--batch-size",
            "0",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn validate_and_cascade_subcommands() {
        let Command::Validate(args) = parse(&["validate", "quiz-submission", "--format", "json"])
            .command
        else {
            panic!("expected validate");
        };
        assert_eq!(args.kind, ValidationKind::QuizSubmission);
        assert_eq!(args.format, OutputFormat::Json);

        let Command::Cascade(args) = parse(&["cascade", "user", "42"]).command else {
            panic!("expected cascade");
        };
        assert_eq!(args.target, CascadeTarget::User);
        assert_eq!(args.id, 42);

        let err = Cli::try_parse_from([
            "progress-admin",
            "--backend",
            "mysql",
            "validate",
            "progress",
        ]);
        assert!(err.is_err());
    }
}
