//! Rendering of command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use services::{MigrationSummary, ValidationError, ValidationRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per discrepancy followed by its rows
    Table,
    /// Machine-readable report
    Json,
}

fn rows_table(rows: &[ValidationRow]) -> Table {
    let mut table = Table::new();
    if let Some(first) = rows.first() {
        table.set_header(first.iter().map(|(column, _)| Cell::new(column)));
    }
    for row in rows {
        table.add_row(row.iter().map(|(_, value)| Cell::new(value)));
    }
    table
}

/// # Errors
///
/// Returns an error if the JSON report cannot be serialized.
pub fn render_validation(
    name: &str,
    errors: &[ValidationError],
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "validation": name,
            "ok": errors.is_empty(),
            "errors": errors,
        })),
        OutputFormat::Table => {
            if errors.is_empty() {
                return Ok(format!("{name}: no discrepancies found"));
            }
            let mut out = format!("{name}: {} discrepancies", errors.len());
            for error in errors {
                out.push_str("\n\n");
                out.push_str(&error.message);
                if let Some(rows) = error.data.as_deref().filter(|rows| !rows.is_empty()) {
                    out.push('\n');
                    out.push_str(&rows_table(rows).to_string());
                }
            }
            Ok(out)
        }
    }
}

#[must_use]
pub fn render_migration(name: &str, summary: MigrationSummary, dry_run: bool) -> String {
    let mode = if dry_run { " (dry run)" } else { "" };
    format!(
        "{name}{mode}: {} legacy rows in {} batches, {} skipped",
        summary.rows, summary.batches, summary.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrepancy() -> ValidationError {
        ValidationError::with_rows(
            "progress missing from tables (1)",
            vec![vec![
                ("type", "lesson".to_owned()),
                ("subject_id", "20".to_owned()),
                ("user_id", "7".to_owned()),
            ]],
        )
    }

    #[test]
    fn clean_report_is_one_line() {
        let out = render_validation("progress", &[], OutputFormat::Table).unwrap();
        assert_eq!(out, "progress: no discrepancies found");
    }

    #[test]
    fn table_report_lists_rows_under_message() {
        let errors = [
            ValidationError::new("course progress count mismatch: legacy 3, tables 2"),
            discrepancy(),
        ];
        let out = render_validation("progress", &errors, OutputFormat::Table).unwrap();
        assert!(out.starts_with("progress: 2 discrepancies"));
        assert!(out.contains("course progress count mismatch"));
        assert!(out.contains("subject_id"));
        assert!(out.contains("lesson"));
    }

    #[test]
    fn json_report_carries_rows() {
        let out = render_validation("progress", &[discrepancy()], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(
            value["errors"][0]["message"],
            "progress missing from tables (1)"
        );
        assert_eq!(value["errors"][0]["data"][0][1][1], "20");
    }

    #[test]
    fn migration_summary_line() {
        let summary = MigrationSummary {
            batches: 3,
            rows: 150,
            skipped: 2,
        };
        assert_eq!(
            render_migration("progress", summary, true),
            "progress (dry run): 150 legacy rows in 3 batches, 2 skipped"
        );
    }
}
