//! Schema integrity check

use crate::output::OutputFormat;
use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;
use timeport_forms::{check_integrity, IntegrityIssue};

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Issue")]
    issue: String,
}

impl IssueRow {
    fn new(level: String, issue: &IntegrityIssue) -> Self {
        let text = issue.to_string();
        let prefix = format!("{}: ", issue.field_id());
        Self {
            level,
            field: issue.field_id().to_string(),
            issue: text.strip_prefix(&prefix).unwrap_or(&text).to_string(),
        }
    }
}

pub fn handle(file: &Path, format: OutputFormat) -> Result<()> {
    let schema = super::load_schema(file)?;
    let report = check_integrity(&schema);

    if format.is_table() && report.errors.is_empty() && report.warnings.is_empty() {
        println!("{} {} fields, no issues", "✓".green(), schema.len());
        return Ok(());
    }

    format.print(&report, || {
        report
            .errors
            .iter()
            .map(|issue| IssueRow::new("error".red().to_string(), issue))
            .chain(
                report
                    .warnings
                    .iter()
                    .map(|issue| IssueRow::new("warning".yellow().to_string(), issue)),
            )
            .collect()
    })?;

    if !report.is_clean() {
        bail!("{} blocking issue(s) in {}", report.errors.len(), file.display());
    }
    Ok(())
}
