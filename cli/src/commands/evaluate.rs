//! Submission evaluation

use crate::config::Config;
use crate::output::{flag, OutputFormat};
use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;
use timeport_forms::{value, FieldValues, FormSchema, SubmissionEvaluator, SubmissionResult};

pub struct Options {
    pub payload: bool,
    pub strict: bool,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Visible")]
    visible: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Disabled")]
    disabled: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Errors")]
    errors: String,
}

#[derive(Tabled)]
struct PayloadRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn handle(
    schema_file: &Path,
    values_file: &Path,
    options: Options,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let schema = super::load_schema(schema_file)?;
    let values: FieldValues = super::read_document(values_file)?;

    let evaluator = SubmissionEvaluator::new(config.engine.clone());
    let result = evaluator.evaluate(&schema, &values);

    if options.payload {
        let payload = result.payload(&schema);
        format.print(&payload, || {
            payload
                .iter()
                .map(|(name, v)| PayloadRow {
                    name: name.clone(),
                    value: value::to_text(v),
                })
                .collect()
        })?;
    } else {
        format.print(&result, || field_rows(&schema, &result))?;
    }

    if format.is_table() {
        if result.valid {
            println!("{}", "valid".green().bold());
        } else {
            println!(
                "{} ({} error(s) on {} field(s))",
                "invalid".red().bold(),
                result.error_count(),
                result.errors.len()
            );
        }
    }

    if options.strict && !result.valid {
        bail!("submission is invalid");
    }
    Ok(())
}

fn field_rows(schema: &FormSchema, result: &SubmissionResult) -> Vec<FieldRow> {
    schema
        .iter()
        .map(|field| {
            let id = field.id.as_str();
            let state = result.states.get(id);
            let label = if field.name.is_empty() { id } else { field.name.as_str() };
            FieldRow {
                field: label.to_string(),
                visible: flag(state.map_or(true, |s| s.visible)),
                required: flag(state.map_or(field.required, |s| s.required)),
                disabled: flag(state.map_or(false, |s| s.disabled)),
                value: result.values.get(id).map(value::to_text).unwrap_or_default(),
                errors: result.errors_for(id).join("; ").red().to_string(),
            }
        })
        .collect()
}
