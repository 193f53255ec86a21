//! Field list editing
//!
//! Edits go through the form builder, so every change is integrity-gated and
//! the file is rewritten with a dense field order.

use crate::output::{flag, OutputFormat};
use crate::FieldCommands;
use anyhow::{anyhow, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;
use timeport_forms::{FieldConfig, FieldKind, FormBuilder, FormPurpose};
use tracing::debug;

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "#")]
    order: u32,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    field_type: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Rules")]
    rules: usize,
    #[tabled(rename = "Conditions")]
    conditions: usize,
    #[tabled(rename = "Calculated")]
    calculated: String,
}

impl From<&FieldConfig> for FieldRow {
    fn from(field: &FieldConfig) -> Self {
        Self {
            order: field.order,
            id: field.id.to_string(),
            name: field.name.clone(),
            field_type: field.field_type().to_string(),
            label: field.label.clone(),
            required: flag(field.required),
            rules: field.validation_rules.len(),
            conditions: field.conditional_logic.len(),
            calculated: flag(field.calculation_config.is_some()),
        }
    }
}

pub fn handle(action: FieldCommands, format: OutputFormat) -> Result<()> {
    match action {
        FieldCommands::List { file } => {
            let schema = super::load_schema(&file)?;
            format.print(schema.fields(), || schema.iter().map(FieldRow::from).collect())?;
        }
        FieldCommands::Add { file, field_type, name, label, required } => {
            edit(&file, |builder| {
                let field = builder.add_field(FieldKind::with_defaults(field_type))?;
                let id = field.id.to_string();
                builder.save_field(field.named(name, label).required(required))?;
                Ok(format!("added field {}", id))
            })?;
        }
        FieldCommands::Remove { file, id } => {
            edit(&file, |builder| {
                let id = resolve(builder, &id)?;
                builder.remove_field(&id)?;
                Ok(format!("removed field {}", id))
            })?;
        }
        FieldCommands::Duplicate { file, id } => {
            edit(&file, |builder| {
                let id = resolve(builder, &id)?;
                let copy = builder.duplicate_field(&id)?;
                Ok(format!("duplicated {} as {} ({})", id, copy.id, copy.name))
            })?;
        }
        FieldCommands::Move { file, from, to } => {
            edit(&file, |builder| {
                builder.move_field(from, to)?;
                Ok(format!("moved field from position {} to {}", from, to))
            })?;
        }
    }
    Ok(())
}

/// Field id for an id or name reference
fn resolve(builder: &FormBuilder, reference: &str) -> Result<String> {
    builder
        .schema()
        .resolve(reference)
        .map(|field| field.id.to_string())
        .ok_or_else(|| anyhow!("no field '{}'", reference))
}

/// Load, apply one builder operation, write back
fn edit<F>(file: &Path, operation: F) -> Result<()>
where
    F: FnOnce(&mut FormBuilder) -> Result<String>,
{
    let schema = super::load_schema(file)?;
    let title = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut builder = FormBuilder::from_schema(title, FormPurpose::default(), schema);

    let message = operation(&mut builder)?;
    for event in builder.take_events() {
        debug!(event = event.event_type(), "applied");
    }

    super::write_document(file, builder.schema())?;
    println!("{} {}", "✓".green(), message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use timeport_forms::FieldType;

    fn schema_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("report.json");
        fs::write(
            &path,
            r#"[
                {"id": "site", "name": "site", "label": "Site", "type": "text", "order": 1},
                {"id": "hours", "name": "hours", "label": "Hours", "type": "number", "order": 2}
            ]"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_add_then_move() {
        let dir = tempfile::tempdir().unwrap();
        let file = schema_file(&dir);

        handle(
            FieldCommands::Add {
                file: file.clone(),
                field_type: FieldType::Date,
                name: "day".into(),
                label: "Day".into(),
                required: true,
            },
            OutputFormat::Table,
        )
        .unwrap();
        handle(FieldCommands::Move { file: file.clone(), from: 2, to: 0 }, OutputFormat::Table).unwrap();

        let schema = super::super::load_schema(&file).unwrap();
        let names: Vec<_> = schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["day", "site", "hours"]);
        assert!(schema.fields()[0].required);
        assert!(schema.is_densely_ordered());
    }

    #[test]
    fn test_rejected_edit_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let file = schema_file(&dir);
        let before = fs::read_to_string(&file).unwrap();

        let clash = FieldCommands::Add {
            file: file.clone(),
            field_type: FieldType::Text,
            name: "site".into(),
            label: "Site again".into(),
            required: false,
        };
        assert!(handle(clash, OutputFormat::Table).is_err());
        assert!(handle(FieldCommands::Remove { file: file.clone(), id: "ghost".into() }, OutputFormat::Table).is_err());
        assert_eq!(fs::read_to_string(&file).unwrap(), before);
    }

    #[test]
    fn test_duplicate_and_remove_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = schema_file(&dir);

        handle(FieldCommands::Duplicate { file: file.clone(), id: "hours".into() }, OutputFormat::Table).unwrap();
        handle(FieldCommands::Remove { file: file.clone(), id: "site".into() }, OutputFormat::Table).unwrap();

        let schema = super::super::load_schema(&file).unwrap();
        let names: Vec<_> = schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["hours", "hours_copy"]);
    }
}
