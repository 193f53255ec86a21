//! CLI Commands

pub mod check;
pub mod config;
pub mod evaluate;
pub mod fields;
pub mod formula;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use timeport_forms::{FieldConfig, FormSchema};

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Read a JSON or YAML document, chosen by extension
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if is_yaml(path) {
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Write a document back in the format its extension names
pub fn write_document<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let content = if is_yaml(path) {
        serde_yaml::to_string(data)?
    } else {
        let mut json = serde_json::to_string_pretty(data)?;
        json.push('\n');
        json
    };
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

/// Schema file: a list of field records in any order
pub fn load_schema(path: &Path) -> Result<FormSchema> {
    let fields: Vec<FieldConfig> = read_document(path)?;
    Ok(FormSchema::from_fields(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeport_forms::FieldType;

    const SCHEMA_YAML: &str = r#"
- id: hours
  name: hours
  label: Hours
  type: number
  order: 2
  options: { min: 0, max: 24 }
- id: site
  name: site
  label: Site
  type: select
  order: 1
  options: [north, south]
"#;

    #[test]
    fn test_yaml_schema_sorted_by_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.yaml");
        fs::write(&path, SCHEMA_YAML).unwrap();

        let schema = load_schema(&path).unwrap();
        assert_eq!(schema.fields()[0].id, "site");
        assert_eq!(schema.fields()[1].field_type(), FieldType::Number);
    }

    #[test]
    fn test_write_keeps_format() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("report.yml");
        let json = dir.path().join("report.json");
        fs::write(&yaml, SCHEMA_YAML).unwrap();

        let schema = load_schema(&yaml).unwrap();
        write_document(&json, &schema).unwrap();
        write_document(&yaml, &schema).unwrap();

        assert!(fs::read_to_string(&json).unwrap().trim_start().starts_with('['));
        assert_eq!(load_schema(&json).unwrap(), load_schema(&yaml).unwrap());
    }

    #[test]
    fn test_unreadable_document_has_context() {
        let err = load_schema(Path::new("/nonexistent/schema.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("reading /nonexistent/schema.json"));
    }
}
