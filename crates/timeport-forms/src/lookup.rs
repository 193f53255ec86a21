//! Field-value lookup shared by the conditional and calculation engines

use crate::domain::aggregates::FormSchema;
use crate::domain::value_objects::{FieldConfig, FieldValues};
use serde_json::Value;
use tracing::{debug, warn};

/// Outcome of resolving a rule reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// No field answers to the reference
    Dangling,
    /// The field exists but has no value
    Absent(&'a FieldConfig),
    /// The field exists and has a value
    Present(&'a FieldConfig, &'a Value),
}

impl<'a> Resolved<'a> {
    /// The value, if the field exists and has one
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Resolved::Present(_, value) => Some(value),
            _ => None,
        }
    }

    pub fn is_dangling(&self) -> bool {
        matches!(self, Resolved::Dangling)
    }
}

/// Read-only view of a schema plus the current value set
#[derive(Debug, Clone, Copy)]
pub struct FieldLookup<'a> {
    schema: &'a FormSchema,
    values: &'a FieldValues,
    log_dangling: bool,
}

impl<'a> FieldLookup<'a> {
    pub fn new(schema: &'a FormSchema, values: &'a FieldValues) -> Self {
        Self {
            schema,
            values,
            log_dangling: true,
        }
    }

    pub fn log_dangling(mut self, enabled: bool) -> Self {
        self.log_dangling = enabled;
        self
    }

    pub fn schema(&self) -> &'a FormSchema {
        self.schema
    }

    pub fn values(&self) -> &'a FieldValues {
        self.values
    }

    /// Resolve a reference (field id, else field name) to its field and value
    ///
    /// Values are looked up by the field's id first, then by its name.
    pub fn resolve(&self, reference: &str) -> Resolved<'a> {
        let Some(field) = self.schema.resolve(reference) else {
            if self.log_dangling {
                warn!(reference = %reference, "rule references a field that is not in the schema");
            } else {
                debug!(reference = %reference, "dangling field reference");
            }
            return Resolved::Dangling;
        };
        self.value_of(field)
            .map_or(Resolved::Absent(field), |value| Resolved::Present(field, value))
    }

    /// Current value of a field, `null` values count as absent
    pub fn value_of(&self, field: &FieldConfig) -> Option<&'a Value> {
        self.values
            .get(field.id.as_str())
            .or_else(|| self.values.get(&field.name))
            .filter(|v| !v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::FieldKind;
    use serde_json::json;

    #[test]
    fn test_resolution_outcomes() {
        let schema = FormSchema::from_fields(vec![
            FieldConfig::with_id("f-1", FieldKind::Date).named("start", "Start"),
            FieldConfig::with_id("f-2", FieldKind::Date).named("end", "End"),
        ]);
        let mut values = FieldValues::new();
        values.insert("f-1".into(), json!("2024-01-01"));
        values.insert("end".into(), Value::Null);
        let lookup = FieldLookup::new(&schema, &values).log_dangling(false);

        assert_eq!(lookup.resolve("start").value(), Some(&json!("2024-01-01")));
        assert!(matches!(lookup.resolve("f-2"), Resolved::Absent(_)));
        assert!(lookup.resolve("gone").is_dangling());
    }

    #[test]
    fn test_values_keyed_by_name() {
        let schema = FormSchema::from_fields(vec![
            FieldConfig::with_id("f-1", FieldKind::Email).named("email", "Email"),
        ]);
        let mut values = FieldValues::new();
        values.insert("email".into(), json!("a@b.com"));
        let lookup = FieldLookup::new(&schema, &values);

        assert_eq!(lookup.resolve("f-1").value(), Some(&json!("a@b.com")));
    }
}
