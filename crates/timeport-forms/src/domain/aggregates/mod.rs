//! Form aggregates
//!
//! [`FormSchema`] is the ordered field collection handed to renderers and
//! evaluators. [`FormDefinition`] wraps a schema with identity, lifecycle
//! status and version.
//!
//! # Invariants
//! - `order` values of a schema are exactly `1..=N` after every mutation
//! - A published definition is never edited in place

use crate::builder::check_integrity;
use crate::domain::value_objects::FieldConfig;
use crate::error::{FormsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered list of fields
///
/// Serializes as a plain JSON array of field records. Deserializing sorts
/// by `order` and resequences, like [`FormSchema::from_fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FieldConfig>", into = "Vec<FieldConfig>")]
pub struct FormSchema {
    fields: Vec<FieldConfig>,
}

impl FormSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from fields in any order; sorted by `order` then resequenced
    pub fn from_fields(mut fields: Vec<FieldConfig>) -> Self {
        fields.sort_by_key(|f| f.order);
        let mut schema = Self { fields };
        schema.resequence();
        schema
    }

    /// Fields in display order
    pub fn fields(&self) -> &[FieldConfig] {
        &self.fields
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldConfig> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field by id
    pub fn get(&self, id: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Zero-based position of a field
    pub fn position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// Field a rule reference points at: id match first, then name match
    pub fn resolve(&self, reference: &str) -> Option<&FieldConfig> {
        self.get(reference)
            .or_else(|| self.fields.iter().find(|f| f.answers_to(reference)))
    }

    /// Whether `order` is exactly `1..=N`
    pub fn is_densely_ordered(&self) -> bool {
        self.fields
            .iter()
            .enumerate()
            .all(|(i, f)| f.order as usize == i + 1)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut FieldConfig> {
        self.fields
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| FormsError::FieldNotFound(id.to_string()))
    }

    pub(crate) fn push(&mut self, field: FieldConfig) {
        self.fields.push(field);
        self.resequence();
    }

    pub(crate) fn remove(&mut self, id: &str) -> Result<FieldConfig> {
        let index = self
            .position(id)
            .ok_or_else(|| FormsError::FieldNotFound(id.to_string()))?;
        let removed = self.fields.remove(index);
        self.resequence();
        Ok(removed)
    }

    /// Drag-and-drop move; fields between the two indices shift by one
    pub(crate) fn move_index(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.fields.len();
        if from >= len {
            return Err(FormsError::IndexOutOfRange { index: from, len });
        }
        if to >= len {
            return Err(FormsError::IndexOutOfRange { index: to, len });
        }
        let field = self.fields.remove(from);
        self.fields.insert(to, field);
        self.resequence();
        Ok(())
    }

    pub(crate) fn replace(&mut self, field: FieldConfig) -> Result<()> {
        let slot = self.get_mut(field.id.as_str())?;
        let order = slot.order;
        *slot = field;
        slot.order = order;
        Ok(())
    }

    pub(crate) fn resequence(&mut self) {
        for (i, field) in self.fields.iter_mut().enumerate() {
            field.order = i as u32 + 1;
        }
    }
}

impl From<Vec<FieldConfig>> for FormSchema {
    fn from(fields: Vec<FieldConfig>) -> Self {
        Self::from_fields(fields)
    }
}

impl From<FormSchema> for Vec<FieldConfig> {
    fn from(schema: FormSchema) -> Self {
        schema.fields
    }
}

impl<'a> IntoIterator for &'a FormSchema {
    type Item = &'a FieldConfig;
    type IntoIter = std::slice::Iter<'a, FieldConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// What a form is used for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormPurpose {
    /// Periodic report filled in by members
    #[default]
    ReportTemplate,
    /// Request routed through approval
    RequestForm,
}

/// Definition lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// Form definition aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    id: String,
    title: String,
    purpose: FormPurpose,
    status: FormStatus,
    version: u32,
    schema: FormSchema,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FormDefinition {
    /// New empty draft
    pub fn create(title: impl Into<String>, purpose: FormPurpose) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            purpose,
            status: FormStatus::Draft,
            version: 1,
            schema: FormSchema::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn purpose(&self) -> FormPurpose {
        self.purpose
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_editable(&self) -> bool {
        self.status == FormStatus::Draft
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<()> {
        self.ensure_editable()?;
        self.title = title.into();
        self.touch();
        Ok(())
    }

    /// Run the integrity check and freeze the schema
    pub fn publish(&mut self) -> Result<()> {
        self.ensure_editable()?;
        if self.schema.is_empty() {
            return Err(FormsError::NoFields(self.id.clone()));
        }
        let report = check_integrity(&self.schema);
        if !report.is_clean() {
            return Err(FormsError::SchemaIntegrity(report.errors));
        }
        self.status = FormStatus::Published;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) -> Result<()> {
        if self.status == FormStatus::Archived {
            return Err(FormsError::InvalidTransition(format!(
                "form {} is already archived",
                self.id
            )));
        }
        self.status = FormStatus::Archived;
        self.touch();
        Ok(())
    }

    /// Editable draft copy with the next version number
    pub fn new_revision(&self) -> Self {
        let now = Utc::now();
        Self {
            status: FormStatus::Draft,
            version: self.version + 1,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    pub(crate) fn ensure_editable(&self) -> Result<()> {
        match self.status {
            FormStatus::Draft => Ok(()),
            FormStatus::Published => Err(FormsError::AlreadyPublished(self.id.clone())),
            FormStatus::Archived => Err(FormsError::InvalidTransition(format!(
                "form {} is archived",
                self.id
            ))),
        }
    }

    /// Swap in an edited schema
    pub(crate) fn with_schema(&self, schema: FormSchema) -> Self {
        Self {
            schema,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{FieldKind, NumberOptions};

    fn field(id: &str) -> FieldConfig {
        FieldConfig::with_id(id, FieldKind::Number(NumberOptions::default())).named(id, id)
    }

    #[test]
    fn test_from_fields_sorts_and_resequences() {
        let mut a = field("a");
        a.order = 7;
        let mut b = field("b");
        b.order = 3;
        let schema = FormSchema::from_fields(vec![a, b]);

        assert_eq!(schema.fields()[0].id, "b");
        assert!(schema.is_densely_ordered());
    }

    #[test]
    fn test_deserialize_sorts_by_order() {
        let schema: FormSchema = serde_json::from_value(serde_json::json!([
            {"id": "a", "name": "a", "label": "A", "type": "text", "order": 5},
            {"id": "b", "name": "b", "label": "B", "type": "text", "order": 2},
            {"id": "c", "name": "c", "label": "C", "type": "text", "order": 9}
        ]))
        .unwrap();

        let ids: Vec<_> = schema.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(schema.is_densely_ordered());

        let written = serde_json::to_value(&schema).unwrap();
        assert_eq!(written[0]["id"], "b");
        assert_eq!(written[2]["order"], 3);
    }

    #[test]
    fn test_move_index_shifts_between() {
        let mut schema = FormSchema::from_fields(vec![field("a"), field("b"), field("c"), field("d")]);
        schema.move_index(0, 2).unwrap();
        let ids: Vec<_> = schema.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a", "d"]);
        assert!(schema.is_densely_ordered());

        assert!(schema.move_index(0, 4).is_err());
    }

    #[test]
    fn test_resolve_by_name() {
        let f = FieldConfig::with_id("f-1", FieldKind::Date).named("start_date", "Start");
        let schema = FormSchema::from_fields(vec![f]);
        assert_eq!(schema.resolve("start_date").unwrap().id, "f-1");
        assert_eq!(schema.resolve("f-1").unwrap().id, "f-1");
        assert!(schema.resolve("end_date").is_none());
    }

    #[test]
    fn test_publish_requires_fields_and_integrity() {
        let mut def = FormDefinition::create("Leave request", FormPurpose::RequestForm);
        assert_eq!(def.publish(), Err(FormsError::NoFields(def.id().to_string())));

        let blank = FieldConfig::with_id("x", FieldKind::Date);
        def = def.with_schema(FormSchema::from_fields(vec![blank]));
        assert!(matches!(def.publish(), Err(FormsError::SchemaIntegrity(_))));

        def = def.with_schema(FormSchema::from_fields(vec![field("hours")]));
        def.publish().unwrap();
        assert_eq!(def.status(), FormStatus::Published);
        assert!(matches!(def.set_title("x"), Err(FormsError::AlreadyPublished(_))));
    }

    #[test]
    fn test_new_revision_is_editable_draft() {
        let mut def = FormDefinition::create("Daily report", FormPurpose::ReportTemplate)
            .with_schema(FormSchema::from_fields(vec![field("hours")]));
        def.publish().unwrap();

        let next = def.new_revision();
        assert_eq!(next.version(), 2);
        assert!(next.is_editable());
        assert_eq!(next.id(), def.id());
        assert_eq!(next.schema(), def.schema());
    }

    #[test]
    fn test_archive_twice_fails() {
        let mut def = FormDefinition::create("Daily report", FormPurpose::ReportTemplate);
        def.archive().unwrap();
        assert!(def.archive().is_err());
        assert!(def.ensure_editable().is_err());
    }
}
