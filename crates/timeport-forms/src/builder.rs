//! Form builder
//!
//! CRUD over the ordered field list of a draft definition. Every mutation
//! clones the current definition, edits the clone and swaps it in, so
//! snapshots handed out earlier never change underneath their holders.
//! Field `order` is re-derived as a dense `1..=N` sequence after each edit.

use crate::domain::aggregates::{FormDefinition, FormPurpose, FormSchema};
use crate::domain::events::{DomainEvent, FormEvent};
use crate::domain::value_objects::{
    CalculationConfig, CalculationKind, ConditionalRule, FieldConfig, FieldId, FieldKind, FieldType,
    FieldWidth, ValidationRule,
};
use crate::error::{FormsError, IntegrityIssue, Result};
use crate::formula::Formula;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Integrity checks
// =============================================================================

/// Outcome of a schema integrity check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// Violations that block publishing
    pub errors: Vec<IntegrityIssue>,
    /// Hygiene findings that never block
    pub warnings: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors and warnings raised on one field
    pub fn for_field<'a>(&'a self, field_id: &'a str) -> impl Iterator<Item = &'a IntegrityIssue> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(move |issue| issue.field_id() == field_id)
    }
}

/// Check every schema invariant
///
/// Blocking: empty name or label, duplicate name, calculation operands that
/// are missing or point at their own field, non-numeric result fields,
/// result fields that feed a calculation, result fields written twice,
/// missing or unparsable custom formulas and conditional rules that inspect
/// their own field. Dangling conditional rules are only warnings since
/// evaluation treats them as inert.
pub fn check_integrity(schema: &FormSchema) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    let mut names = HashSet::new();

    for field in schema {
        let field_id = field.id.to_string();
        if field.name.trim().is_empty() {
            report.errors.push(IntegrityIssue::EmptyName { field_id: field_id.clone() });
        } else if !names.insert(field.name.as_str()) {
            report.errors.push(IntegrityIssue::DuplicateName {
                field_id: field_id.clone(),
                name: field.name.clone(),
            });
        }
        if field.label.trim().is_empty() {
            report.errors.push(IntegrityIssue::EmptyLabel { field_id: field_id.clone() });
        }

        if let Some(config) = &field.calculation_config {
            report.errors.extend(calculation_issues(schema, field, config));
        }

        for rule in &field.conditional_logic {
            match schema.resolve(&rule.field) {
                None => report.warnings.push(IntegrityIssue::DanglingConditionalReference {
                    field_id: field_id.clone(),
                    reference: rule.field.clone(),
                }),
                Some(target) if target.id == field.id => {
                    report.errors.push(IntegrityIssue::ConditionalSelfReference {
                        field_id: field_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }

    report.errors.extend(cross_calculation_issues(schema));
    report
}

/// Issues of one calculation taken on its own
fn calculation_issues(
    schema: &FormSchema,
    owner: &FieldConfig,
    config: &CalculationConfig,
) -> Vec<IntegrityIssue> {
    let field_id = owner.id.to_string();
    let mut issues = Vec::new();

    if config.kind == CalculationKind::Custom {
        match config.formula.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            None => issues.push(IntegrityIssue::MissingFormula { field_id: field_id.clone() }),
            Some(source) => {
                if let Err(err) = Formula::parse(source) {
                    issues.push(IntegrityIssue::InvalidFormula {
                        field_id: field_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    let operands = operand_references(config);
    let mut self_reference = false;
    for reference in &operands {
        match schema.resolve(reference) {
            None => issues.push(IntegrityIssue::DanglingCalculationReference {
                field_id: field_id.clone(),
                reference: reference.clone(),
            }),
            Some(target) if target.id == owner.id => self_reference = true,
            Some(_) => {}
        }
    }
    if self_reference {
        issues.push(IntegrityIssue::CalculationSelfReference { field_id: field_id.clone() });
    }

    match schema.resolve(&config.result_field) {
        None => issues.push(IntegrityIssue::DanglingCalculationReference {
            field_id,
            reference: config.result_field.clone(),
        }),
        Some(result) => {
            if !result.kind.is_numeric() {
                issues.push(IntegrityIssue::NonNumericResultField {
                    field_id: field_id.clone(),
                    result_field: config.result_field.clone(),
                });
            }
            let feeds_itself = operands
                .iter()
                .filter_map(|reference| schema.resolve(reference))
                .any(|target| target.id == result.id && target.id != owner.id);
            if feeds_itself {
                issues.push(IntegrityIssue::ChainedCalculation {
                    field_id,
                    result_field: config.result_field.clone(),
                });
            }
        }
    }

    issues
}

/// Result fields written twice or consumed by another calculation
fn cross_calculation_issues(schema: &FormSchema) -> Vec<IntegrityIssue> {
    let calculations: Vec<(&FieldConfig, &CalculationConfig, &FieldId)> = schema
        .iter()
        .filter_map(|field| {
            let config = field.calculation_config.as_ref()?;
            let result = schema.resolve(&config.result_field)?;
            Some((field, config, &result.id))
        })
        .collect();

    let mut issues = Vec::new();
    let mut writers: HashMap<&FieldId, &FieldId> = HashMap::new();
    for (owner, config, result_id) in &calculations {
        if writers.insert(*result_id, &owner.id).is_some() {
            issues.push(IntegrityIssue::ConflictingResultField {
                field_id: owner.id.to_string(),
                result_field: config.result_field.clone(),
            });
        }
        let consumed = calculations
            .iter()
            .filter(|(other, _, _)| other.id != owner.id)
            .flat_map(|(_, other_config, _)| operand_references(other_config))
            .filter_map(|reference| schema.resolve(&reference))
            .any(|target| &target.id == *result_id);
        if consumed {
            issues.push(IntegrityIssue::ChainedCalculation {
                field_id: owner.id.to_string(),
                result_field: config.result_field.clone(),
            });
        }
    }
    issues
}

/// Target fields plus identifiers of a parsable custom formula
fn operand_references(config: &CalculationConfig) -> Vec<String> {
    let mut operands = config.target_fields.clone();
    if config.kind == CalculationKind::Custom {
        if let Some(formula) = config.formula.as_deref().and_then(|f| Formula::parse(f).ok()) {
            operands.extend(formula.references().into_iter().map(String::from));
        }
    }
    operands
}

fn is_calculation_issue(issue: &IntegrityIssue) -> bool {
    matches!(
        issue,
        IntegrityIssue::CalculationSelfReference { .. }
            | IntegrityIssue::DanglingCalculationReference { .. }
            | IntegrityIssue::NonNumericResultField { .. }
            | IntegrityIssue::ChainedCalculation { .. }
            | IntegrityIssue::ConflictingResultField { .. }
            | IntegrityIssue::MissingFormula { .. }
            | IntegrityIssue::InvalidFormula { .. }
    )
}

// =============================================================================
// Field patches
// =============================================================================

/// Partial field update, merged shallowly into an existing field
///
/// Unset members leave the field untouched. `id` and `order` cannot be
/// patched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldPatch {
    pub name: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub options: Option<Value>,
    pub required: Option<bool>,
    pub width: Option<FieldWidth>,
    pub validation_rules: Option<Vec<ValidationRule>>,
    pub conditional_logic: Option<Vec<ConditionalRule>>,
    pub calculation_config: Option<CalculationConfig>,
}

impl FieldPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    fn apply(self, field: &mut FieldConfig) -> Result<()> {
        let current_type = field.field_type();
        let kind = match (self.field_type, self.options) {
            (None, None) => None,
            (Some(t), None) if t == current_type => None,
            (Some(t), None) => Some(FieldKind::with_defaults(t)),
            (t, Some(options)) => {
                let t = t.unwrap_or(current_type);
                let kind = FieldKind::from_parts(t, options).map_err(|e| FormsError::InvalidOptions {
                    field_type: t.to_string(),
                    message: e.to_string(),
                })?;
                Some(kind)
            }
        };

        if let Some(kind) = kind {
            field.kind = kind;
        }
        if let Some(name) = self.name {
            field.name = name;
        }
        if let Some(label) = self.label {
            field.label = label;
        }
        if let Some(required) = self.required {
            field.required = required;
        }
        if let Some(width) = self.width {
            field.width = width;
        }
        if let Some(rules) = self.validation_rules {
            field.validation_rules = rules;
        }
        if let Some(rules) = self.conditional_logic {
            field.conditional_logic = rules;
        }
        if let Some(config) = self.calculation_config {
            field.calculation_config = Some(config);
        }
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// What a mutation must not break
#[derive(Clone, Copy)]
enum Gate<'a> {
    /// Draft edits, no checks
    Open,
    /// Reject newly introduced calculation issues
    Calculations,
    /// Whole-field save: the field must be complete and introduce nothing
    Commit(&'a FieldId),
}

/// Single-writer editor over one form definition
#[derive(Debug, Clone)]
pub struct FormBuilder {
    current: Arc<FormDefinition>,
    events: Vec<DomainEvent>,
}

impl FormBuilder {
    pub fn new(definition: FormDefinition) -> Self {
        Self {
            current: Arc::new(definition),
            events: Vec::new(),
        }
    }

    /// Builder over a fresh draft
    pub fn create(title: impl Into<String>, purpose: FormPurpose) -> Self {
        Self::new(FormDefinition::create(title, purpose))
    }

    /// Builder over a fresh draft seeded with an existing schema
    pub fn from_schema(title: impl Into<String>, purpose: FormPurpose, schema: FormSchema) -> Self {
        Self::new(FormDefinition::create(title, purpose).with_schema(schema))
    }

    /// Immutable view of the current definition
    pub fn snapshot(&self) -> Arc<FormDefinition> {
        Arc::clone(&self.current)
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.current
    }

    pub fn schema(&self) -> &FormSchema {
        self.current.schema()
    }

    pub fn field(&self, id: &str) -> Option<&FieldConfig> {
        self.schema().get(id)
    }

    pub fn into_definition(self) -> FormDefinition {
        Arc::try_unwrap(self.current).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Drain recorded events
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Append a blank field of the given kind
    pub fn add_field(&mut self, kind: FieldKind) -> Result<FieldConfig> {
        let field = FieldConfig::new(kind);
        let id = field.id.clone();
        let added = self.edit(Gate::Open, |schema| {
            schema.push(field);
            Ok(schema.get(id.as_str()).cloned())
        })?;
        let added = added.ok_or_else(|| FormsError::FieldNotFound(id.to_string()))?;
        debug!(form_id = %self.current.id(), field_id = %added.id, field_type = %added.field_type(), "field added");
        self.record(FormEvent::FieldAdded { field_id: added.id.to_string() });
        Ok(added)
    }

    /// Delete a field; rules elsewhere that point at it become dangling
    pub fn remove_field(&mut self, id: &str) -> Result<FieldConfig> {
        let removed = self.edit(Gate::Open, |schema| schema.remove(id))?;
        debug!(form_id = %self.current.id(), field_id = %id, "field removed");
        self.record(FormEvent::FieldRemoved { field_id: id.to_string() });
        Ok(removed)
    }

    /// Append a deep copy of a field under a new id and a `_copy` name
    ///
    /// A calculation that wrote into its own source field writes into the
    /// copy instead.
    pub fn duplicate_field(&mut self, id: &str) -> Result<FieldConfig> {
        let source = self
            .field(id)
            .cloned()
            .ok_or_else(|| FormsError::FieldNotFound(id.to_string()))?;

        let mut copy = source.clone();
        copy.id = FieldId::generate();
        copy.name = format!("{}_copy", source.name);
        if let Some(config) = copy.calculation_config.as_mut() {
            if source.answers_to(&config.result_field) {
                config.result_field = copy.id.to_string();
            }
        }

        let copy_id = copy.id.clone();
        let copy = self.edit(Gate::Open, |schema| {
            schema.push(copy);
            Ok(schema.get(copy_id.as_str()).cloned())
        })?;
        let copy = copy.ok_or_else(|| FormsError::FieldNotFound(copy_id.to_string()))?;
        debug!(form_id = %self.current.id(), source_id = %id, field_id = %copy.id, "field duplicated");
        self.record(FormEvent::FieldDuplicated {
            source_id: id.to_string(),
            field_id: copy.id.to_string(),
        });
        Ok(copy)
    }

    /// Move a field to a zero-based index
    pub fn reorder(&mut self, id: &str, new_index: usize) -> Result<()> {
        let from = self
            .schema()
            .position(id)
            .ok_or_else(|| FormsError::FieldNotFound(id.to_string()))?;
        self.move_field(from, new_index)
    }

    /// Drag-and-drop move between zero-based indices
    pub fn move_field(&mut self, from: usize, to: usize) -> Result<()> {
        let field_id = self.edit(Gate::Open, |schema| {
            schema.move_index(from, to)?;
            Ok(schema.fields()[to].id.to_string())
        })?;
        debug!(form_id = %self.current.id(), field_id = %field_id, from, to, "field moved");
        self.record(FormEvent::FieldMoved { field_id, from, to });
        Ok(())
    }

    /// Shallow-merge a patch into a field
    pub fn update_field(&mut self, id: &str, patch: FieldPatch) -> Result<FieldConfig> {
        let sets_calculation = patch.calculation_config.is_some();
        let updated = self.edit(Gate::Calculations, |schema| {
            let field = schema.get_mut(id)?;
            patch.apply(field)?;
            Ok(field.clone())
        })?;
        self.record(FormEvent::FieldUpdated { field_id: id.to_string() });
        if sets_calculation {
            self.record(FormEvent::CalculationSet { field_id: id.to_string() });
        }
        Ok(updated)
    }

    /// Commit a whole-field edit session
    ///
    /// Rejected unless name and label are filled in, the name is unique and
    /// the field's calculation is sound.
    pub fn save_field(&mut self, field: FieldConfig) -> Result<()> {
        let id = field.id.clone();
        self.edit(Gate::Commit(&id), |schema| schema.replace(field))?;
        debug!(form_id = %self.current.id(), field_id = %id, "field saved");
        self.record(FormEvent::FieldUpdated { field_id: id.to_string() });
        Ok(())
    }

    pub fn add_validation_rule(&mut self, id: &str, rule: ValidationRule) -> Result<()> {
        self.edit(Gate::Open, |schema| {
            schema.get_mut(id)?.validation_rules.push(rule);
            Ok(())
        })?;
        self.record(FormEvent::FieldUpdated { field_id: id.to_string() });
        Ok(())
    }

    pub fn remove_validation_rule(&mut self, id: &str, index: usize) -> Result<ValidationRule> {
        let removed = self.edit(Gate::Open, |schema| {
            let rules = &mut schema.get_mut(id)?.validation_rules;
            if index >= rules.len() {
                return Err(FormsError::RuleNotFound { field_id: id.to_string(), index });
            }
            Ok(rules.remove(index))
        })?;
        self.record(FormEvent::FieldUpdated { field_id: id.to_string() });
        Ok(removed)
    }

    pub fn add_conditional_logic(&mut self, id: &str, rule: ConditionalRule) -> Result<()> {
        self.edit(Gate::Open, |schema| {
            schema.get_mut(id)?.conditional_logic.push(rule);
            Ok(())
        })?;
        self.record(FormEvent::FieldUpdated { field_id: id.to_string() });
        Ok(())
    }

    pub fn remove_conditional_logic(&mut self, id: &str, index: usize) -> Result<ConditionalRule> {
        let removed = self.edit(Gate::Open, |schema| {
            let rules = &mut schema.get_mut(id)?.conditional_logic;
            if index >= rules.len() {
                return Err(FormsError::RuleNotFound { field_id: id.to_string(), index });
            }
            Ok(rules.remove(index))
        })?;
        self.record(FormEvent::FieldUpdated { field_id: id.to_string() });
        Ok(removed)
    }

    /// Attach or replace a field's calculation
    pub fn set_calculation(&mut self, id: &str, config: CalculationConfig) -> Result<()> {
        self.edit(Gate::Calculations, |schema| {
            schema.get_mut(id)?.calculation_config = Some(config);
            Ok(())
        })?;
        debug!(form_id = %self.current.id(), field_id = %id, "calculation set");
        self.record(FormEvent::CalculationSet { field_id: id.to_string() });
        Ok(())
    }

    pub fn clear_calculation(&mut self, id: &str) -> Result<Option<CalculationConfig>> {
        let cleared = self.edit(Gate::Open, |schema| Ok(schema.get_mut(id)?.calculation_config.take()))?;
        if cleared.is_some() {
            self.record(FormEvent::CalculationCleared { field_id: id.to_string() });
        }
        Ok(cleared)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<()> {
        let mut next = (*self.current).clone();
        next.set_title(title)?;
        self.current = Arc::new(next);
        Ok(())
    }

    /// Validate the whole schema and freeze it
    pub fn publish(&mut self) -> Result<()> {
        let mut next = (*self.current).clone();
        next.publish()?;
        self.current = Arc::new(next);
        info!(form_id = %self.current.id(), version = self.current.version(), "form published");
        self.record(FormEvent::Published);
        Ok(())
    }

    pub fn archive(&mut self) -> Result<()> {
        let mut next = (*self.current).clone();
        next.archive()?;
        self.current = Arc::new(next);
        info!(form_id = %self.current.id(), version = self.current.version(), "form archived");
        self.record(FormEvent::Archived);
        Ok(())
    }

    /// Continue editing on a new draft revision
    pub fn revise(&mut self) {
        self.current = Arc::new(self.current.new_revision());
        debug!(form_id = %self.current.id(), version = self.current.version(), "new revision");
    }

    fn edit<T, F>(&mut self, gate: Gate<'_>, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut FormSchema) -> Result<T>,
    {
        self.current.ensure_editable()?;
        let mut schema = self.current.schema().clone();
        let out = mutate(&mut schema)?;
        schema.resequence();

        let rejected = match gate {
            Gate::Open => Vec::new(),
            Gate::Calculations => introduced(self.schema(), &schema)
                .into_iter()
                .filter(is_calculation_issue)
                .collect(),
            Gate::Commit(id) => {
                let mut issues: Vec<IntegrityIssue> = check_integrity(&schema)
                    .errors
                    .into_iter()
                    .filter(|issue| issue.field_id() == id.as_str())
                    .collect();
                for issue in introduced(self.schema(), &schema) {
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
                issues
            }
        };
        if !rejected.is_empty() {
            debug!(form_id = %self.current.id(), issues = rejected.len(), "edit rejected");
            return Err(FormsError::SchemaIntegrity(rejected));
        }

        self.current = Arc::new(self.current.with_schema(schema));
        Ok(out)
    }

    fn record(&mut self, event: FormEvent) {
        self.events
            .push(DomainEvent::new(self.current.id(), self.current.version(), event));
    }
}

/// Errors present after an edit that were not present before it
fn introduced(before: &FormSchema, after: &FormSchema) -> Vec<IntegrityIssue> {
    let before = check_integrity(before).errors;
    check_integrity(after)
        .errors
        .into_iter()
        .filter(|issue| !before.contains(issue))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::FormStatus;
    use crate::domain::value_objects::{
        ConditionAction, ConditionOperator, NumberOptions, RuleKind, TextOptions,
    };
    use proptest::prelude::*;

    fn text() -> FieldKind {
        FieldKind::Text(TextOptions::default())
    }

    fn number() -> FieldKind {
        FieldKind::Number(NumberOptions::default())
    }

    fn named(builder: &mut FormBuilder, kind: FieldKind, name: &str) -> String {
        let field = builder.add_field(kind).unwrap();
        let id = field.id.to_string();
        builder
            .update_field(&id, FieldPatch::default().name(name).label(name.to_uppercase()))
            .unwrap();
        id
    }

    fn orders(builder: &FormBuilder) -> Vec<u32> {
        builder.schema().iter().map(|f| f.order).collect()
    }

    #[test]
    fn test_add_field_defaults() {
        let mut builder = FormBuilder::create("Daily report", FormPurpose::ReportTemplate);
        builder.add_field(text()).unwrap();
        let field = builder.add_field(number()).unwrap();

        assert_eq!(field.order, 2);
        assert!(field.name.is_empty());
        assert!(field.label.is_empty());
        assert!(!field.required);
        assert_eq!(builder.schema().len(), 2);
    }

    #[test]
    fn test_remove_resequences() {
        let mut builder = FormBuilder::create("Daily report", FormPurpose::ReportTemplate);
        let a = named(&mut builder, text(), "a");
        let b = named(&mut builder, text(), "b");
        let c = named(&mut builder, text(), "c");

        builder.remove_field(&b).unwrap();
        assert_eq!(orders(&builder), vec![1, 2]);
        let ids: Vec<_> = builder.schema().iter().map(|f| f.id.to_string()).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(builder.remove_field(&b), Err(FormsError::FieldNotFound(b)));
    }

    #[test]
    fn test_drag_and_drop_move() {
        let mut builder = FormBuilder::create("Daily report", FormPurpose::ReportTemplate);
        let ids: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| named(&mut builder, text(), n))
            .collect();

        builder.move_field(0, 2).unwrap();
        let names: Vec<_> = builder.schema().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a", "d"]);

        builder.reorder(&ids[3], 0).unwrap();
        let names: Vec<_> = builder.schema().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["d", "b", "c", "a"]);
        assert_eq!(orders(&builder), vec![1, 2, 3, 4]);

        assert_eq!(
            builder.move_field(0, 4),
            Err(FormsError::IndexOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn test_duplicate_is_deep_copy() {
        let mut builder = FormBuilder::create("Leave request", FormPurpose::RequestForm);
        let hours = named(&mut builder, number(), "hours");
        builder
            .add_validation_rule(&hours, ValidationRule::new(RuleKind::Max, 24, "too many"))
            .unwrap();

        let copy = builder.duplicate_field(&hours).unwrap();
        assert_ne!(copy.id.as_str(), hours);
        assert_eq!(copy.name, "hours_copy");
        assert_eq!(copy.order, 2);
        assert_eq!(copy.validation_rules.len(), 1);

        builder.remove_validation_rule(copy.id.as_str(), 0).unwrap();
        assert_eq!(builder.field(&hours).unwrap().validation_rules.len(), 1);
        assert!(builder.field(copy.id.as_str()).unwrap().validation_rules.is_empty());
    }

    #[test]
    fn test_duplicate_retargets_own_result_field() {
        let mut builder = FormBuilder::create("Leave request", FormPurpose::RequestForm);
        let a = named(&mut builder, number(), "a");
        let total = named(&mut builder, number(), "total");
        builder
            .set_calculation(&total, CalculationConfig::new(CalculationKind::Sum, [a.as_str()], total.as_str()))
            .unwrap();

        let copy = builder.duplicate_field(&total).unwrap();
        let config = copy.calculation_config.unwrap();
        assert_eq!(config.result_field, copy.id.to_string());
        assert_eq!(config.target_fields, vec![a]);
        assert_eq!(
            builder.field(&total).unwrap().calculation_config.as_ref().unwrap().result_field,
            total
        );
    }

    #[test]
    fn test_update_field_merges() {
        let mut builder = FormBuilder::create("Daily report", FormPurpose::ReportTemplate);
        let id = named(&mut builder, text(), "note");
        builder
            .add_conditional_logic(
                &id,
                ConditionalRule::new("other", ConditionOperator::Equals, "x", ConditionAction::Hide),
            )
            .unwrap();

        let patch: FieldPatch = serde_json::from_value(serde_json::json!({
            "required": true,
            "type": "select",
            "options": ["a", "b"]
        }))
        .unwrap();
        let updated = builder.update_field(&id, patch).unwrap();

        assert!(updated.required);
        assert_eq!(updated.name, "note");
        assert_eq!(updated.conditional_logic.len(), 1);
        assert_eq!(updated.kind.choices().map(|c| c.len()), Some(2));

        let bad: FieldPatch = serde_json::from_value(serde_json::json!({"options": {"rows": "many"}})).unwrap();
        let bad = FieldPatch { field_type: Some(FieldType::Textarea), ..bad };
        assert!(matches!(builder.update_field(&id, bad), Err(FormsError::InvalidOptions { .. })));
    }

    #[test]
    fn test_save_field_gated() {
        let mut builder = FormBuilder::create("Daily report", FormPurpose::ReportTemplate);
        let first = named(&mut builder, text(), "site");
        let field = builder.add_field(text()).unwrap();

        let unlabeled = field.clone().named("crew", "");
        assert!(matches!(
            builder.save_field(unlabeled),
            Err(FormsError::SchemaIntegrity(issues)) if issues == vec![IntegrityIssue::EmptyLabel { field_id: field.id.to_string() }]
        ));

        let clash = field.clone().named("site", "Site again");
        assert!(matches!(builder.save_field(clash), Err(FormsError::SchemaIntegrity(_))));

        builder.save_field(field.clone().named("crew", "Crew")).unwrap();
        assert_eq!(builder.field(field.id.as_str()).unwrap().label, "Crew");
        assert_eq!(builder.field(field.id.as_str()).unwrap().order, 2);
        assert_eq!(builder.field(&first).unwrap().order, 1);
    }

    #[test]
    fn test_set_calculation_validated() {
        let mut builder = FormBuilder::create("Timesheet", FormPurpose::ReportTemplate);
        let a = named(&mut builder, number(), "a");
        let note = named(&mut builder, text(), "note");
        let total = named(&mut builder, number(), "total");

        let to_text = CalculationConfig::new(CalculationKind::Sum, [a.as_str()], note.as_str());
        assert!(builder.set_calculation(&note, to_text).is_err());

        let own_target = CalculationConfig::new(CalculationKind::Sum, [a.as_str(), total.as_str()], total.as_str());
        assert!(builder.set_calculation(&total, own_target).is_err());

        let dangling = CalculationConfig::new(CalculationKind::Sum, ["ghost"], total.as_str());
        assert!(builder.set_calculation(&total, dangling).is_err());

        let bad_formula = CalculationConfig::custom("a * (", total.as_str());
        assert!(builder.set_calculation(&total, bad_formula).is_err());

        builder
            .set_calculation(&total, CalculationConfig::custom("a * 2", total.as_str()))
            .unwrap();

        let chained = CalculationConfig::new(CalculationKind::Sum, [total.as_str()], a.as_str());
        assert!(matches!(
            builder.set_calculation(&a, chained),
            Err(FormsError::SchemaIntegrity(issues)) if issues.iter().any(|i| matches!(i, IntegrityIssue::ChainedCalculation { .. }))
        ));

        assert!(builder.clear_calculation(&total).unwrap().is_some());
        assert!(builder.clear_calculation(&total).unwrap().is_none());
    }

    #[test]
    fn test_integrity_report() {
        let schema: FormSchema = serde_json::from_value(serde_json::json!([
            {"id": "a", "name": "a", "label": "A", "type": "number"},
            {"id": "b", "name": "a", "label": "", "type": "number",
             "conditional_logic": [{"field": "gone", "operator": "equals", "value": 1, "action": "hide"}]},
            {"id": "c", "name": "c", "label": "C", "type": "number",
             "calculation_config": {"type": "sum", "target_fields": ["a"], "result_field": "c"},
             "conditional_logic": [{"field": "c", "operator": "equals", "value": 0, "action": "hide"}]},
            {"id": "d", "name": "d", "label": "D", "type": "number",
             "calculation_config": {"type": "sum", "target_fields": ["c"], "result_field": "c"}}
        ]))
        .unwrap();

        let report = check_integrity(&schema);
        assert!(!report.is_clean());
        assert!(report.errors.contains(&IntegrityIssue::DuplicateName { field_id: "b".into(), name: "a".into() }));
        assert!(report.errors.contains(&IntegrityIssue::EmptyLabel { field_id: "b".into() }));
        assert!(report.errors.contains(&IntegrityIssue::ConflictingResultField {
            field_id: "d".into(),
            result_field: "c".into()
        }));
        assert!(report.errors.contains(&IntegrityIssue::ChainedCalculation {
            field_id: "d".into(),
            result_field: "c".into()
        }));
        assert!(report.errors.contains(&IntegrityIssue::ConditionalSelfReference { field_id: "c".into() }));
        assert_eq!(
            report.warnings,
            vec![IntegrityIssue::DanglingConditionalReference { field_id: "b".into(), reference: "gone".into() }]
        );
        assert_eq!(report.for_field("b").count(), 3);
    }

    #[test]
    fn test_self_referencing_condition_blocks_publish() {
        let mut builder = FormBuilder::create("Daily report", FormPurpose::ReportTemplate);
        let id = named(&mut builder, text(), "note");
        let rule = ConditionalRule::new(id.as_str(), ConditionOperator::Equals, "", ConditionAction::Hide);
        builder.add_conditional_logic(&id, rule).unwrap();

        assert!(matches!(
            builder.publish(),
            Err(FormsError::SchemaIntegrity(issues)) if issues == vec![IntegrityIssue::ConditionalSelfReference { field_id: id.clone() }]
        ));
        let field = builder.field(&id).cloned().unwrap();
        assert!(matches!(builder.save_field(field), Err(FormsError::SchemaIntegrity(_))));

        builder.remove_conditional_logic(&id, 0).unwrap();
        builder.publish().unwrap();
    }

    #[test]
    fn test_edits_keep_loaded_schema_dense() {
        let schema: FormSchema = serde_json::from_value(serde_json::json!([
            {"id": "a", "name": "a", "label": "A", "type": "text", "order": 2},
            {"id": "b", "name": "b", "label": "B", "type": "text", "order": 1}
        ]))
        .unwrap();
        let mut builder = FormBuilder::from_schema("Daily report", FormPurpose::ReportTemplate, schema);
        assert_eq!(builder.schema().fields()[0].id, "b");

        builder
            .add_validation_rule("a", ValidationRule::new(RuleKind::Required, Value::Null, ""))
            .unwrap();
        let orders: Vec<_> = builder.schema().iter().map(|f| (f.id.as_str(), f.order)).collect();
        assert_eq!(orders, vec![("b", 1), ("a", 2)]);
        assert!(builder.schema().is_densely_ordered());
    }

    #[test]
    fn test_result_field_may_be_owner() {
        let schema: FormSchema = serde_json::from_value(serde_json::json!([
            {"id": "start_date", "name": "start_date", "label": "Start", "type": "date"},
            {"id": "end_date", "name": "end_date", "label": "End", "type": "date"},
            {"id": "days", "name": "days", "label": "Days", "type": "number",
             "calculation_config": {"type": "date_diff", "target_fields": ["start_date", "end_date"], "result_field": "days"}}
        ]))
        .unwrap();
        assert!(check_integrity(&schema).is_clean());
    }

    #[test]
    fn test_lifecycle_and_events() {
        let mut builder = FormBuilder::create("Leave request", FormPurpose::RequestForm);
        let before = builder.snapshot();
        let id = named(&mut builder, text(), "reason");
        assert!(before.schema().is_empty());

        builder.publish().unwrap();
        assert_eq!(builder.definition().status(), FormStatus::Published);
        assert!(matches!(builder.add_field(text()), Err(FormsError::AlreadyPublished(_))));

        builder.revise();
        assert_eq!(builder.definition().version(), 2);
        builder.remove_field(&id).unwrap();
        assert!(matches!(builder.publish(), Err(FormsError::NoFields(_))));

        let types: Vec<_> = builder.take_events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["form.field_added", "form.field_updated", "form.published", "form.field_removed"]
        );
        assert!(builder.take_events().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add,
        Remove(usize),
        Move(usize, usize),
        Duplicate(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Add),
            any::<usize>().prop_map(Op::Remove),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Move(a, b)),
            any::<usize>().prop_map(Op::Duplicate),
        ]
    }

    proptest! {
        #[test]
        fn prop_order_stays_dense(ops in prop::collection::vec(op(), 0..40)) {
            let mut builder = FormBuilder::create("fuzz", FormPurpose::ReportTemplate);
            for op in ops {
                let len = builder.schema().len();
                match op {
                    Op::Add => { builder.add_field(text()).unwrap(); }
                    Op::Remove(i) if len > 0 => {
                        let id = builder.schema().fields()[i % len].id.to_string();
                        builder.remove_field(&id).unwrap();
                    }
                    Op::Move(a, b) if len > 0 => builder.move_field(a % len, b % len).unwrap(),
                    Op::Duplicate(i) if len > 0 => {
                        let id = builder.schema().fields()[i % len].id.to_string();
                        builder.duplicate_field(&id).unwrap();
                    }
                    _ => {}
                }
                prop_assert!(builder.schema().is_densely_ordered());
            }
            let ids: HashSet<_> = builder.schema().iter().map(|f| f.id.clone()).collect();
            prop_assert_eq!(ids.len(), builder.schema().len());
        }
    }
}
