//! Form submission evaluator
//!
//! One pass per call:
//! 1. conditional state of every field from the raw values,
//! 2. every calculation from the raw values, overlaid into a derived copy,
//! 3. validation of visible, enabled fields against the derived copy,
//! 4. hidden fields' values dropped from the result.
//!
//! Conditions and calculations both read raw input, so the outcome does not
//! depend on field order and chained calculations cannot loop.

use crate::calculation::Calculator;
use crate::conditional::{self, FieldState};
use crate::config::EngineConfig;
use crate::domain::aggregates::FormSchema;
use crate::domain::value_objects::FieldValues;
use crate::lookup::FieldLookup;
use crate::validation::{Validator, ValidatorRegistry};
use crate::value;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Outcome of evaluating one value set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    /// No field has errors
    pub valid: bool,
    /// Messages per field id; fields without errors are absent
    pub errors: BTreeMap<String, Vec<String>>,
    /// Submitted values keyed by field id, with calculations applied and
    /// hidden fields removed
    pub values: FieldValues,
    /// Presentation state per field id
    pub states: BTreeMap<String, FieldState>,
}

impl SubmissionResult {
    /// Derived values re-keyed by field name, for storage
    ///
    /// Fields without a name keep their id; values that belong to no field
    /// are dropped.
    pub fn payload(&self, schema: &FormSchema) -> FieldValues {
        schema
            .iter()
            .filter_map(|field| {
                let value = self.values.get(field.id.as_str())?;
                let key = if field.name.is_empty() {
                    field.id.to_string()
                } else {
                    field.name.clone()
                };
                Some((key, value.clone()))
            })
            .collect()
    }

    pub fn errors_for(&self, field_id: &str) -> &[String] {
        self.errors.get(field_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }
}

/// Runs conditional logic, calculations and validation together
#[derive(Debug, Clone)]
pub struct SubmissionEvaluator {
    validator: Validator,
    calculator: Calculator,
    config: EngineConfig,
}

impl Default for SubmissionEvaluator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl SubmissionEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            validator: Validator::default().with_fallback_message(config.fallback_message.clone()),
            calculator: Calculator::new(&config),
            config,
        }
    }

    /// Use a registry of custom validators
    pub fn with_validators(mut self, registry: ValidatorRegistry) -> Self {
        self.validator = Validator::new(registry).with_fallback_message(self.config.fallback_message.clone());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Conditional state of every field, keyed by field id
    pub fn field_states(&self, schema: &FormSchema, values: &FieldValues) -> BTreeMap<String, FieldState> {
        let lookup = self.lookup(schema, values);
        schema
            .iter()
            .map(|field| (field.id.to_string(), conditional::evaluate(field, &lookup)))
            .collect()
    }

    /// Evaluate a value set against a schema
    pub fn evaluate(&self, schema: &FormSchema, values: &FieldValues) -> SubmissionResult {
        let raw = self.lookup(schema, values);
        let states = self.field_states(schema, values);

        let mut derived = normalize(schema, values);
        for field in schema {
            let Some(config) = &field.calculation_config else {
                continue;
            };
            let Some(target) = schema.resolve(&config.result_field) else {
                debug!(field_id = %field.id, result_field = %config.result_field, "calculation result field missing");
                continue;
            };
            if let Some(result) = self.calculator.compute(config, &raw) {
                derived.insert(target.id.to_string(), value::number_value(result));
            }
        }

        let null = Value::Null;
        let mut errors = BTreeMap::new();
        for field in schema {
            let id = field.id.as_str();
            let state = states.get(id).copied().unwrap_or_else(|| FieldState::initial(field));
            if !state.is_active() {
                continue;
            }
            let value = derived.get(id).unwrap_or(&null);
            let messages: Vec<String> = self
                .validator
                .validate_effective(field, value, state.required, self.config.enforce_field_kinds)
                .into_iter()
                .map(|e| e.message)
                .collect();
            if !messages.is_empty() {
                errors.insert(id.to_string(), messages);
            }
        }

        if self.config.strip_hidden_values {
            for (id, state) in &states {
                if !state.visible {
                    derived.remove(id);
                }
            }
        }

        let valid = errors.is_empty();
        debug!(fields = schema.len(), valid, invalid_fields = errors.len(), "submission evaluated");
        SubmissionResult {
            valid,
            errors,
            values: derived,
            states,
        }
    }

    fn lookup<'a>(&self, schema: &'a FormSchema, values: &'a FieldValues) -> FieldLookup<'a> {
        FieldLookup::new(schema, values).log_dangling(self.config.log_dangling_references)
    }
}

/// Input re-keyed by field id; keys that match no field id or name pass through
fn normalize(schema: &FormSchema, values: &FieldValues) -> FieldValues {
    let lookup = FieldLookup::new(schema, values);
    let mut out: FieldValues = schema
        .iter()
        .filter_map(|field| Some((field.id.to_string(), lookup.value_of(field)?.clone())))
        .collect();
    for (key, value) in values {
        let claimed = schema.iter().any(|f| f.id == key.as_str() || f.name == *key);
        if !claimed {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Evaluate with default engine settings
pub fn evaluate_submission(schema: &FormSchema, values: &FieldValues) -> SubmissionResult {
    SubmissionEvaluator::default().evaluate(schema, values)
}
