//! Validation engine
//!
//! Every configured rule is evaluated independently; nothing short-circuits,
//! and each failing rule contributes its own message. Kind checks derived
//! from the field's [`FieldKind`] are reported separately by
//! [`Validator::validate_kind`].

use crate::domain::value_objects::{FieldConfig, FieldKind, RuleKind, ValidationRule};
use crate::value;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Default message for a failing rule without one
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Invalid value";

const REQUIRED_MESSAGE: &str = "This field is required";

/// Compiled `pattern` rules kept per validator before the cache is reset
const PATTERN_CACHE_CAPACITY: usize = 256;

/// One failed check on a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Rule that failed; `None` for kind checks and the implicit required check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleKind>,
    pub message: String,
}

impl ValidationError {
    fn rule(kind: RuleKind, message: impl Into<String>) -> Self {
        Self {
            rule: Some(kind),
            message: message.into(),
        }
    }

    fn intrinsic(message: impl Into<String>) -> Self {
        Self {
            rule: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Predicate behind a `custom` rule
///
/// `params` is the rule's `value` (the name string itself, or the whole
/// object when the rule carries `{ "name": ..., ... }`).
pub trait CustomValidator: Send + Sync {
    fn check(&self, value: &Value, params: &Value) -> bool;
}

impl<F> CustomValidator for F
where
    F: Fn(&Value, &Value) -> bool + Send + Sync,
{
    fn check(&self, value: &Value, params: &Value) -> bool {
        self(value, params)
    }
}

/// Named custom predicates available to `custom` rules
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn CustomValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, validator: impl CustomValidator + 'static) {
        self.validators.insert(name.into(), Arc::new(validator));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CustomValidator>> {
        self.validators.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ValidatorRegistry").field("validators", &names).finish()
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

fn tel_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9(][0-9\s\-().]{5,19}$").expect("valid tel regex"))
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r"^https?://[^\s/$.?#][^\s]*$")
            .case_insensitive(true)
            .build()
            .expect("valid url regex")
    })
}

/// Compiled `pattern` rule sources, shared between clones of a validator
#[derive(Debug, Clone, Default)]
struct PatternCache(Arc<RwLock<HashMap<String, Result<Regex, regex::Error>>>>);

impl PatternCache {
    fn compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(compiled) = self.0.read().get(pattern) {
            return compiled.clone();
        }
        let compiled = Regex::new(pattern);
        let mut cache = self.0.write();
        if cache.len() >= PATTERN_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.read().len()
    }
}

/// Rule and kind checker
#[derive(Debug, Clone)]
pub struct Validator {
    registry: ValidatorRegistry,
    fallback_message: String,
    patterns: PatternCache,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorRegistry::default())
    }
}

impl Validator {
    pub fn new(registry: ValidatorRegistry) -> Self {
        Self {
            registry,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            patterns: PatternCache::default(),
        }
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    /// Evaluate every configured rule of `field` against `value`
    pub fn validate(&self, field: &FieldConfig, value: &Value) -> Vec<ValidationError> {
        field
            .validation_rules
            .iter()
            .filter(|rule| !self.passes(field, rule, value))
            .map(|rule| ValidationError::rule(rule.kind, self.message_for(rule)))
            .collect()
    }

    /// Checks implied by the field kind; never fire on empty values
    pub fn validate_kind(&self, field: &FieldConfig, value: &Value) -> Vec<ValidationError> {
        if value::is_empty(value) {
            return Vec::new();
        }
        let mut errors = Vec::new();
        match &field.kind {
            FieldKind::Number(opts) => match value::to_number(value) {
                None => errors.push(ValidationError::intrinsic("Must be a number")),
                Some(n) => {
                    if let Some(min) = opts.min.filter(|min| n < *min) {
                        errors.push(ValidationError::intrinsic(format!(
                            "Must be at least {}",
                            value::to_text(&value::number_value(min))
                        )));
                    }
                    if let Some(max) = opts.max.filter(|max| n > *max) {
                        errors.push(ValidationError::intrinsic(format!(
                            "Must be at most {}",
                            value::to_text(&value::number_value(max))
                        )));
                    }
                }
            },
            FieldKind::Select(opts) | FieldKind::Radio(opts) => {
                if !opts.choices.is_empty() && !opts.contains(&value::to_text(value)) {
                    errors.push(ValidationError::intrinsic("Not a valid choice"));
                }
            }
            FieldKind::Checkbox(opts) if !opts.choices.is_empty() => {
                let unknown = match value {
                    Value::Array(items) => items
                        .iter()
                        .any(|item| !opts.contains(&value::to_text(item))),
                    Value::Bool(_) => false,
                    other => !opts.contains(&value::to_text(other)),
                };
                if unknown {
                    errors.push(ValidationError::intrinsic("Not a valid choice"));
                }
            }
            FieldKind::File(opts) if !opts.multiple => {
                if matches!(value, Value::Array(items) if items.len() > 1) {
                    errors.push(ValidationError::intrinsic("Only one file may be attached"));
                }
            }
            FieldKind::Date if value::to_date(value).is_none() => {
                errors.push(ValidationError::intrinsic("Invalid date"));
            }
            FieldKind::Time if value::to_time(value).is_none() => {
                errors.push(ValidationError::intrinsic("Invalid time"));
            }
            FieldKind::DateTime if value::to_datetime(value).is_none() => {
                errors.push(ValidationError::intrinsic("Invalid date and time"));
            }
            _ => {}
        }
        errors
    }

    /// Rule errors, plus a required error when `required` is forced but no
    /// `required` rule exists to report it
    pub(crate) fn validate_effective(
        &self,
        field: &FieldConfig,
        value: &Value,
        required: bool,
        check_kind: bool,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let has_required_rule = field
            .validation_rules
            .iter()
            .any(|r| r.kind == RuleKind::Required);
        if required && !has_required_rule && value::is_empty(value) {
            errors.push(ValidationError::intrinsic(REQUIRED_MESSAGE));
        }
        errors.extend(self.validate(field, value));
        if check_kind {
            errors.extend(self.validate_kind(field, value));
        }
        errors
    }

    fn message_for(&self, rule: &ValidationRule) -> String {
        if !rule.message.trim().is_empty() {
            return rule.message.clone();
        }
        match rule.kind {
            RuleKind::Required => REQUIRED_MESSAGE.to_string(),
            _ => self.fallback_message.clone(),
        }
    }

    fn passes(&self, field: &FieldConfig, rule: &ValidationRule, input: &Value) -> bool {
        match rule.kind {
            RuleKind::Required => !value::is_empty(input),
            RuleKind::MinLength => match rule_number(field, rule) {
                Some(min) => value::text_length(input) as f64 >= min,
                None => true,
            },
            RuleKind::MaxLength => match rule_number(field, rule) {
                Some(max) => value::text_length(input) as f64 <= max,
                None => true,
            },
            RuleKind::Min => match (value::to_number(input), rule_number(field, rule)) {
                (Some(n), Some(min)) => n >= min,
                _ => true,
            },
            RuleKind::Max => match (value::to_number(input), rule_number(field, rule)) {
                (Some(n), Some(max)) => n <= max,
                _ => true,
            },
            RuleKind::Pattern => {
                let pattern = value::to_text(&rule.value);
                match self.patterns.compile(&pattern) {
                    Ok(re) => re.is_match(&value::to_text(input)),
                    Err(e) => {
                        warn!(field_id = %field.id, pattern = %pattern, error = %e, "invalid pattern rule ignored");
                        true
                    }
                }
            }
            RuleKind::Email => email_regex().is_match(value::to_text(input).trim()),
            RuleKind::Tel => tel_regex().is_match(value::to_text(input).trim()),
            RuleKind::Url => url_regex().is_match(value::to_text(input).trim()),
            RuleKind::Custom => self.run_custom(field, rule, input),
        }
    }

    fn run_custom(&self, field: &FieldConfig, rule: &ValidationRule, input: &Value) -> bool {
        let name = match &rule.value {
            Value::String(name) => Some(name.as_str()),
            Value::Object(map) => map.get("name").and_then(Value::as_str),
            _ => None,
        };
        match name.and_then(|n| self.registry.get(n)) {
            Some(validator) => validator.check(input, &rule.value),
            None => {
                warn!(field_id = %field.id, validator = ?name, "unknown custom validator ignored");
                true
            }
        }
    }
}

fn rule_number(field: &FieldConfig, rule: &ValidationRule) -> Option<f64> {
    let parameter = value::to_number(&rule.value);
    if parameter.is_none() {
        warn!(field_id = %field.id, rule = ?rule.kind, "rule parameter is not a number; rule ignored");
    }
    parameter
}

/// Validate with a default [`Validator`]
pub fn validate(field: &FieldConfig, value: &Value) -> Vec<ValidationError> {
    Validator::default().validate(field, value)
}
