//! Conditional logic engine
//!
//! A field's state starts at `{visible: true, required: field.required,
//! disabled: false}`. Every rule whose condition currently holds switches its
//! action on; actions accumulate across rules (logical OR).
//!
//! Show/hide composition is hide-wins: one holding `hide` rule hides the
//! field whatever `show` rules say and wherever they sit in the list. A
//! holding `show` only confirms the default visibility.

use crate::domain::value_objects::{ConditionAction, ConditionOperator, ConditionalRule, FieldConfig};
use crate::lookup::{FieldLookup, Resolved};
use crate::value;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runtime presentation state of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldState {
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
}

impl FieldState {
    /// State before any rule applies
    pub fn initial(field: &FieldConfig) -> Self {
        Self {
            visible: true,
            required: field.required,
            disabled: false,
        }
    }

    /// Visible and enabled, so its value is validated
    pub fn is_active(&self) -> bool {
        self.visible && !self.disabled
    }
}

/// Compute the state of `field` against the current values
pub fn evaluate(field: &FieldConfig, lookup: &FieldLookup<'_>) -> FieldState {
    let mut state = FieldState::initial(field);
    let mut hidden = false;

    for rule in &field.conditional_logic {
        if !rule_holds(rule, lookup) {
            continue;
        }
        match rule.action {
            ConditionAction::Show => {}
            ConditionAction::Hide => hidden = true,
            ConditionAction::Require => state.required = true,
            ConditionAction::Disable => state.disabled = true,
        }
    }

    state.visible = !hidden;
    state
}

/// Whether a rule's condition holds; dangling references never hold
pub fn rule_holds(rule: &ConditionalRule, lookup: &FieldLookup<'_>) -> bool {
    match lookup.resolve(&rule.field) {
        Resolved::Dangling => false,
        resolved => compare(rule.operator, resolved.value(), &rule.value),
    }
}

/// Apply an operator to an observed value (`None` when the field is empty)
pub fn compare(operator: ConditionOperator, observed: Option<&Value>, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => equals(observed, expected),
        ConditionOperator::NotEquals => !equals(observed, expected),
        ConditionOperator::Contains => contains(observed, expected),
        ConditionOperator::NotContains => !contains(observed, expected),
        ConditionOperator::GreaterThan => numeric(observed, expected).map_or(false, |(a, b)| a > b),
        ConditionOperator::LessThan => numeric(observed, expected).map_or(false, |(a, b)| a < b),
    }
}

fn equals(observed: Option<&Value>, expected: &Value) -> bool {
    let observed = observed.map(value::to_text).unwrap_or_default();
    observed == value::to_text(expected)
}

fn contains(observed: Option<&Value>, expected: &Value) -> bool {
    let needle = value::to_text(expected);
    match observed {
        None => false,
        Some(Value::Array(items)) => items.iter().any(|item| value::to_text(item) == needle),
        Some(other) => value::to_text(other).contains(&needle),
    }
}

fn numeric(observed: Option<&Value>, expected: &Value) -> Option<(f64, f64)> {
    Some((value::to_number(observed?)?, value::to_number(expected)?))
}
