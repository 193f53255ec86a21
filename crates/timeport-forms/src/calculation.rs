//! Calculation engine
//!
//! Derives a numeric value from other fields. Incomplete input is a normal
//! transient state, so a calculation that cannot run reports why instead of
//! failing; the caller leaves the result field untouched.

use crate::config::EngineConfig;
use crate::domain::value_objects::{CalculationConfig, CalculationKind};
use crate::formula::{Formula, FormulaError};
use crate::lookup::{FieldLookup, Resolved};
use crate::value;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Why a calculation produced no result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unresolved {
    #[error("no operands")]
    NoOperands,

    #[error("operand {0} has no value")]
    MissingOperand(String),

    #[error("operand {0} is not usable here")]
    InvalidOperand(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,

    #[error("custom calculation has no formula")]
    MissingFormula,

    #[error("formula: {0}")]
    Formula(#[from] FormulaError),
}

/// Stateless calculator parameterised by engine settings
#[derive(Debug, Clone)]
pub struct Calculator {
    wraps_midnight: bool,
    max_formula_depth: usize,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Calculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            wraps_midnight: config.time_diff_wraps_midnight,
            max_formula_depth: config.max_formula_depth,
        }
    }

    /// Compute a calculation, `None` when it is unresolved
    pub fn compute(&self, config: &CalculationConfig, lookup: &FieldLookup<'_>) -> Option<f64> {
        match self.try_compute(config, lookup) {
            Ok(result) => Some(result),
            Err(reason) => {
                debug!(result_field = %config.result_field, reason = %reason, "calculation unresolved");
                None
            }
        }
    }

    /// Compute a calculation, reporting why it is unresolved
    pub fn try_compute(
        &self,
        config: &CalculationConfig,
        lookup: &FieldLookup<'_>,
    ) -> Result<f64, Unresolved> {
        let result = match config.kind {
            CalculationKind::Sum => Ok(numbers(config, lookup)?.into_iter().sum()),
            CalculationKind::Multiply => Ok(numbers(config, lookup)?.into_iter().product()),
            CalculationKind::Subtract => {
                let operands = numbers(config, lookup)?;
                Ok(operands[1..].iter().fold(operands[0], |acc, n| acc - n))
            }
            CalculationKind::Divide => {
                let operands = numbers(config, lookup)?;
                operands[1..].iter().try_fold(operands[0], |acc, &n| {
                    if n == 0.0 {
                        Err(Unresolved::DivisionByZero)
                    } else {
                        Ok(acc / n)
                    }
                })
            }
            CalculationKind::DateDiff => {
                let (start, end) = pair(config, lookup)?;
                let start = value::to_date(start.1).ok_or_else(|| Unresolved::InvalidOperand(start.0))?;
                let end = value::to_date(end.1).ok_or_else(|| Unresolved::InvalidOperand(end.0))?;
                Ok((end - start).num_days() as f64)
            }
            CalculationKind::TimeDiff => {
                let (start, end) = pair(config, lookup)?;
                self.minutes_between(start, end).map(|m| m as f64)
            }
            CalculationKind::Custom => {
                let source = config
                    .formula
                    .as_deref()
                    .filter(|f| !f.trim().is_empty())
                    .ok_or(Unresolved::MissingFormula)?;
                let formula = Formula::parse_with_depth(source, self.max_formula_depth)?;
                let result = formula.evaluate(|reference| {
                    lookup.resolve(reference).value().and_then(value::to_number)
                })?;
                Ok(result)
            }
        }?;
        if !result.is_finite() {
            return Err(Unresolved::NotFinite);
        }
        Ok(result)
    }

    fn minutes_between(
        &self,
        (start_ref, start): (String, &Value),
        (end_ref, end): (String, &Value),
    ) -> Result<i64, Unresolved> {
        if let (Some(start), Some(end)) = (value::to_datetime(start), value::to_datetime(end)) {
            return Ok((end - start).num_minutes());
        }
        let start = value::to_time(start).ok_or(Unresolved::InvalidOperand(start_ref))?;
        let end = value::to_time(end).ok_or(Unresolved::InvalidOperand(end_ref))?;
        let minutes = (end - start).num_minutes();
        if minutes < 0 && self.wraps_midnight {
            Ok(minutes + MINUTES_PER_DAY)
        } else {
            Ok(minutes)
        }
    }
}

/// Operand values in target order; dangling targets are skipped
fn operands<'a>(
    config: &CalculationConfig,
    lookup: &FieldLookup<'a>,
) -> Result<Vec<(String, &'a Value)>, Unresolved> {
    let mut out = Vec::with_capacity(config.target_fields.len());
    for target in &config.target_fields {
        match lookup.resolve(target) {
            Resolved::Dangling => continue,
            Resolved::Absent(_) => return Err(Unresolved::MissingOperand(target.clone())),
            Resolved::Present(_, value) if value::is_empty(value) => {
                return Err(Unresolved::MissingOperand(target.clone()))
            }
            Resolved::Present(_, value) => out.push((target.clone(), value)),
        }
    }
    if out.is_empty() {
        return Err(Unresolved::NoOperands);
    }
    Ok(out)
}

fn numbers(config: &CalculationConfig, lookup: &FieldLookup<'_>) -> Result<Vec<f64>, Unresolved> {
    operands(config, lookup)?
        .into_iter()
        .map(|(target, value)| value::to_number(value).ok_or(Unresolved::InvalidOperand(target)))
        .collect()
}

fn pair<'a>(
    config: &CalculationConfig,
    lookup: &FieldLookup<'a>,
) -> Result<((String, &'a Value), (String, &'a Value)), Unresolved> {
    let mut operands = operands(config, lookup)?.into_iter();
    match (operands.next(), operands.next()) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(Unresolved::NoOperands),
    }
}

/// Compute with default engine settings
pub fn compute(config: &CalculationConfig, lookup: &FieldLookup<'_>) -> Option<f64> {
    Calculator::default().compute(config, lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::FormSchema;
    use crate::domain::value_objects::{FieldConfig, FieldKind, FieldValues, NumberOptions};
    use serde_json::json;

    fn number(id: &str) -> FieldConfig {
        FieldConfig::with_id(id, FieldKind::Number(NumberOptions::default())).named(id, id)
    }

    fn schema() -> FormSchema {
        FormSchema::from_fields(vec![
            number("a"),
            number("b"),
            number("c"),
            FieldConfig::with_id("start", FieldKind::Time).named("start", "Start"),
            FieldConfig::with_id("end", FieldKind::Time).named("end", "End"),
            FieldConfig::with_id("from", FieldKind::Date).named("from", "From"),
            FieldConfig::with_id("to", FieldKind::Date).named("to", "To"),
        ])
    }

    fn run(config: &CalculationConfig, values: Value) -> Result<f64, Unresolved> {
        let schema = schema();
        let values: FieldValues = serde_json::from_value(values).unwrap();
        Calculator::default().try_compute(config, &FieldLookup::new(&schema, &values).log_dangling(false))
    }

    #[test]
    fn test_sum_and_missing_operand() {
        let sum = CalculationConfig::new(CalculationKind::Sum, ["a", "b"], "c");
        assert_eq!(run(&sum, json!({"a": 2, "b": 3})), Ok(5.0));
        assert_eq!(run(&sum, json!({"a": 2, "b": "3.5"})), Ok(5.5));
        assert_eq!(run(&sum, json!({"a": 2})), Err(Unresolved::MissingOperand("b".into())));
        assert_eq!(run(&sum, json!({"a": 2, "b": ""})), Err(Unresolved::MissingOperand("b".into())));
        assert_eq!(run(&sum, json!({"a": 2, "b": "x"})), Err(Unresolved::InvalidOperand("b".into())));
    }

    #[test]
    fn test_left_to_right_operators() {
        let values = json!({"a": 20, "b": 4, "c": 2});
        let subtract = CalculationConfig::new(CalculationKind::Subtract, ["a", "b", "c"], "c");
        let divide = CalculationConfig::new(CalculationKind::Divide, ["a", "b", "c"], "c");
        let multiply = CalculationConfig::new(CalculationKind::Multiply, ["a", "b", "c"], "c");
        assert_eq!(run(&subtract, values.clone()), Ok(14.0));
        assert_eq!(run(&divide, values.clone()), Ok(2.5));
        assert_eq!(run(&multiply, values), Ok(160.0));
    }

    #[test]
    fn test_division_by_zero_unresolved() {
        let divide = CalculationConfig::new(CalculationKind::Divide, ["a", "b"], "c");
        assert_eq!(run(&divide, json!({"a": 1, "b": 0})), Err(Unresolved::DivisionByZero));
    }

    #[test]
    fn test_overflow_unresolved() {
        let sum = CalculationConfig::new(CalculationKind::Sum, ["a", "b"], "c");
        assert_eq!(run(&sum, json!({"a": 1e308, "b": 1e308})), Err(Unresolved::NotFinite));

        let multiply = CalculationConfig::new(CalculationKind::Multiply, ["a", "b"], "c");
        assert_eq!(run(&multiply, json!({"a": -1e200, "b": 1e200})), Err(Unresolved::NotFinite));

        let divide = CalculationConfig::new(CalculationKind::Divide, ["a", "b"], "c");
        assert_eq!(run(&divide, json!({"a": 1e308, "b": 1e-10})), Err(Unresolved::NotFinite));
    }

    #[test]
    fn test_empty_and_dangling_targets() {
        let empty = CalculationConfig::new(CalculationKind::Sum, Vec::<String>::new(), "c");
        assert_eq!(run(&empty, json!({})), Err(Unresolved::NoOperands));

        let dangling = CalculationConfig::new(CalculationKind::Sum, ["a", "removed"], "c");
        assert_eq!(run(&dangling, json!({"a": 7})), Ok(7.0));
    }

    #[test]
    fn test_date_diff() {
        let diff = CalculationConfig::new(CalculationKind::DateDiff, ["from", "to"], "c");
        assert_eq!(run(&diff, json!({"from": "2024-01-01", "to": "2024-01-05"})), Ok(4.0));
        assert_eq!(run(&diff, json!({"from": "2024-03-01", "to": "2024-02-28"})), Ok(-2.0));
        assert_eq!(
            run(&diff, json!({"from": "2024-01-01", "to": "tomorrow"})),
            Err(Unresolved::InvalidOperand("to".into()))
        );
    }

    #[test]
    fn test_time_diff() {
        let diff = CalculationConfig::new(CalculationKind::TimeDiff, ["start", "end"], "c");
        assert_eq!(run(&diff, json!({"start": "09:00", "end": "17:30"})), Ok(510.0));
        assert_eq!(run(&diff, json!({"start": "22:00", "end": "06:00"})), Ok(480.0));
        assert_eq!(
            run(&diff, json!({"start": "2024-01-01T22:00", "end": "2024-01-02T06:30"})),
            Ok(510.0)
        );

        let schema = schema();
        let values: FieldValues = serde_json::from_value(json!({"start": "22:00", "end": "06:00"})).unwrap();
        let strict = Calculator::new(&EngineConfig {
            time_diff_wraps_midnight: false,
            ..EngineConfig::default()
        });
        assert_eq!(strict.try_compute(&diff, &FieldLookup::new(&schema, &values)), Ok(-960.0));
    }

    #[test]
    fn test_custom_formula() {
        let formula = CalculationConfig::custom("(a + b) * 2 - {c}", "c");
        assert_eq!(run(&formula, json!({"a": 1, "b": 2, "c": 1})), Ok(5.0));
        assert!(matches!(
            run(&formula, json!({"a": 1, "b": 2})),
            Err(Unresolved::Formula(FormulaError::Unresolved(_)))
        ));

        let broken = CalculationConfig::custom("a +", "c");
        assert!(matches!(run(&broken, json!({"a": 1})), Err(Unresolved::Formula(_))));

        let mut missing = CalculationConfig::custom("", "c");
        missing.formula = None;
        assert_eq!(run(&missing, json!({})), Err(Unresolved::MissingFormula));
    }
}
