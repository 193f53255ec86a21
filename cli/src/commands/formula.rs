//! Formula evaluation

use crate::config::Config;
use crate::output::OutputFormat;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tabled::Tabled;
use timeport_forms::Formula;

#[derive(Serialize)]
struct FormulaOutput<'a> {
    formula: &'a str,
    references: Vec<&'a str>,
    result: f64,
}

#[derive(Tabled)]
struct FormulaRow {
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "References")]
    references: String,
    #[tabled(rename = "Result")]
    result: f64,
}

/// Parse a `name=value` binding
pub fn parse_var(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.to_string(), value))
}

pub fn handle(
    expression: &str,
    vars: &[(String, f64)],
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let formula = Formula::parse_with_depth(expression, config.engine.max_formula_depth)?;
    let bindings: HashMap<&str, f64> = vars.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let result = formula.evaluate(|name| bindings.get(name).copied())?;

    let output = FormulaOutput {
        formula: formula.source(),
        references: formula.references(),
        result,
    };
    format.print(&output, || {
        vec![FormulaRow {
            formula: output.formula.to_string(),
            references: output.references.join(", "),
            result,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("rate=21.5"), Ok(("rate".to_string(), 21.5)));
        assert_eq!(parse_var(" hours = 8 "), Ok(("hours".to_string(), 8.0)));
        assert!(parse_var("rate").is_err());
        assert!(parse_var("=3").is_err());
        assert!(parse_var("rate=fast").is_err());
    }

    #[test]
    fn test_unbound_variable_fails() {
        let config = Config::default();
        let vars = vec![("hours".to_string(), 8.0)];
        assert!(handle("hours * rate", &vars, &config, OutputFormat::Json).is_err());
        assert!(handle("hours * 2", &vars, &config, OutputFormat::Json).is_ok());
    }
}
