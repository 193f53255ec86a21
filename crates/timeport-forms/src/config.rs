//! Engine configuration

use serde::{Deserialize, Serialize};

/// Tunables shared by the evaluation engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Drop values of hidden fields from submission results
    pub strip_hidden_values: bool,
    /// Run kind-specific checks (numbers, choice lists, dates) besides configured rules
    pub enforce_field_kinds: bool,
    /// Negative `time_diff` results wrap around midnight (overnight shifts)
    pub time_diff_wraps_midnight: bool,
    /// Maximum nesting depth accepted by the formula parser
    pub max_formula_depth: usize,
    /// Message used when a failing rule has none configured
    pub fallback_message: String,
    /// Emit a warning for every dangling rule reference met during evaluation
    pub log_dangling_references: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strip_hidden_values: true,
            enforce_field_kinds: true,
            time_diff_wraps_midnight: true,
            max_formula_depth: 64,
            fallback_message: "Invalid value".to_string(),
            log_dangling_references: true,
        }
    }
}
