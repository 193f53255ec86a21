//! Error types for TimePort forms

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Forms engine error type
///
/// Only builder-time problems are escalated as errors. Evaluation-time
/// conditions (failed rules, unresolved calculations, dangling references)
/// are reported as values and never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormsError {
    /// Field id not present in the schema
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// Index outside the field list
    #[error("index {index} out of range for {len} fields")]
    IndexOutOfRange { index: usize, len: usize },

    /// Rule index outside a field's rule list
    #[error("rule {index} not found on field {field_id}")]
    RuleNotFound { field_id: String, index: usize },

    /// Schema invariants violated, save blocked
    #[error("schema integrity violated: {}", summarize(.0))]
    SchemaIntegrity(Vec<IntegrityIssue>),

    /// Publishing a form without fields
    #[error("form {0} has no fields")]
    NoFields(String),

    /// Definition is published and can no longer be edited
    #[error("form {0} is published; create a new revision to edit it")]
    AlreadyPublished(String),

    /// Lifecycle transition not allowed from the current status
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// Options payload does not fit the field type
    #[error("invalid options for {field_type} field: {message}")]
    InvalidOptions { field_type: String, message: String },
}

/// Result type for the forms engine
pub type Result<T> = std::result::Result<T, FormsError>;

/// A single schema integrity violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// Field name is empty
    EmptyName { field_id: String },
    /// Field label is empty
    EmptyLabel { field_id: String },
    /// Two or more fields share a name
    DuplicateName { field_id: String, name: String },
    /// A calculation lists its own field as an operand
    CalculationSelfReference { field_id: String },
    /// A calculation points at a field that does not exist
    DanglingCalculationReference { field_id: String, reference: String },
    /// A calculation writes into a non-numeric field
    NonNumericResultField { field_id: String, result_field: String },
    /// A result field is also an operand of some calculation
    ChainedCalculation { field_id: String, result_field: String },
    /// Two calculations write the same result field
    ConflictingResultField { field_id: String, result_field: String },
    /// Custom calculation without a formula
    MissingFormula { field_id: String },
    /// Custom formula does not parse
    InvalidFormula { field_id: String, message: String },
    /// A conditional rule points at a field that does not exist
    DanglingConditionalReference { field_id: String, reference: String },
    /// A conditional rule inspects its own field
    ConditionalSelfReference { field_id: String },
}

impl IntegrityIssue {
    /// Field the issue was raised on
    pub fn field_id(&self) -> &str {
        match self {
            Self::EmptyName { field_id }
            | Self::EmptyLabel { field_id }
            | Self::DuplicateName { field_id, .. }
            | Self::CalculationSelfReference { field_id }
            | Self::DanglingCalculationReference { field_id, .. }
            | Self::NonNumericResultField { field_id, .. }
            | Self::ChainedCalculation { field_id, .. }
            | Self::ConflictingResultField { field_id, .. }
            | Self::MissingFormula { field_id }
            | Self::InvalidFormula { field_id, .. }
            | Self::DanglingConditionalReference { field_id, .. }
            | Self::ConditionalSelfReference { field_id } => field_id,
        }
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName { field_id } => write!(f, "{}: name is empty", field_id),
            Self::EmptyLabel { field_id } => write!(f, "{}: label is empty", field_id),
            Self::DuplicateName { field_id, name } => {
                write!(f, "{}: name '{}' is used by another field", field_id, name)
            }
            Self::CalculationSelfReference { field_id } => {
                write!(f, "{}: calculation uses its own field as an operand", field_id)
            }
            Self::DanglingCalculationReference { field_id, reference } => {
                write!(f, "{}: calculation references unknown field '{}'", field_id, reference)
            }
            Self::NonNumericResultField { field_id, result_field } => {
                write!(f, "{}: result field '{}' is not a number field", field_id, result_field)
            }
            Self::ChainedCalculation { field_id, result_field } => write!(
                f,
                "{}: result field '{}' feeds another calculation",
                field_id, result_field
            ),
            Self::ConflictingResultField { field_id, result_field } => write!(
                f,
                "{}: result field '{}' is written by another calculation",
                field_id, result_field
            ),
            Self::MissingFormula { field_id } => {
                write!(f, "{}: custom calculation has no formula", field_id)
            }
            Self::InvalidFormula { field_id, message } => {
                write!(f, "{}: invalid formula: {}", field_id, message)
            }
            Self::DanglingConditionalReference { field_id, reference } => {
                write!(f, "{}: condition references unknown field '{}'", field_id, reference)
            }
            Self::ConditionalSelfReference { field_id } => {
                write!(f, "{}: condition inspects its own field", field_id)
            }
        }
    }
}

fn summarize(issues: &[IntegrityIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
