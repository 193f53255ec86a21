//! TimePort Forms - dynamic form configuration engine
//!
//! Administrators define form schemas (report templates, request and approval
//! forms) out of typed fields carrying validation rules, conditional
//! show/hide/require/disable logic and calculated values. This crate holds
//! the schema model and everything that evaluates it:
//!
//! - **Schema model**: [`FieldConfig`] with a [`FieldKind`] per field type, kept
//!   in an ordered [`FormSchema`] inside a versioned [`FormDefinition`]
//! - **Validation**: [`Validator`], rule checks plus kind checks
//! - **Conditional logic**: [`conditional::evaluate`] yields a [`FieldState`]
//! - **Calculations**: [`Calculator`], fixed operators or a sandboxed [`Formula`]
//! - **Builder**: [`FormBuilder`], CRUD over the field list with integrity gates
//! - **Submission**: [`SubmissionEvaluator`] runs all of the above for one value set
//!
//! Evaluation never fails: rule failures are values, incomplete calculations
//! stay unresolved and dangling references are inert. Only builder-time
//! integrity problems surface as [`FormsError`].
//!
//! ```
//! use serde_json::json;
//! use timeport_forms::{evaluate_submission, FieldValues, FormSchema};
//!
//! let schema: FormSchema = serde_json::from_value(json!([
//!     {"id": "start", "name": "start", "label": "Start", "type": "date"},
//!     {"id": "end", "name": "end", "label": "End", "type": "date"},
//!     {"id": "days", "name": "days", "label": "Days", "type": "number",
//!      "calculation_config": {"type": "date_diff", "target_fields": ["start", "end"], "result_field": "days"}}
//! ])).unwrap();
//! let values: FieldValues = serde_json::from_value(json!({"start": "2024-01-01", "end": "2024-01-05"})).unwrap();
//!
//! let result = evaluate_submission(&schema, &values);
//! assert!(result.valid);
//! assert_eq!(result.values["days"], json!(4));
//! ```

#![warn(clippy::all)]

pub mod builder;
pub mod calculation;
pub mod conditional;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod formula;
pub mod lookup;
pub mod validation;
pub mod value;

pub use builder::{check_integrity, FieldPatch, FormBuilder, IntegrityReport};
pub use calculation::{Calculator, Unresolved};
pub use conditional::FieldState;
pub use config::EngineConfig;
pub use domain::*;
pub use error::{FormsError, IntegrityIssue, Result};
pub use evaluator::{evaluate_submission, SubmissionEvaluator, SubmissionResult};
pub use formula::{Formula, FormulaError};
pub use lookup::FieldLookup;
pub use validation::{validate, CustomValidator, ValidationError, Validator, ValidatorRegistry};
