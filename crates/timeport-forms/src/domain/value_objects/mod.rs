//! Forms value objects
//!
//! The persisted shape of a field is a flat record
//! (`{id, name, type, label, required, order, width, options, ...}`).
//! In memory the `type` tag and its `options` are fused into [`FieldKind`],
//! so each kind carries exactly the options it understands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Runtime values of a form, keyed by field id
pub type FieldValues = BTreeMap<String, Value>;

/// Field identifier (Value Object)
///
/// # Invariants
/// - Immutable once created
/// - Unique within a schema
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FieldId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for FieldId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FieldId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Field type tag as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Date,
    Time,
    Datetime,
    Email,
    #[serde(alias = "tel")]
    Phone,
    Url,
    Select,
    Radio,
    Checkbox,
    File,
    Hidden,
    Object,
}

impl FieldType {
    /// Every supported type, in declaration order
    pub const ALL: [FieldType; 15] = [
        Self::Text,
        Self::Textarea,
        Self::Number,
        Self::Date,
        Self::Time,
        Self::Datetime,
        Self::Email,
        Self::Phone,
        Self::Url,
        Self::Select,
        Self::Radio,
        Self::Checkbox,
        Self::File,
        Self::Hidden,
        Self::Object,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Date => "date",
            Self::Time => "time",
            Self::Datetime => "datetime",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Select => "select",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::File => "file",
            Self::Hidden => "hidden",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_ascii_lowercase()))
            .map_err(|_| format!("unknown field type: {}", s))
    }
}

/// Field kind with its type-specific options
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text(TextOptions),
    Textarea(TextareaOptions),
    Number(NumberOptions),
    Date,
    Time,
    DateTime,
    Email,
    Phone,
    Url,
    Select(ChoiceOptions),
    Radio(ChoiceOptions),
    Checkbox(ChoiceOptions),
    File(FileOptions),
    Hidden,
    Object(Map<String, Value>),
}

impl FieldKind {
    /// Kind with default options for a type
    pub fn with_defaults(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Text => Self::Text(TextOptions::default()),
            FieldType::Textarea => Self::Textarea(TextareaOptions::default()),
            FieldType::Number => Self::Number(NumberOptions::default()),
            FieldType::Date => Self::Date,
            FieldType::Time => Self::Time,
            FieldType::Datetime => Self::DateTime,
            FieldType::Email => Self::Email,
            FieldType::Phone => Self::Phone,
            FieldType::Url => Self::Url,
            FieldType::Select => Self::Select(ChoiceOptions::default()),
            FieldType::Radio => Self::Radio(ChoiceOptions::default()),
            FieldType::Checkbox => Self::Checkbox(ChoiceOptions::default()),
            FieldType::File => Self::File(FileOptions::default()),
            FieldType::Hidden => Self::Hidden,
            FieldType::Object => Self::Object(Map::new()),
        }
    }

    /// Build a kind from the persisted `type` tag and `options` payload
    pub fn from_parts(field_type: FieldType, options: Value) -> Result<Self, serde_json::Error> {
        if options.is_null() {
            return Ok(Self::with_defaults(field_type));
        }
        let kind = match field_type {
            FieldType::Text => Self::Text(serde_json::from_value(options)?),
            FieldType::Textarea => Self::Textarea(serde_json::from_value(options)?),
            FieldType::Number => Self::Number(serde_json::from_value(options)?),
            FieldType::Select => Self::Select(ChoiceOptions::from_value(options)?),
            FieldType::Radio => Self::Radio(ChoiceOptions::from_value(options)?),
            FieldType::Checkbox => Self::Checkbox(ChoiceOptions::from_value(options)?),
            FieldType::File => Self::File(serde_json::from_value(options)?),
            FieldType::Object => Self::Object(serde_json::from_value(options)?),
            // Kinds without options ignore whatever was stored
            other => Self::with_defaults(other),
        };
        Ok(kind)
    }

    /// Persisted type tag
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Text(_) => FieldType::Text,
            Self::Textarea(_) => FieldType::Textarea,
            Self::Number(_) => FieldType::Number,
            Self::Date => FieldType::Date,
            Self::Time => FieldType::Time,
            Self::DateTime => FieldType::Datetime,
            Self::Email => FieldType::Email,
            Self::Phone => FieldType::Phone,
            Self::Url => FieldType::Url,
            Self::Select(_) => FieldType::Select,
            Self::Radio(_) => FieldType::Radio,
            Self::Checkbox(_) => FieldType::Checkbox,
            Self::File(_) => FieldType::File,
            Self::Hidden => FieldType::Hidden,
            Self::Object(_) => FieldType::Object,
        }
    }

    /// Persisted options payload (`null` for kinds without options)
    pub fn options_value(&self) -> Value {
        let serialized = match self {
            Self::Text(o) => serde_json::to_value(o),
            Self::Textarea(o) => serde_json::to_value(o),
            Self::Number(o) => serde_json::to_value(o),
            Self::Select(o) | Self::Radio(o) | Self::Checkbox(o) => serde_json::to_value(o),
            Self::File(o) => serde_json::to_value(o),
            Self::Object(map) => Ok(Value::Object(map.clone())),
            _ => Ok(Value::Null),
        };
        serialized.unwrap_or(Value::Null)
    }

    /// Whether a calculation may write into this kind
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Choice list for select/radio/checkbox kinds
    pub fn choices(&self) -> Option<&[ChoiceOption]> {
        match self {
            Self::Select(o) | Self::Radio(o) | Self::Checkbox(o) => Some(&o.choices),
            _ => None,
        }
    }
}

/// Options for single-line text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// Options for multi-line text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextareaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    pub markdown: bool,
}

/// Numeric bounds and step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

/// File upload constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    pub multiple: bool,
}

/// Choice list for select, radio and checkbox fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceOptions {
    pub choices: Vec<ChoiceOption>,
}

impl ChoiceOptions {
    /// Accepts either a bare array of choices or `{ "choices": [...] }`
    fn from_value(options: Value) -> Result<Self, serde_json::Error> {
        match options {
            Value::Array(_) => Ok(Self {
                choices: serde_json::from_value(options)?,
            }),
            other => serde_json::from_value(other),
        }
    }

    /// Whether `value` matches one of the choice values
    pub fn contains(&self, value: &str) -> bool {
        self.choices.iter().any(|c| c.value == value)
    }
}

/// One selectable choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawChoice")]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChoice {
    Plain(String),
    Full {
        label: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl From<RawChoice> for ChoiceOption {
    fn from(raw: RawChoice) -> Self {
        match raw {
            RawChoice::Plain(v) => Self::new(v.clone(), v),
            RawChoice::Full { label, value } => {
                let value = value.unwrap_or_else(|| label.clone());
                Self { label, value }
            }
        }
    }
}

/// Layout width hint (not evaluated)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldWidth {
    #[default]
    Full,
    Half,
    Third,
    Quarter,
}

/// Validation rule type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    Required,
    MinLength,
    MaxLength,
    Min,
    Max,
    Pattern,
    Email,
    Tel,
    Url,
    Custom,
}

/// One validation rule on a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default)]
    pub message: String,
}

impl ValidationRule {
    pub fn new(kind: RuleKind, value: impl Into<Value>, message: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            message: message.into(),
        }
    }

    /// Rule without a parameter
    pub fn flag(kind: RuleKind, message: impl Into<String>) -> Self {
        Self::new(kind, Value::Null, message)
    }
}

/// Comparison applied by a conditional rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
}

/// Effect applied to the owning field when a condition holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAction {
    Show,
    Hide,
    Require,
    Disable,
}

/// Cross-field visibility/require/disable rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    /// Id (or name) of the inspected field
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    pub action: ConditionAction,
}

impl ConditionalRule {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
        action: ConditionAction,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            action,
        }
    }
}

/// Calculation operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    Sum,
    Multiply,
    Divide,
    Subtract,
    DateDiff,
    TimeDiff,
    Custom,
}

/// Derived-value declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationConfig {
    #[serde(rename = "type")]
    pub kind: CalculationKind,
    /// Operand field ids, left to right
    #[serde(default)]
    pub target_fields: Vec<String>,
    /// Field overwritten with the result
    pub result_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl CalculationConfig {
    pub fn new<I, S>(kind: CalculationKind, targets: I, result_field: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            target_fields: targets.into_iter().map(Into::into).collect(),
            result_field: result_field.into(),
            formula: None,
        }
    }

    /// Custom calculation from a formula
    pub fn custom(formula: impl Into<String>, result_field: impl Into<String>) -> Self {
        Self {
            kind: CalculationKind::Custom,
            target_fields: Vec::new(),
            result_field: result_field.into(),
            formula: Some(formula.into()),
        }
    }
}

/// One form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldConfig", into = "RawFieldConfig")]
pub struct FieldConfig {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
    pub label: String,
    pub required: bool,
    pub order: u32,
    pub width: FieldWidth,
    pub validation_rules: Vec<ValidationRule>,
    pub conditional_logic: Vec<ConditionalRule>,
    pub calculation_config: Option<CalculationConfig>,
}

impl FieldConfig {
    /// Blank field of the given kind with a generated id
    pub fn new(kind: FieldKind) -> Self {
        Self::with_id(FieldId::generate(), kind)
    }

    /// Blank field with a caller-chosen id
    pub fn with_id(id: impl Into<FieldId>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind,
            label: String::new(),
            required: false,
            order: 0,
            width: FieldWidth::default(),
            validation_rules: Vec::new(),
            conditional_logic: Vec::new(),
            calculation_config: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.name = name.into();
        self.label = label.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    pub fn with_condition(mut self, rule: ConditionalRule) -> Self {
        self.conditional_logic.push(rule);
        self
    }

    pub fn with_calculation(mut self, config: CalculationConfig) -> Self {
        self.calculation_config = Some(config);
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// Whether `reference` designates this field (by id or by name)
    pub fn answers_to(&self, reference: &str) -> bool {
        self.id == reference || (!self.name.is_empty() && self.name == reference)
    }
}

impl From<String> for FieldId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Serialize, Deserialize)]
struct RawFieldConfig {
    id: FieldId,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    label: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    order: u32,
    #[serde(default)]
    width: FieldWidth,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    options: Value,
    #[serde(default)]
    validation_rules: Vec<ValidationRule>,
    #[serde(default)]
    conditional_logic: Vec<ConditionalRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calculation_config: Option<CalculationConfig>,
}

impl TryFrom<RawFieldConfig> for FieldConfig {
    type Error = serde_json::Error;

    fn try_from(raw: RawFieldConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: FieldKind::from_parts(raw.field_type, raw.options)?,
            id: raw.id,
            name: raw.name,
            label: raw.label,
            required: raw.required,
            order: raw.order,
            width: raw.width,
            validation_rules: raw.validation_rules,
            conditional_logic: raw.conditional_logic,
            calculation_config: raw.calculation_config,
        })
    }
}

impl From<FieldConfig> for RawFieldConfig {
    fn from(field: FieldConfig) -> Self {
        Self {
            field_type: field.kind.field_type(),
            options: field.kind.options_value(),
            id: field.id,
            name: field.name,
            label: field.label,
            required: field.required,
            order: field.order,
            width: field.width,
            validation_rules: field.validation_rules,
            conditional_logic: field.conditional_logic,
            calculation_config: field.calculation_config,
        }
    }
}
