//! Form events
//!
//! Recorded by the builder for every accepted mutation and drained with
//! `take_events`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub form_id: String,
    /// Definition version the event applies to
    pub version: u32,
    pub occurred_at: DateTime<Utc>,
    pub event: FormEvent,
}

impl DomainEvent {
    pub fn new(form_id: impl Into<String>, version: u32, event: FormEvent) -> Self {
        Self {
            form_id: form_id.into(),
            version,
            occurred_at: Utc::now(),
            event,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormEvent {
    FieldAdded { field_id: String },
    FieldRemoved { field_id: String },
    FieldDuplicated { source_id: String, field_id: String },
    FieldMoved { field_id: String, from: usize, to: usize },
    FieldUpdated { field_id: String },
    CalculationSet { field_id: String },
    CalculationCleared { field_id: String },
    Published,
    Archived,
}

impl FormEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::FieldAdded { .. } => "form.field_added",
            Self::FieldRemoved { .. } => "form.field_removed",
            Self::FieldDuplicated { .. } => "form.field_duplicated",
            Self::FieldMoved { .. } => "form.field_moved",
            Self::FieldUpdated { .. } => "form.field_updated",
            Self::CalculationSet { .. } => "form.calculation_set",
            Self::CalculationCleared { .. } => "form.calculation_cleared",
            Self::Published => "form.published",
            Self::Archived => "form.archived",
        }
    }
}
