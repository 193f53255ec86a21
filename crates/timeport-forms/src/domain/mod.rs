//! TimePort forms domain model
//!
//! - **Value Objects**: FieldId, FieldConfig, FieldKind and the rule configs
//! - **Aggregates**: FormSchema, FormDefinition
//! - **Domain Events**: FormEvent
//! - **Repositories**: FormRepository

pub mod value_objects;
pub mod aggregates;
pub mod events;
pub mod repositories;

pub use value_objects::*;
pub use aggregates::*;
pub use events::*;
pub use repositories::*;
