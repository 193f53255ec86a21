//! Repositories - Persistence abstraction for form definitions
//!
//! Storage, versioning history and tenant scoping belong to the host
//! application; this is the contract the engine saves through.

use super::aggregates::{FormDefinition, FormPurpose, FormStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Repository result type
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Form definition repository
#[async_trait]
pub trait FormRepository: Send + Sync {
    /// Get definition by ID
    async fn get(&self, id: &str) -> RepoResult<FormDefinition>;

    /// Save definition
    async fn save(&self, form: &FormDefinition) -> RepoResult<()>;

    /// Delete definition
    async fn delete(&self, id: &str) -> RepoResult<()>;

    /// List definitions, optionally by purpose
    async fn list(&self, purpose: Option<FormPurpose>) -> RepoResult<Vec<FormDefinition>>;
}

/// In-memory form repository (for testing and embedding)
pub struct InMemoryFormRepository {
    forms: RwLock<HashMap<String, FormDefinition>>,
}

impl InMemoryFormRepository {
    pub fn new() -> Self {
        Self {
            forms: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryFormRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormRepository for InMemoryFormRepository {
    async fn get(&self, id: &str) -> RepoResult<FormDefinition> {
        self.forms
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn save(&self, form: &FormDefinition) -> RepoResult<()> {
        let mut forms = self.forms.write();
        if let Some(stored) = forms.get(form.id()) {
            check_version(stored, form)?;
        }
        forms.insert(form.id().to_string(), form.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        self.forms
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn list(&self, purpose: Option<FormPurpose>) -> RepoResult<Vec<FormDefinition>> {
        let mut forms: Vec<_> = self
            .forms
            .read()
            .values()
            .filter(|f| purpose.map_or(true, |p| f.purpose() == p))
            .cloned()
            .collect();
        forms.sort_by(|a, b| a.title().cmp(b.title()).then_with(|| a.id().cmp(b.id())));
        Ok(forms)
    }
}

/// Reject stale writes and in-place edits of a published version
fn check_version(stored: &FormDefinition, incoming: &FormDefinition) -> RepoResult<()> {
    if incoming.version() < stored.version() {
        return Err(RepositoryError::Conflict(format!(
            "stale version {} of form {} (stored {})",
            incoming.version(),
            incoming.id(),
            stored.version()
        )));
    }
    let frozen = stored.status() == FormStatus::Published
        && incoming.version() == stored.version()
        && incoming.status() != FormStatus::Archived;
    if frozen && incoming.schema() != stored.schema() {
        return Err(RepositoryError::Conflict(format!(
            "form {} version {} is published",
            incoming.id(),
            stored.version()
        )));
    }
    Ok(())
}
