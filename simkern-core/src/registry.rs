//! Name-keyed catalogs of platform resources.
//!
//! Resources never touch the engine's tables directly: platform realization
//! hands each one to a [`Registrar`], which is the only write path into a
//! [`Registry`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::ModelKind;

/// Registry lookup and bookkeeping failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} '{name}' is not registered")]
    NotFound { kind: &'static str, name: String },
}

/// Narrow write interface used by resources to enter or leave a registry.
pub trait Registrar<T> {
    /// Adds `resource` under `name`, owned by the `owner` model.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Duplicate` - Name already present
    fn register(
        &mut self,
        name: &str,
        resource: Arc<T>,
        owner: ModelKind,
    ) -> Result<(), RegistryError>;

    /// Removes the resource registered under `name` and returns it.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` - Name absent
    fn unregister(&mut self, name: &str) -> Result<Arc<T>, RegistryError>;
}

#[derive(Debug)]
struct Entry<T> {
    resource: Arc<T>,
    owner: ModelKind,
    sequence: u64,
}

/// Flat catalog mapping unique names to live resources.
///
/// Enumeration follows registration order.
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: HashMap<String, Entry<T>>,
    next_sequence: u64,
}

impl<T> Registry<T> {
    /// Creates an empty registry; `kind` names the resource type in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Looks up a resource, failing if the name is not registered.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` - Name absent
    pub fn by_name(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.by_name_or_null(name)
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Looks up a resource, returning `None` if the name is not registered.
    pub fn by_name_or_null(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).map(|entry| Arc::clone(&entry.resource))
    }

    /// Returns the model owning the named resource.
    pub fn owner_of(&self, name: &str) -> Option<ModelKind> {
        self.entries.get(name).map(|entry| entry.owner)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Returns every resource in registration order.
    pub fn all(&self) -> Vec<Arc<T>> {
        self.filtered(|_| true)
    }

    /// Returns resources matching `predicate`, in registration order.
    pub fn filtered<F>(&self, mut predicate: F) -> Vec<Arc<T>>
    where
        F: FnMut(&T) -> bool,
    {
        let mut matching: Vec<&Entry<T>> = self
            .entries
            .values()
            .filter(|entry| predicate(&entry.resource))
            .collect();
        matching.sort_by_key(|entry| entry.sequence);
        matching
            .into_iter()
            .map(|entry| Arc::clone(&entry.resource))
            .collect()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Registrar<T> for Registry<T> {
    fn register(
        &mut self,
        name: &str,
        resource: Arc<T>,
        owner: ModelKind,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name: name.to_string(),
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            name.to_string(),
            Entry {
                resource,
                owner,
                sequence,
            },
        );
        Ok(())
    }

    fn unregister(&mut self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.entries
            .remove(name)
            .map(|entry| entry.resource)
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }
}
