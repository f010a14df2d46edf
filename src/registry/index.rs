use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::BackendDescriptor;
use crate::backends::ModelDescriptor;

/// A model together with every backend that serves it.
#[derive(Debug)]
pub(crate) struct IndexEntry {
    /// The model as reported by the first backend, by address, serving it.
    pub model: ModelDescriptor,
    /// Ordered by address, never empty, no address twice.
    pub backends: Vec<Arc<BackendDescriptor>>,
}

#[derive(Debug)]
pub(crate) enum Lookup<'i> {
    Found(&'i [Arc<BackendDescriptor>]),
    NotFound,
}

/// Maps model names to the backends serving them.
///
/// An index is immutable once built. A model name is present if and only if
/// at least one of the backends it was built from reports serving it.
#[derive(Debug, Default)]
pub(crate) struct ModelIndex {
    models: HashMap<String, IndexEntry>,
}

impl ModelIndex {
    pub(crate) fn build(backends: &[Arc<BackendDescriptor>]) -> ModelIndex {
        let mut ordered: Vec<&Arc<BackendDescriptor>> = backends.iter().collect();
        ordered.sort_by(|a, b| a.address.cmp(&b.address));

        let mut models: HashMap<String, IndexEntry> = HashMap::new();

        for backend in ordered {
            for model in &backend.served_models {
                let entry = models
                    .entry(model.name.clone())
                    .or_insert_with(|| IndexEntry {
                        model: model.clone(),
                        backends: Vec::new(),
                    });

                let listed = entry
                    .backends
                    .iter()
                    .any(|b| b.address == backend.address);

                if !listed {
                    entry.backends.push(backend.clone());
                }
            }
        }

        ModelIndex { models }
    }

    pub(crate) fn lookup(&self, model: &str) -> Lookup<'_> {
        match self.models.get(model) {
            Some(entry) => Lookup::Found(&entry.backends),
            None => Lookup::NotFound,
        }
    }

    /// All entries, ordered by model name.
    pub(crate) fn entries(&self) -> Vec<&IndexEntry> {
        let mut entries: Vec<&IndexEntry> = self.models.values().collect();
        entries.sort_by(|a, b| a.model.name.cmp(&b.model.name));

        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.models.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
