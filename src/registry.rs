//! Registry of validated dialogue templates
//!
//! An explicit value, populated by the [loader](crate::loader) at startup (or
//! content reload) and injected into the lifecycle manager — never ambient
//! global state. Only templates that passed structural validation get in.

use crate::model::DialogueTemplate;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct DialogueRegistry {
    entries: BTreeMap<String, Arc<DialogueTemplate>>,
}

impl DialogueRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, DialogueTemplate)>) -> Self {
        let mut registry = Self::new();
        registry.set_entries(entries);
        registry
    }

    /// Replace the whole template set, the content-reload semantics: stale
    /// ids disappear, running sessions keep their own resolved copies.
    pub fn set_entries(&mut self, entries: impl IntoIterator<Item = (String, DialogueTemplate)>) {
        self.entries = entries
            .into_iter()
            .map(|(id, template)| (id, Arc::new(template)))
            .collect();
    }

    pub fn get(&self, id: &str) -> Option<Arc<DialogueTemplate>> {
        self.entries.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
