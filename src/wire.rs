//! Wire message types
//!
//! Shapes of the messages exchanged between the authoritative host and the
//! passive display surface. The transport itself is external; it is assumed
//! reliable, ordered, and at-most-once per session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The set of availability changes since the last sync, keyed by state key
/// and raw choice index. Empty patches are never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceAvailabilityPatch {
    updated: BTreeMap<String, BTreeMap<usize, bool>>,
}

impl ChoiceAvailabilityPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
    }

    /// Record one changed `(state key, raw choice index) -> availability`
    /// entry.
    pub fn mark_updated(&mut self, state_key: &str, choice_index: usize, available: bool) {
        self.updated
            .entry(state_key.to_string())
            .or_default()
            .insert(choice_index, available);
    }

    /// Look up an entry, `None` when this patch does not touch it.
    pub fn get(&self, state_key: &str, choice_index: usize) -> Option<bool> {
        self.updated.get(state_key)?.get(&choice_index).copied()
    }

    /// Fold another patch into this one, later entries winning.
    pub fn merge(&mut self, other: &ChoiceAvailabilityPatch) {
        for (state_key, entries) in &other.updated {
            let slot = self.updated.entry(state_key.clone()).or_default();
            for (&index, &available) in entries {
                slot.insert(index, available);
            }
        }
    }

    /// Iterate all entries as `(state key, choice index, availability)`.
    pub fn entries(&self) -> impl Iterator<Item = (&str, usize, bool)> {
        self.updated.iter().flat_map(|(state_key, entries)| {
            entries
                .iter()
                .map(move |(&index, &available)| (state_key.as_str(), index, available))
        })
    }
}

/// Sent display-ward once when a display surface opens (or re-opens): the
/// session identity plus a full availability baseline for the current state.
/// Patches are meaningless until the display has seen this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialSnapshot {
    pub template_id: String,
    pub current_state_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<Uuid>,
    pub availability: ChoiceAvailabilityPatch,
}

/// Sent authoritative-ward when the participant picks an option. The index is
/// positional within the *offered* (filtered) list the display showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSelection {
    pub displayed_index: u8,
}

/// Sent display-ward when a selection was rejected, so the display can pin
/// itself back to the authoritative state without drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCorrection {
    pub state_key: String,
}
