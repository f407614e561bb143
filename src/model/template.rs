//! Top-level dialogue template

use super::state::DialogueState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An opaque, registry-dispatched side effect.
///
/// The core never interprets `params`; the authoritative side hands the whole
/// thing to an [`ActionRegistry`](crate::capability::ActionRegistry) which
/// knows how to turn `kind` + `params` into something executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancedAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Value,
}

/// An immutable dialogue graph, keyed by state key.
///
/// Produced by the [loader](crate::loader), gated by
/// [`validate_structure`](super::validate::validate_structure), and shared
/// read-only between every session that runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTemplate {
    pub start_at: String,
    /// Unskippable dialogues re-open their display surface until a terminal
    /// state is reached; skippable ones end when the surface is dismissed.
    #[serde(default)]
    pub unskippable: bool,
    pub states: BTreeMap<String, DialogueState>,
    /// Fired once when a session begins, before the first state is shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_action: Option<InstancedAction>,
}

impl DialogueTemplate {
    pub fn state(&self, key: &str) -> Option<&DialogueState> {
        self.states.get(key)
    }

    /// Whether any state carries a conditioned choice. Sessions over
    /// condition-free templates skip availability sync entirely.
    pub fn has_conditions(&self) -> bool {
        self.states.values().any(DialogueState::has_conditions)
    }
}
