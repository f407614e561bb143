//! Dialogue states and their result kinds

use super::choice::DialogueChoice;
use super::template::InstancedAction;
use serde::{Deserialize, Serialize};

/// What reaching a state means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceResult {
    /// Normal state: text plus a list of choices.
    #[default]
    Default,
    /// Terminal state: no choices are offered, the session ends here.
    EndDialogue,
    /// Two-choice accept/decline confirmation instead of a list.
    AskConfirmation,
}

impl ChoiceResult {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChoiceResult::EndDialogue)
    }
}

/// One node of the dialogue graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueState {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub illustrations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<DialogueChoice>,
    /// Side effect fired when the state is reached, never interpreted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<InstancedAction>,
    #[serde(default, rename = "type")]
    pub result: ChoiceResult,
}

impl DialogueState {
    /// Target state key for a raw (unfiltered) choice index.
    pub fn next_state(&self, raw_index: usize) -> Option<&str> {
        self.choices.get(raw_index).map(|c| c.next.as_str())
    }

    /// Whether any choice in this state carries a condition.
    pub fn has_conditions(&self) -> bool {
        self.choices.iter().any(|c| c.only_if.is_some())
    }
}
