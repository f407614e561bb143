//! Choice edges and their availability conditions

use serde::{Deserialize, Serialize};

/// One edge of the dialogue graph: display text, a target state, and an
/// optional availability condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueChoice {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub illustrations: Vec<String>,
    pub next: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_if: Option<DialogueChoiceCondition>,
}

/// A predicate reference plus the display policy for when it is false.
///
/// The predicate itself is opaque to the core: it names an entry in the
/// [`PredicateRegistry`](crate::capability::PredicateRegistry) and is only
/// ever evaluated on the authoritative side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueChoiceCondition {
    pub predicate: String,
    pub when_unavailable: UnavailableAction,
}

/// What the display does with a choice whose condition is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableAction {
    pub display: UnavailableDisplay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UnavailableAction {
    /// Message shown on a grayed-out entry; falls back to a generic one so
    /// the display never renders an unavailable choice without explanation.
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Unavailable".to_string())
    }
}

/// Display policy for unavailable choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableDisplay {
    /// Keep the choice in the list, visibly disabled, with a message.
    GrayedOut,
    /// Omit the choice from the offered list entirely.
    Hidden,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_choice() {
        let choice: DialogueChoice =
            serde_json::from_str(r#"{"text": "Goodbye", "next": "farewell"}"#).unwrap();
        assert_eq!(choice.next, "farewell");
        assert!(choice.only_if.is_none());
        assert!(choice.illustrations.is_empty());
    }

    #[test]
    fn parses_conditioned_choice() {
        let choice: DialogueChoice = serde_json::from_str(
            r#"{
                "text": "Open the vault",
                "next": "vault",
                "only_if": {
                    "predicate": "quests:has_key",
                    "when_unavailable": {"display": "grayed_out", "message": "You need the key"}
                }
            }"#,
        )
        .unwrap();
        let cond = choice.only_if.unwrap();
        assert_eq!(cond.predicate, "quests:has_key");
        assert_eq!(cond.when_unavailable.display, UnavailableDisplay::GrayedOut);
        assert_eq!(
            cond.when_unavailable.message_or_default(),
            "You need the key"
        );
    }

    #[test]
    fn missing_message_gets_fallback() {
        let action = UnavailableAction {
            display: UnavailableDisplay::GrayedOut,
            message: None,
        };
        assert_eq!(action.message_or_default(), "Unavailable");
    }
}
