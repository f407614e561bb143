//! Structural validation of dialogue templates
//!
//! Runs purely over the graph before a template is ever allowed to back a
//! session. No predicate or action is evaluated here.

use super::{ChoiceResult, DialogueTemplate};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

/// Fatal structural defects. Any of these rejects the template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("start state \"{0}\" does not exist")]
    MissingStartState(String),
    #[error("choice {choice_index} of state \"{state}\" points to nonexistent state \"{next}\"")]
    DanglingChoice {
        state: String,
        choice_index: usize,
        next: String,
    },
    #[error("confirmation state \"{state}\" must have exactly 2 choices, found {count}")]
    ConfirmationChoiceCount { state: String, count: usize },
    #[error("state \"{0}\" has no choice and does not end the dialogue (participant would be stuck)")]
    NoChoice(String),
}

/// Suspicious but legal authoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// State exists in the template but no path from start reaches it.
    Unreachable(String),
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::Unreachable(state) => {
                write!(f, "state \"{state}\" is unreachable from the start state")
            }
        }
    }
}

/// Verdict of [`validate_structure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Pass,
    /// Template may be activated, but the warnings must reach the operator.
    Warnings(Vec<ValidationWarning>),
    Error(ValidationError),
}

impl ValidationResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ValidationResult::Error(_))
    }
}

/// Statically check a template's graph.
///
/// Rules:
/// - the start state must exist;
/// - every choice target must resolve (dangling references are fatal);
/// - confirmation states carry exactly two choices;
/// - zero-choice states must end the dialogue;
/// - unreachable states are flagged as warnings, never errors.
#[must_use]
pub fn validate_structure(template: &DialogueTemplate) -> ValidationResult {
    if !template.states.contains_key(&template.start_at) {
        return ValidationResult::Error(ValidationError::MissingStartState(
            template.start_at.clone(),
        ));
    }

    for (key, state) in &template.states {
        if state.result == ChoiceResult::AskConfirmation && state.choices.len() != 2 {
            return ValidationResult::Error(ValidationError::ConfirmationChoiceCount {
                state: key.clone(),
                count: state.choices.len(),
            });
        }
        if state.choices.is_empty() && !state.result.is_terminal() {
            return ValidationResult::Error(ValidationError::NoChoice(key.clone()));
        }
        for (choice_index, choice) in state.choices.iter().enumerate() {
            if !template.states.contains_key(&choice.next) {
                return ValidationResult::Error(ValidationError::DanglingChoice {
                    state: key.clone(),
                    choice_index,
                    next: choice.next.clone(),
                });
            }
        }
    }

    // Breadth-first walk over choice edges. Every edge target was verified
    // above, so the lookups cannot miss.
    let mut reachable: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    reachable.insert(&template.start_at);
    queue.push_back(&template.start_at);

    while let Some(key) = queue.pop_front() {
        let Some(state) = template.state(key) else {
            continue;
        };
        for choice in &state.choices {
            if let Some((next_key, _)) = template.states.get_key_value(choice.next.as_str()) {
                if reachable.insert(next_key) {
                    queue.push_back(next_key);
                }
            }
        }
    }

    let warnings: Vec<ValidationWarning> = template
        .states
        .keys()
        .filter(|key| !reachable.contains(key.as_str()))
        .map(|key| ValidationWarning::Unreachable(key.clone()))
        .collect();

    if warnings.is_empty() {
        ValidationResult::Pass
    } else {
        ValidationResult::Warnings(warnings)
    }
}
