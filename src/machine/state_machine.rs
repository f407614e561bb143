//! The dialogue state machine proper

use crate::capability::{DialogueContext, PredicateRegistry};
use crate::model::text::resolve_template;
use crate::model::{
    ChoiceResult, DialogueState, DialogueTemplate, InstancedAction, UnavailableDisplay,
};
use crate::wire::ChoiceAvailabilityPatch;
use std::collections::HashMap;
use thiserror::Error;

/// Caller errors from [`DialogueStateMachine::choose`]. Both mean the display
/// sent a malformed or stale selection; neither mutates the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("displayed choice index {index} is out of range ({offered} choices offered)")]
    OutOfRange { index: usize, offered: usize },
    #[error("choice at displayed index {index} has an unsatisfied condition")]
    ConditionNotSatisfied { index: usize },
}

/// A state key that does not exist in the template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("state \"{0}\" does not exist in this dialogue")]
pub struct UnknownState(pub String);

/// One entry of the filtered, ordered choice view actually offered to the
/// participant. `raw_index` maps the entry back into the template's choice
/// list; the displayed position is the entry's index in the returned vec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableChoice {
    pub raw_index: usize,
    pub text: String,
    pub illustrations: Vec<String>,
    /// `Some` for a grayed-out unavailable choice; `None` when selectable.
    pub unavailability_message: Option<String>,
}

impl AvailableChoice {
    pub fn is_selectable(&self) -> bool {
        self.unavailability_message.is_none()
    }
}

/// The runtime engine: a current-state pointer into a (session-resolved)
/// template plus the derived availability cache.
///
/// The same type serves both sides of the client/server split: the
/// authoritative side drives [`update_conditions`](Self::update_conditions)
/// and executes fired actions through the `choose` sink, the display side
/// merges patches via [`apply_availability`](Self::apply_availability) and
/// passes a no-op sink.
#[derive(Debug)]
pub struct DialogueStateMachine {
    template_id: String,
    /// Per-session copy with display text resolved once at session start.
    template: DialogueTemplate,
    current_state_key: String,
    /// Last-known predicate result per (state key, raw choice index).
    /// Unconditioned choices never appear here.
    availability: HashMap<(String, usize), bool>,
}

impl DialogueStateMachine {
    /// Build a machine at the template's start state, resolving all display
    /// text against the session-start context.
    pub fn new(
        template_id: impl Into<String>,
        template: &DialogueTemplate,
        ctx: &DialogueContext,
    ) -> Self {
        let resolved = resolve_template(template, &ctx.facts);
        let current_state_key = resolved.start_at.clone();
        Self {
            template_id: template_id.into(),
            template: resolved,
            current_state_key,
            availability: HashMap::new(),
        }
    }

    /// Build a machine pinned at an arbitrary previously-reached state; the
    /// resumption path after a disconnect. The template was validated at load
    /// time, so only the pin itself is checked.
    pub fn resume_at(
        template_id: impl Into<String>,
        template: &DialogueTemplate,
        ctx: &DialogueContext,
        state_key: &str,
    ) -> Result<Self, UnknownState> {
        let mut machine = Self::new(template_id, template, ctx);
        machine.select_state(state_key)?;
        Ok(machine)
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn current_state_key(&self) -> &str {
        &self.current_state_key
    }

    pub fn is_unskippable(&self) -> bool {
        self.template.unskippable
    }

    /// Whether any choice anywhere in the template is conditioned. Sessions
    /// over condition-free templates are skipped by the synchronizer.
    pub fn has_conditions(&self) -> bool {
        self.template.has_conditions()
    }

    /// The template-level start action, if any. Fired once by the lifecycle
    /// manager when the session begins.
    pub fn start_action(&self) -> Option<&InstancedAction> {
        self.template.start_action.as_ref()
    }

    fn current_state(&self) -> &DialogueState {
        self.template
            .state(&self.current_state_key)
            .expect("current state key always resolves in a validated template")
    }

    pub fn current_text(&self) -> &str {
        &self.current_state().text
    }

    pub fn current_illustrations(&self) -> &[String] {
        &self.current_state().illustrations
    }

    pub fn current_result(&self) -> ChoiceResult {
        self.current_state().result
    }

    fn is_available(&self, state_key: &str, raw_index: usize) -> bool {
        // Unseen entries default to available: fail-open for display, and on
        // the authoritative side the cache is refreshed every tick before a
        // choose can observe it.
        self.availability
            .get(&(state_key.to_string(), raw_index))
            .copied()
            .unwrap_or(true)
    }

    /// The filtered, ordered view actually offered: hidden unavailable
    /// choices are omitted, grayed-out ones stay with a message. Positional
    /// indices into this list are the only indices [`choose`](Self::choose)
    /// accepts, so callers must re-fetch it for every offer.
    pub fn available_choices(&self) -> Vec<AvailableChoice> {
        let state = self.current_state();
        let mut offered = Vec::with_capacity(state.choices.len());
        for (raw_index, choice) in state.choices.iter().enumerate() {
            let available = self.is_available(&self.current_state_key, raw_index);
            let unavailability_message = match (&choice.only_if, available) {
                (_, true) | (None, false) => None,
                (Some(condition), false) => match condition.when_unavailable.display {
                    UnavailableDisplay::Hidden => continue,
                    UnavailableDisplay::GrayedOut => {
                        Some(condition.when_unavailable.message_or_default())
                    }
                },
            };
            offered.push(AvailableChoice {
                raw_index,
                text: choice.text.clone(),
                illustrations: choice.illustrations.clone(),
                unavailability_message,
            });
        }
        offered
    }

    /// Apply a participant's selection.
    ///
    /// `displayed_index` is positional within the currently offered list from
    /// [`available_choices`](Self::available_choices). On success the state
    /// pointer commits to the choice's target, then the new state's action
    /// (if any) is handed to `sink` — executed for real on the authoritative
    /// side, a no-op on display-only invocations. Returns the new state's
    /// result kind; reaching `EndDialogue` does not itself end the session,
    /// the caller owns that teardown.
    pub fn choose(
        &mut self,
        displayed_index: usize,
        sink: &mut dyn FnMut(&InstancedAction),
    ) -> Result<ChoiceResult, ChoiceError> {
        let offered = self.available_choices();
        let entry = offered
            .get(displayed_index)
            .ok_or(ChoiceError::OutOfRange {
                index: displayed_index,
                offered: offered.len(),
            })?;
        if !entry.is_selectable() {
            return Err(ChoiceError::ConditionNotSatisfied {
                index: displayed_index,
            });
        }

        let next = self
            .current_state()
            .next_state(entry.raw_index)
            .expect("raw index comes from this state's own choice list")
            .to_string();

        // Commit before the action runs: an aborting action leaves the
        // transition in place (see DESIGN.md).
        self.current_state_key = next;
        if let Some(action) = &self.current_state().action {
            sink(action);
        }
        Ok(self.current_result())
    }

    /// Pin the machine at a known state without walking an edge: resumption
    /// and display-side state corrections.
    pub fn select_state(&mut self, state_key: &str) -> Result<(), UnknownState> {
        if self.template.state(state_key).is_none() {
            return Err(UnknownState(state_key.to_string()));
        }
        self.current_state_key = state_key.to_string();
        Ok(())
    }

    /// Authoritative-side availability refresh: evaluate every conditioned
    /// choice of the *current* state (conditions elsewhere are irrelevant
    /// until reached), diff against the cache, and return only the changes.
    /// `None` means nothing changed and nothing must be sent.
    pub fn update_conditions(
        &mut self,
        predicates: &PredicateRegistry,
        ctx: &DialogueContext,
    ) -> Option<ChoiceAvailabilityPatch> {
        let state_key = self.current_state_key.clone();
        let mut patch = ChoiceAvailabilityPatch::new();
        let conditioned: Vec<(usize, String)> = self
            .current_state()
            .choices
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.only_if.as_ref().map(|cond| (i, cond.predicate.clone())))
            .collect();

        for (raw_index, predicate) in conditioned {
            let available = predicates.evaluate(&predicate, ctx);
            let cache_key = (state_key.clone(), raw_index);
            if self.availability.get(&cache_key).copied() != Some(available) {
                patch.mark_updated(&state_key, raw_index, available);
                self.availability.insert(cache_key, available);
            }
        }

        if patch.is_empty() {
            None
        } else {
            Some(patch)
        }
    }

    /// Full availability of the current state, for the baseline frame sent
    /// when a display surface (re)opens.
    pub fn availability_snapshot(&self) -> ChoiceAvailabilityPatch {
        let mut snapshot = ChoiceAvailabilityPatch::new();
        for (raw_index, choice) in self.current_state().choices.iter().enumerate() {
            if choice.only_if.is_some() {
                snapshot.mark_updated(
                    &self.current_state_key,
                    raw_index,
                    self.is_available(&self.current_state_key, raw_index),
                );
            }
        }
        snapshot
    }

    /// Display-side merge of a received patch (or baseline snapshot).
    pub fn apply_availability(&mut self, patch: &ChoiceAvailabilityPatch) {
        for (state_key, raw_index, available) in patch.entries() {
            self.availability
                .insert((state_key.to_string(), raw_index), available);
        }
    }
}
