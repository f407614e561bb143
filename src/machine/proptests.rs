//! Property-based tests for the dialogue state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::capability::{DialogueContext, PredicateRegistry};
use crate::model::validate::{validate_structure, ValidationResult};
use crate::model::{
    ChoiceResult, DialogueChoice, DialogueChoiceCondition, DialogueState, DialogueTemplate,
    UnavailableAction, UnavailableDisplay,
};
use crate::wire::ChoiceAvailabilityPatch;
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_ctx() -> DialogueContext {
    DialogueContext::new(Uuid::new_v4(), None)
}

fn no_op() -> impl FnMut(&crate::model::InstancedAction) {
    |_| {}
}

fn state_key(i: usize) -> String {
    format!("s{i}")
}

fn plain_choice(next: &str) -> DialogueChoice {
    DialogueChoice {
        text: "choice".to_string(),
        illustrations: vec![],
        next: next.to_string(),
        only_if: None,
    }
}

fn terminal_state() -> DialogueState {
    DialogueState {
        text: "done".to_string(),
        illustrations: vec![],
        choices: vec![],
        action: None,
        result: ChoiceResult::EndDialogue,
    }
}

/// A predicate registry answering `cond{i}` from the given truth vector.
fn registry_from(availability: &[bool]) -> PredicateRegistry {
    let mut registry = PredicateRegistry::new();
    for (i, available) in availability.iter().copied().enumerate() {
        registry.register(format!("cond{i}"), move |_: &DialogueContext| available);
    }
    registry
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// One choice slot of a generated pick state: unconditioned, or conditioned
/// with a display policy.
#[derive(Debug, Clone)]
enum ChoiceShape {
    Plain,
    Conditioned { display: UnavailableDisplay },
}

fn arb_choice_shape() -> impl Strategy<Value = ChoiceShape> {
    prop_oneof![
        Just(ChoiceShape::Plain),
        Just(ChoiceShape::Conditioned {
            display: UnavailableDisplay::Hidden
        }),
        Just(ChoiceShape::Conditioned {
            display: UnavailableDisplay::GrayedOut
        }),
    ]
}

/// A linear chain of `len` states ending in a terminal state, with 1..=3
/// parallel choices on every edge. Always structurally valid by construction.
fn arb_chain_template() -> impl Strategy<Value = DialogueTemplate> {
    (1usize..6, 1usize..4).prop_map(|(hops, width)| {
        let mut states = BTreeMap::new();
        for i in 0..hops {
            let next = state_key(i + 1);
            states.insert(
                state_key(i),
                DialogueState {
                    text: format!("text {i}"),
                    illustrations: vec![],
                    choices: (0..width).map(|_| plain_choice(&next)).collect(),
                    action: None,
                    result: ChoiceResult::Default,
                },
            );
        }
        states.insert(state_key(hops), terminal_state());
        DialogueTemplate {
            start_at: state_key(0),
            unskippable: false,
            states,
            start_action: None,
        }
    })
}

/// A two-state template whose "pick" state has the generated choice shapes,
/// each conditioned slot `i` gated by predicate `cond{i}`.
fn pick_template(shapes: &[ChoiceShape]) -> DialogueTemplate {
    let choices = shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| {
            let only_if = match shape {
                ChoiceShape::Plain => None,
                ChoiceShape::Conditioned { display } => Some(DialogueChoiceCondition {
                    predicate: format!("cond{i}"),
                    when_unavailable: UnavailableAction {
                        display: *display,
                        message: None,
                    },
                }),
            };
            DialogueChoice {
                text: format!("choice {i}"),
                illustrations: vec![],
                next: "end".to_string(),
                only_if,
            }
        })
        .collect();

    let mut states = BTreeMap::new();
    states.insert(
        "pick".to_string(),
        DialogueState {
            text: "pick one".to_string(),
            illustrations: vec![],
            choices,
            action: None,
            result: ChoiceResult::Default,
        },
    );
    states.insert("end".to_string(), terminal_state());
    DialogueTemplate {
        start_at: "pick".to_string(),
        unskippable: false,
        states,
        start_action: None,
    }
}

fn arb_pick_setup() -> impl Strategy<Value = (Vec<ChoiceShape>, Vec<bool>)> {
    (1usize..8)
        .prop_flat_map(|n| {
            (
                proptest::collection::vec(arb_choice_shape(), n),
                proptest::collection::vec(any::<bool>(), n),
            )
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Generated chains are valid and fully walkable to the terminal state.
    #[test]
    fn prop_chain_templates_validate_and_walk(template in arb_chain_template()) {
        prop_assert!(!validate_structure(&template).is_rejected());

        let mut machine = DialogueStateMachine::new("t", &template, &test_ctx());
        let mut hops = 0usize;
        while machine.current_result() != ChoiceResult::EndDialogue {
            prop_assert!(machine.choose(0, &mut no_op()).is_ok());
            hops += 1;
            prop_assert!(hops <= template.states.len(), "walk did not terminate");
        }
        prop_assert!(machine.available_choices().is_empty());
    }

    // Pointing any choice at a missing state is always a fatal defect.
    #[test]
    fn prop_dangling_reference_rejected(
        template in arb_chain_template(),
        hop in 0usize..5,
        slot in 0usize..3,
    ) {
        let mut template = template;
        let key = state_key(hop % (template.states.len() - 1));
        let state = template.states.get_mut(&key).unwrap();
        let slot = slot % state.choices.len();
        state.choices[slot].next = "nowhere".to_string();

        prop_assert!(matches!(
            validate_structure(&template),
            ValidationResult::Error(_)
        ));
    }

    // The offered list never contains a hidden unavailable choice, keeps raw
    // indices strictly increasing, and marks exactly the grayed-out
    // unavailable entries unselectable.
    #[test]
    fn prop_offered_view_respects_display_policy((shapes, truth) in arb_pick_setup()) {
        let template = pick_template(&shapes);
        prop_assert!(!validate_structure(&template).is_rejected());

        let mut machine = DialogueStateMachine::new("t", &template, &test_ctx());
        machine.update_conditions(&registry_from(&truth), &test_ctx());

        let offered = machine.available_choices();
        let mut last_raw = None;
        for entry in &offered {
            if let Some(prev) = last_raw {
                prop_assert!(entry.raw_index > prev);
            }
            last_raw = Some(entry.raw_index);

            match &shapes[entry.raw_index] {
                ChoiceShape::Plain => prop_assert!(entry.is_selectable()),
                ChoiceShape::Conditioned { display } => {
                    if truth[entry.raw_index] {
                        prop_assert!(entry.is_selectable());
                    } else {
                        prop_assert_eq!(*display, UnavailableDisplay::GrayedOut);
                        prop_assert!(!entry.is_selectable());
                    }
                }
            }
        }

        // Every omitted raw index is a hidden unavailable choice.
        let offered_raw: Vec<usize> = offered.iter().map(|e| e.raw_index).collect();
        for (raw, shape) in shapes.iter().enumerate() {
            if !offered_raw.contains(&raw) {
                let hidden = matches!(
                    shape,
                    ChoiceShape::Conditioned {
                        display: UnavailableDisplay::Hidden
                    }
                );
                prop_assert!(hidden, "omitted raw index {} was not a hidden choice", raw);
                prop_assert!(!truth[raw]);
            }
        }
    }

    // Choosing a selectable displayed index commits; anything else leaves the
    // machine exactly where it was.
    #[test]
    fn prop_choose_commits_or_leaves_untouched(
        (shapes, truth) in arb_pick_setup(),
        index in 0usize..10,
    ) {
        let template = pick_template(&shapes);
        let mut machine = DialogueStateMachine::new("t", &template, &test_ctx());
        machine.update_conditions(&registry_from(&truth), &test_ctx());

        let offered = machine.available_choices();
        let selectable = offered.get(index).is_some_and(AvailableChoice::is_selectable);

        match machine.choose(index, &mut no_op()) {
            Ok(result) => {
                prop_assert!(selectable);
                prop_assert_eq!(result, ChoiceResult::EndDialogue);
                prop_assert_eq!(machine.current_state_key(), "end");
            }
            Err(ChoiceError::OutOfRange { index: i, offered: n }) => {
                prop_assert_eq!(i, index);
                prop_assert_eq!(n, offered.len());
                prop_assert!(index >= offered.len());
                prop_assert_eq!(machine.current_state_key(), "pick");
            }
            Err(ChoiceError::ConditionNotSatisfied { index: i }) => {
                prop_assert_eq!(i, index);
                prop_assert!(!selectable && index < offered.len());
                prop_assert_eq!(machine.current_state_key(), "pick");
            }
        }
    }

    // Refreshing against an unchanged world never produces a patch, and a
    // flip produces exactly the flipped entries.
    #[test]
    fn prop_patches_carry_only_changes(
        (shapes, truth) in arb_pick_setup(),
        flips in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let template = pick_template(&shapes);
        let mut machine = DialogueStateMachine::new("t", &template, &test_ctx());

        machine.update_conditions(&registry_from(&truth), &test_ctx());
        prop_assert!(machine.update_conditions(&registry_from(&truth), &test_ctx()).is_none());

        let flipped: Vec<bool> = truth
            .iter()
            .enumerate()
            .map(|(i, v)| v ^ flips.get(i).copied().unwrap_or(false))
            .collect();
        let patch = machine.update_conditions(&registry_from(&flipped), &test_ctx());

        let expected: Vec<(usize, bool)> = shapes
            .iter()
            .enumerate()
            .filter(|(i, shape)| {
                matches!(shape, ChoiceShape::Conditioned { .. }) && truth[*i] != flipped[*i]
            })
            .map(|(i, _)| (i, flipped[i]))
            .collect();

        match patch {
            None => prop_assert!(expected.is_empty()),
            Some(patch) => {
                let entries: Vec<(usize, bool)> = patch
                    .entries()
                    .map(|(state, raw, available)| {
                        prop_assert_eq!(state, "pick");
                        Ok((raw, available))
                    })
                    .collect::<Result<_, _>>()?;
                prop_assert_eq!(entries, expected);
            }
        }
    }

    // A display machine fed the baseline snapshot plus every patch offers the
    // same view as the authoritative machine.
    #[test]
    fn prop_display_converges_on_authoritative_view(
        (shapes, truth) in arb_pick_setup(),
        later in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let template = pick_template(&shapes);
        let mut server = DialogueStateMachine::new("t", &template, &test_ctx());
        let mut display = DialogueStateMachine::new("t", &template, &test_ctx());

        server.update_conditions(&registry_from(&truth), &test_ctx());
        display.apply_availability(&server.availability_snapshot());

        let later: Vec<bool> = (0..truth.len())
            .map(|i| later.get(i).copied().unwrap_or(truth[i]))
            .collect();
        if let Some(patch) = server.update_conditions(&registry_from(&later), &test_ctx()) {
            display.apply_availability(&patch);
        }

        prop_assert_eq!(display.available_choices(), server.available_choices());
    }

    // Wire roundtrip: a patch survives serialization bit-for-bit.
    #[test]
    fn prop_patch_roundtrips_through_json(
        entries in proptest::collection::vec(("s[0-9]", 0usize..16, any::<bool>()), 0..12),
    ) {
        let mut patch = ChoiceAvailabilityPatch::new();
        for (state, raw, available) in &entries {
            patch.mark_updated(state, *raw, *available);
        }
        let json = serde_json::to_string(&patch).unwrap();
        let back: ChoiceAvailabilityPatch = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, patch);
    }
}
