//! Session-start text resolution
//!
//! Authored text may reference evaluation-context facts with minijinja
//! expressions (`Hello {{ participant_name }}`). The whole template is
//! resolved exactly once when a session starts; nothing is re-rendered
//! afterwards, so mid-session fact changes never alter displayed text.

use super::{DialogueChoiceCondition, DialogueState, DialogueTemplate, UnavailableAction};
use minijinja::Environment;
use serde_json::Value;

/// Render a single template string against the context facts.
///
/// Render failures (bad syntax, missing filter) fall back to the authored
/// string rather than poisoning the session; content bugs should not crash
/// the host.
pub fn resolve(text: &str, facts: &Value) -> String {
    if !text.contains("{{") && !text.contains("{%") {
        return text.to_string();
    }
    let env = Environment::new();
    match env.render_str(text, facts) {
        Ok(rendered) => rendered,
        Err(err) => {
            tracing::warn!(error = %err, "failed to render dialogue text, keeping raw string");
            text.to_string()
        }
    }
}

/// Resolve every display string of a template, producing the per-session copy
/// owned by the state machine.
pub fn resolve_template(template: &DialogueTemplate, facts: &Value) -> DialogueTemplate {
    let mut resolved = template.clone();
    for state in resolved.states.values_mut() {
        resolve_state(state, facts);
    }
    resolved
}

fn resolve_state(state: &mut DialogueState, facts: &Value) {
    state.text = resolve(&state.text, facts);
    for choice in &mut state.choices {
        choice.text = resolve(&choice.text, facts);
        if let Some(DialogueChoiceCondition {
            when_unavailable: UnavailableAction {
                message: Some(message),
                ..
            },
            ..
        }) = &mut choice.only_if
        {
            *message = resolve(message, facts);
        }
    }
}
