//! Dialogue template data model
//!
//! Templates are deserialized from authored JSON, validated once, and never
//! mutated afterwards. Everything the runtime needs is reachable from
//! [`DialogueTemplate`].

mod choice;
mod state;
mod template;
pub mod text;
pub mod validate;

pub use choice::{DialogueChoice, DialogueChoiceCondition, UnavailableAction, UnavailableDisplay};
pub use state::{ChoiceResult, DialogueState};
pub use template::{DialogueTemplate, InstancedAction};
