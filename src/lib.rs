//! Palaver — server-authoritative branching dialogue engine.
//!
//! A dialogue is authored as an immutable template (a directed graph of
//! states and choices), validated structurally at load time, then walked by a
//! per-participant state machine. Choice availability is re-evaluated on the
//! authoritative side every tick and replicated to the passive display side
//! as minimal patches. Sessions survive disconnects through a three-field
//! snapshot and a bounded resumption retry.
//!
//! Rendering, input handling, permission checks and the byte transport are
//! external collaborators; this crate only defines the traits they plug into.

pub mod capability;
pub mod lifecycle;
pub mod loader;
pub mod machine;
pub mod model;
pub mod registry;
pub mod wire;

pub use capability::{ActionRegistry, DialogueAction, DialogueContext, PredicateRegistry};
pub use lifecycle::DialogueTracker;
pub use machine::{AvailableChoice, ChoiceError, DialogueStateMachine};
pub use model::{ChoiceResult, DialogueTemplate};
pub use registry::DialogueRegistry;
