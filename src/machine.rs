//! Runtime dialogue state machine
//!
//! One machine per running session. The only mutation entry points are
//! [`DialogueStateMachine::choose`] (participant input) and the availability
//! refresh driven by the lifecycle tick.

mod state_machine;

#[cfg(test)]
mod proptests;

pub use state_machine::{AvailableChoice, ChoiceError, DialogueStateMachine, UnknownState};
