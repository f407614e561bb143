//! Opaque capabilities: actions, predicates, and their registries
//!
//! The core never interprets what an action does or what a predicate means;
//! it only depends on the capability shapes `execute(context)` and
//! `evaluate(context) -> bool`. Concrete capabilities are registered at
//! startup and the registries are injected wherever they are needed — there
//! is no ambient global state.

use crate::model::InstancedAction;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Everything conditions and actions may consult: the participant, the
/// optional conversation partner, and a bag of host-supplied facts.
///
/// Built fresh by an external collaborator on every evaluation pass; the core
/// never caches one across ticks.
#[derive(Debug, Clone)]
pub struct DialogueContext {
    pub participant: Uuid,
    pub partner: Option<Uuid>,
    /// Arbitrary world/participant facts, also fed to session-start text
    /// resolution.
    pub facts: Value,
}

impl DialogueContext {
    pub fn new(participant: Uuid, partner: Option<Uuid>) -> Self {
        Self {
            participant,
            partner,
            facts: Value::Null,
        }
    }

    pub fn with_facts(mut self, facts: Value) -> Self {
        self.facts = facts;
        self
    }
}

/// A side effect fired when a dialogue state is reached.
pub trait DialogueAction: Send + Sync {
    fn execute(&self, ctx: &DialogueContext);
}

impl<F> DialogueAction for F
where
    F: Fn(&DialogueContext) + Send + Sync,
{
    fn execute(&self, ctx: &DialogueContext) {
        self(ctx);
    }
}

/// A choice-availability predicate, evaluated only on the authoritative side.
pub trait ChoicePredicate: Send + Sync {
    fn evaluate(&self, ctx: &DialogueContext) -> bool;
}

impl<F> ChoicePredicate for F
where
    F: Fn(&DialogueContext) -> bool + Send + Sync,
{
    fn evaluate(&self, ctx: &DialogueContext) -> bool {
        self(ctx)
    }
}

/// Errors from instantiating a registered action.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("unknown action type \"{0}\"")]
    UnknownActionKind(String),
    #[error("invalid parameters for action type \"{kind}\": {reason}")]
    InvalidParams { kind: String, reason: String },
}

/// Builds an executable action from the opaque `params` payload.
type ActionFactory =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn DialogueAction>, CapabilityError> + Send + Sync>;

/// Maps stable action type identifiers to deserialization + execution
/// functions. Populated once at startup, read-only afterwards.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an action type identifier.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn DialogueAction>, CapabilityError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Register an action type that ignores its parameters.
    pub fn register_simple<A>(&mut self, kind: impl Into<String>, action: A)
    where
        A: DialogueAction + 'static,
    {
        let action: Arc<dyn DialogueAction> = Arc::new(action);
        self.register(kind, move |_| Ok(action.clone()));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Instantiate an authored action payload.
    pub fn instantiate(
        &self,
        action: &InstancedAction,
    ) -> Result<Arc<dyn DialogueAction>, CapabilityError> {
        let factory = self
            .factories
            .get(&action.kind)
            .ok_or_else(|| CapabilityError::UnknownActionKind(action.kind.clone()))?;
        factory(&action.params)
    }
}

/// Maps predicate identifiers (as referenced by choice conditions) to
/// predicates. Populated once at startup, read-only afterwards.
#[derive(Default, Clone)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<dyn ChoicePredicate>>,
}

impl PredicateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, id: impl Into<String>, predicate: P)
    where
        P: ChoicePredicate + 'static,
    {
        self.predicates.insert(id.into(), Arc::new(predicate));
    }

    /// Evaluate a predicate by id. Unknown ids are unavailable: the
    /// authoritative side fails closed, unlike the display side which
    /// defaults unseen entries to available.
    pub fn evaluate(&self, id: &str, ctx: &DialogueContext) -> bool {
        match self.predicates.get(id) {
            Some(predicate) => predicate.evaluate(ctx),
            None => {
                tracing::warn!(predicate = %id, "unknown predicate referenced by dialogue, treating as unavailable");
                false
            }
        }
    }
}
