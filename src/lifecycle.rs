//! Per-participant session lifecycle
//!
//! [`DialogueTracker`] owns at most one running state machine per
//! participant, persists the minimal snapshot across disconnects, retries
//! resumption for a bounded window, and drives the availability synchronizer
//! every tick. Collaborators (display transport, context construction,
//! partner resolution, action execution) are injected as traits; the host's
//! single-threaded tick drives everything, so no internal locking exists.

use crate::capability::{ActionRegistry, DialogueContext, PredicateRegistry};
use crate::machine::{DialogueStateMachine, UnknownState};
use crate::model::{ChoiceResult, InstancedAction};
use crate::registry::DialogueRegistry;
use crate::wire::{ChoiceAvailabilityPatch, InitialSnapshot, StateCorrection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// How many ticks a pending resumption waits for its partner to be loaded
/// before the session is silently dropped.
pub const MAX_RESUME_ATTEMPTS: u32 = 200;

/// Moves wire messages to this participant's display surface and tracks
/// whether that surface is the active one. The transport is assumed
/// reliable, ordered, at-most-once per session.
pub trait DialogueTransport {
    fn open_surface(&mut self, snapshot: InitialSnapshot);
    fn close_surface(&mut self);
    fn surface_open(&self) -> bool;
    fn send_patch(&mut self, patch: &ChoiceAvailabilityPatch);
    fn send_correction(&mut self, correction: &StateCorrection);
}

/// Builds the evaluation context (participant/world facts) consumed by
/// predicates, actions, and session-start text resolution. Rebuilt fresh for
/// every evaluation pass.
pub trait ContextSource {
    fn build_context(&self, participant: Uuid, partner: Option<Uuid>) -> DialogueContext;
}

/// Answers whether a persisted partner reference is resolvable yet.
pub trait PartnerResolver {
    fn is_loaded(&self, partner: Uuid) -> bool;
}

/// A session change requested by an executed action. Actions run outside the
/// tracker, so instead of calling back mid-unwind they return a request the
/// tracker applies once `choose` has fully returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueRequest {
    Start {
        template_id: String,
        partner: Option<Uuid>,
    },
    End,
}

/// Executes fired actions on the authoritative side. Display-only hosts use
/// [`NoopActionExecutor`].
pub trait ActionExecutor {
    /// Errors are reported as strings: the triggering transition has already
    /// committed, so there is nothing for the tracker to unwind.
    fn execute(
        &mut self,
        action: &InstancedAction,
        ctx: &DialogueContext,
    ) -> Result<Option<DialogueRequest>, String>;
}

/// Instantiates actions through an [`ActionRegistry`] and runs them.
pub struct RegistryActionExecutor {
    actions: ActionRegistry,
}

impl RegistryActionExecutor {
    #[must_use]
    pub fn new(actions: ActionRegistry) -> Self {
        Self { actions }
    }
}

impl ActionExecutor for RegistryActionExecutor {
    fn execute(
        &mut self,
        action: &InstancedAction,
        ctx: &DialogueContext,
    ) -> Result<Option<DialogueRequest>, String> {
        let instance = self.actions.instantiate(action).map_err(|e| e.to_string())?;
        instance.execute(ctx);
        Ok(None)
    }
}

/// Swallows every action; the display-side sink.
#[derive(Default)]
pub struct NoopActionExecutor;

impl ActionExecutor for NoopActionExecutor {
    fn execute(
        &mut self,
        _action: &InstancedAction,
        _ctx: &DialogueContext,
    ) -> Result<Option<DialogueRequest>, String> {
        Ok(None)
    }
}

/// The minimal durable state: enough to rebuild a session after a
/// disconnect, nothing more. Written whenever the participant's durable
/// owner serializes, handed back through [`DialogueTracker::restore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueSnapshot {
    pub current_dialogue_id: String,
    pub current_dialogue_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("unknown dialogue \"{0}\"")]
    UnknownTemplate(String),
}

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("unknown dialogue \"{0}\"")]
    UnknownTemplate(String),
    #[error(transparent)]
    UnknownState(#[from] UnknownState),
}

struct ActiveSession {
    machine: DialogueStateMachine,
    partner: Option<Uuid>,
}

/// One per participant, for the participant's whole lifetime (it survives
/// reconnects; only its sessions come and go).
pub struct DialogueTracker {
    participant: Uuid,
    registry: DialogueRegistry,
    predicates: PredicateRegistry,
    current: Option<ActiveSession>,
    pending_resume: Option<DialogueSnapshot>,
    resume_attempts: u32,
}

impl DialogueTracker {
    #[must_use]
    pub fn new(
        participant: Uuid,
        registry: DialogueRegistry,
        predicates: PredicateRegistry,
    ) -> Self {
        Self {
            participant,
            registry,
            predicates,
            current: None,
            pending_resume: None,
            resume_attempts: 0,
        }
    }

    pub fn participant(&self) -> Uuid {
        self.participant
    }

    pub fn has_active_session(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_dialogue(&self) -> Option<&DialogueStateMachine> {
        self.current.as_ref().map(|s| &s.machine)
    }

    /// Start a dialogue at its template start state. Replaces any running
    /// session. The template-level start action fires before the surface
    /// opens and may itself redirect or end the session.
    pub fn start(
        &mut self,
        template_id: &str,
        partner: Option<Uuid>,
        ctx_source: &dyn ContextSource,
        transport: &mut dyn DialogueTransport,
        executor: &mut dyn ActionExecutor,
    ) -> Result<(), StartError> {
        let template = self
            .registry
            .get(template_id)
            .ok_or_else(|| StartError::UnknownTemplate(template_id.to_string()))?;

        // An explicit start supersedes any resumption still parked from a
        // previous connection; a later tick must not roll the session back.
        self.pending_resume = None;
        self.resume_attempts = 0;

        let ctx = ctx_source.build_context(self.participant, partner);
        let machine = DialogueStateMachine::new(template_id, &template, &ctx);
        let start_action = machine.start_action().cloned();
        self.current = Some(ActiveSession { machine, partner });

        if let Some(action) = start_action {
            match executor.execute(&action, &ctx) {
                Ok(Some(request)) => {
                    self.apply_request(request, ctx_source, transport, executor);
                    return Ok(());
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(
                        participant = %self.participant,
                        dialogue = %template_id,
                        %error,
                        "dialogue start action failed"
                    );
                }
            }
        }

        self.activate(ctx_source, transport);
        Ok(())
    }

    /// Drop the running session, discard any parked resumption, and close the
    /// surface. Unconditionally safe, idempotent, legal at any point
    /// including mid-transition.
    pub fn end(&mut self, transport: &mut dyn DialogueTransport) {
        self.pending_resume = None;
        self.resume_attempts = 0;
        let had_session = self.current.take().is_some();
        if had_session && transport.surface_open() {
            transport.close_surface();
        }
    }

    /// Rebuild a session pinned at a previously-reached state after a
    /// reconnect. The template was validated at load time; only the pin is
    /// checked.
    pub fn resume(
        &mut self,
        template_id: &str,
        state_key: &str,
        partner: Option<Uuid>,
        ctx_source: &dyn ContextSource,
        transport: &mut dyn DialogueTransport,
    ) -> Result<(), ResumeError> {
        let template = self
            .registry
            .get(template_id)
            .ok_or_else(|| ResumeError::UnknownTemplate(template_id.to_string()))?;

        let ctx = ctx_source.build_context(self.participant, partner);
        let machine = DialogueStateMachine::resume_at(template_id, &template, &ctx, state_key)?;
        self.current = Some(ActiveSession { machine, partner });
        self.activate(ctx_source, transport);
        Ok(())
    }

    /// The persisted view of the running session, if any.
    pub fn snapshot(&self) -> Option<DialogueSnapshot> {
        self.current.as_ref().map(|session| DialogueSnapshot {
            current_dialogue_id: session.machine.template_id().to_string(),
            current_dialogue_state: session.machine.current_state_key().to_string(),
            partner: session.partner,
        })
    }

    /// Park a previously persisted snapshot for resumption on a later tick
    /// (once the referenced partner, if any, is loaded again).
    pub fn restore(&mut self, snapshot: DialogueSnapshot) {
        self.pending_resume = Some(snapshot);
    }

    /// Drive one tick: pending resumption, surface policy, availability sync.
    pub fn tick(
        &mut self,
        ctx_source: &dyn ContextSource,
        resolver: &dyn PartnerResolver,
        transport: &mut dyn DialogueTransport,
    ) {
        // The counter only accumulates while a resume is actually pending.
        if self.pending_resume.is_none() {
            self.resume_attempts = 0;
        }
        self.tick_pending_resume(ctx_source, resolver, transport);
        self.tick_surface(ctx_source, transport);
        self.tick_sync(ctx_source, transport);
    }

    fn tick_pending_resume(
        &mut self,
        ctx_source: &dyn ContextSource,
        resolver: &dyn PartnerResolver,
        transport: &mut dyn DialogueTransport,
    ) {
        let Some(snapshot) = self.pending_resume.take() else {
            return;
        };

        let partner_ready = snapshot.partner.map_or(true, |p| resolver.is_loaded(p));
        if !partner_ready {
            self.resume_attempts += 1;
            if self.resume_attempts >= MAX_RESUME_ATTEMPTS {
                tracing::debug!(
                    participant = %self.participant,
                    dialogue = %snapshot.current_dialogue_id,
                    "gave up resuming dialogue, partner never loaded"
                );
            } else {
                self.pending_resume = Some(snapshot);
            }
            return;
        }

        if let Err(error) = self.resume(
            &snapshot.current_dialogue_id,
            &snapshot.current_dialogue_state,
            snapshot.partner,
            ctx_source,
            transport,
        ) {
            // Content may have changed since the snapshot was written.
            tracing::warn!(
                participant = %self.participant,
                dialogue = %snapshot.current_dialogue_id,
                %error,
                "could not resume persisted dialogue"
            );
        }
    }

    fn tick_surface(
        &mut self,
        ctx_source: &dyn ContextSource,
        transport: &mut dyn DialogueTransport,
    ) {
        let Some(session) = &self.current else {
            return;
        };
        if transport.surface_open() {
            return;
        }

        let must_reopen =
            session.machine.is_unskippable() && !session.machine.current_result().is_terminal();
        if must_reopen {
            // The conversation cannot be dismissed; force it back up.
            self.activate(ctx_source, transport);
        } else {
            self.end(transport);
        }
    }

    fn tick_sync(&mut self, ctx_source: &dyn ContextSource, transport: &mut dyn DialogueTransport) {
        let Some(session) = &mut self.current else {
            return;
        };
        if !session.machine.has_conditions() {
            return;
        }
        let ctx = ctx_source.build_context(self.participant, session.partner);
        if let Some(patch) = session.machine.update_conditions(&self.predicates, &ctx) {
            transport.send_patch(&patch);
        }
    }

    /// Apply a participant's selection, the protocol entry point.
    ///
    /// Rejections are caller errors: logged with full session identity and
    /// answered with a state correction so the display can resynchronize.
    /// On success the fired action (if any) runs through `executor`; a
    /// returned [`DialogueRequest`] replaces or ends the session, otherwise
    /// reaching `EndDialogue` tears it down here.
    pub fn handle_choice(
        &mut self,
        displayed_index: usize,
        ctx_source: &dyn ContextSource,
        transport: &mut dyn DialogueTransport,
        executor: &mut dyn ActionExecutor,
    ) {
        let Some(session) = &mut self.current else {
            tracing::warn!(
                participant = %self.participant,
                index = displayed_index,
                "dialogue choice received without an active session"
            );
            return;
        };

        let ctx = ctx_source.build_context(self.participant, session.partner);
        let mut fired: Option<InstancedAction> = None;
        let outcome = session
            .machine
            .choose(displayed_index, &mut |action| fired = Some(action.clone()));

        let (result, template_id) = match outcome {
            Ok(result) => (result, session.machine.template_id().to_string()),
            Err(error) => {
                tracing::warn!(
                    participant = %self.participant,
                    dialogue = %session.machine.template_id(),
                    state = %session.machine.current_state_key(),
                    index = displayed_index,
                    %error,
                    "rejected dialogue choice"
                );
                let correction = StateCorrection {
                    state_key: session.machine.current_state_key().to_string(),
                };
                transport.send_correction(&correction);
                return;
            }
        };

        let mut request = None;
        if let Some(action) = fired {
            match executor.execute(&action, &ctx) {
                Ok(directive) => request = directive,
                Err(error) => {
                    // The transition has already committed; log and move on.
                    tracing::error!(
                        participant = %self.participant,
                        dialogue = %template_id,
                        %error,
                        "dialogue action failed after committed transition"
                    );
                }
            }
        }

        if let Some(request) = request {
            self.apply_request(request, ctx_source, transport, executor);
        } else if result == ChoiceResult::EndDialogue {
            self.end(transport);
        }
    }

    fn apply_request(
        &mut self,
        request: DialogueRequest,
        ctx_source: &dyn ContextSource,
        transport: &mut dyn DialogueTransport,
        executor: &mut dyn ActionExecutor,
    ) {
        match request {
            DialogueRequest::Start {
                template_id,
                partner,
            } => {
                if let Err(error) =
                    self.start(&template_id, partner, ctx_source, transport, executor)
                {
                    tracing::error!(
                        participant = %self.participant,
                        dialogue = %template_id,
                        %error,
                        "action-requested dialogue could not start"
                    );
                    self.end(transport);
                }
            }
            DialogueRequest::End => self.end(transport),
        }
    }

    /// Evaluate conditions once and (re)open the surface with the full
    /// availability baseline; patches are meaningless before this frame.
    fn activate(&mut self, ctx_source: &dyn ContextSource, transport: &mut dyn DialogueTransport) {
        let Some(session) = &mut self.current else {
            return;
        };
        if session.machine.has_conditions() {
            let ctx = ctx_source.build_context(self.participant, session.partner);
            session.machine.update_conditions(&self.predicates, &ctx);
        }
        transport.open_surface(InitialSnapshot {
            template_id: session.machine.template_id().to_string(),
            current_state_key: session.machine.current_state_key().to_string(),
            partner: session.partner,
            availability: session.machine.availability_snapshot(),
        });
    }
}
