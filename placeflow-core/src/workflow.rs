//! Workflow engine - evaluates and fires transitions for subjects.
//!
//! A [`Workflow`] pairs a [`Definition`] with a [`MarkingStore`] and an
//! [`EventDispatcher`]. Every call reads the subject's marking through the
//! store, placing the subject in the initial places the first time it is seen.
//!
//! Applying a transition runs a fixed pipeline per approved candidate:
//! leave, transition, enter, persist, entered, completed, announce.

use crate::blocker::{TransitionBlocker, TransitionBlockerList};
use crate::definition::Definition;
use crate::error::CoreError;
use crate::event::{Channel, EventDispatcher, EventKind, GuardEvent, Scope, WorkflowEvent};
use crate::marking::Marking;
use crate::metadata::MetadataStore;
use crate::store::{MarkingStore, Subject};
use crate::transition::Transition;
use crate::validator::{DefinitionValidator, StateMachineValidator, WorkflowValidator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Flavor of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Any number of places may be active at once.
    #[default]
    Workflow,
    /// Exactly one place is active at a time.
    StateMachine,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Workflow => "workflow",
            WorkflowKind::StateMachine => "state_machine",
        }
    }

    /// The validator matching this flavor. `single_place` only affects workflows.
    pub fn validator(&self, single_place: bool) -> Box<dyn DefinitionValidator> {
        match self {
            WorkflowKind::Workflow => Box::new(WorkflowValidator::new(single_place)),
            WorkflowKind::StateMachine => Box::new(StateMachineValidator),
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which lifecycle notifications a workflow publishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    #[default]
    All,
    Nothing,
    Only(Vec<EventKind>),
}

impl DispatchPolicy {
    /// `None` publishes everything, an empty list publishes nothing.
    pub fn from_events(events: Option<Vec<EventKind>>) -> Self {
        match events {
            None => DispatchPolicy::All,
            Some(events) if events.is_empty() => DispatchPolicy::Nothing,
            Some(events) => DispatchPolicy::Only(events),
        }
    }

    pub fn allows(&self, kind: EventKind) -> bool {
        match self {
            DispatchPolicy::All => true,
            DispatchPolicy::Nothing => false,
            DispatchPolicy::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// Lifecycle notifications suppressed for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisabledEvents {
    pub leave: bool,
    pub transition: bool,
    pub enter: bool,
    pub entered: bool,
    pub completed: bool,
    pub announce: bool,
}

impl DisabledEvents {
    pub fn all() -> Self {
        Self {
            leave: true,
            transition: true,
            enter: true,
            entered: true,
            completed: true,
            announce: true,
        }
    }

    pub fn is_disabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Leave => self.leave,
            EventKind::Transition => self.transition,
            EventKind::Enter => self.enter,
            EventKind::Entered => self.entered,
            EventKind::Completed => self.completed,
            EventKind::Announce => self.announce,
        }
    }

    pub fn disable(&mut self, kind: EventKind) {
        match kind {
            EventKind::Leave => self.leave = true,
            EventKind::Transition => self.transition = true,
            EventKind::Enter => self.enter = true,
            EventKind::Entered => self.entered = true,
            EventKind::Completed => self.completed = true,
            EventKind::Announce => self.announce = true,
        }
    }
}

/// Per-call options for [`Workflow::apply_with`] and [`Workflow::get_marking_with`].
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    /// Context handed to listeners and the marking store.
    pub context: Option<Value>,
    pub disabled: DisabledEvents,
}

impl TransitionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn without(mut self, kind: EventKind) -> Self {
        self.disabled.disable(kind);
        self
    }
}

/// A named workflow bound to a marking store and a dispatcher.
pub struct Workflow<S> {
    name: String,
    kind: WorkflowKind,
    definition: Definition,
    store: Arc<dyn MarkingStore<S>>,
    dispatcher: Arc<EventDispatcher<S>>,
    policy: DispatchPolicy,
}

impl<S: Subject> Workflow<S> {
    /// Creates a workflow with its own dispatcher that publishes every notification.
    pub fn new(
        definition: Definition,
        store: Arc<dyn MarkingStore<S>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: WorkflowKind::Workflow,
            definition,
            store,
            dispatcher: Arc::new(EventDispatcher::new()),
            policy: DispatchPolicy::All,
        }
    }

    /// Creates a workflow of kind [`WorkflowKind::StateMachine`].
    pub fn state_machine(
        definition: Definition,
        store: Arc<dyn MarkingStore<S>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: WorkflowKind::StateMachine,
            ..Self::new(definition, store, name)
        }
    }

    /// Attaches a dispatcher, possibly shared with other workflows.
    pub fn with_dispatcher(mut self, dispatcher: Arc<EventDispatcher<S>>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn marking_store(&self) -> &Arc<dyn MarkingStore<S>> {
        &self.store
    }

    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        self.definition.metadata_store()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher<S>> {
        &self.dispatcher
    }

    pub fn dispatch_policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Returns the subject's marking, placing it in the initial places if empty.
    pub fn get_marking(&self, subject: &mut S) -> Result<Marking, CoreError> {
        self.get_marking_with(subject, &TransitionOptions::default())
    }

    /// Like [`Workflow::get_marking`]. The options supply the context of the
    /// initial entered notification and may suppress it.
    pub fn get_marking_with(
        &self,
        subject: &mut S,
        options: &TransitionOptions,
    ) -> Result<Marking, CoreError> {
        let mut marking = self.store.get_marking(subject)?;

        if marking.is_empty() {
            let initial = self.definition.initial_places();
            if initial.is_empty() {
                return Err(CoreError::logic(format!(
                    "the marking of subject '{}' in workflow '{}' is empty and there is no initial place",
                    subject.subject_id(),
                    self.name
                )));
            }

            for place in initial {
                marking.mark(place);
            }

            let mut context = options
                .context
                .clone()
                .unwrap_or_else(|| json!({"initial": true}));
            self.store.set_marking(subject, &marking, &context)?;

            tracing::debug!(
                "subject {} entered workflow {} at [{}]",
                subject.subject_id(),
                self.name,
                initial.join(", ")
            );

            self.emit(
                EventKind::Entered,
                options,
                subject,
                &marking,
                None,
                || marking.places().collect(),
                &mut context,
            );
        }

        if let Some(place) = marking.places().find(|p| !self.definition.has_place(p)) {
            tracing::warn!(
                "subject {} has place {} unknown to workflow {}",
                subject.subject_id(),
                place,
                self.name
            );
            return Err(CoreError::logic(format!(
                "place '{}' is not valid for workflow '{}'",
                place, self.name
            )));
        }

        Ok(marking)
    }

    /// Whether some transition named `name` is enabled for the subject.
    ///
    /// Returns false for names the definition does not know.
    pub fn can(&self, subject: &mut S, name: &str) -> Result<bool, CoreError> {
        let marking = self.get_marking(subject)?;
        let subject: &S = subject;

        Ok(self
            .definition
            .transitions_named(name)
            .any(|t| self.blockers_for(subject, &marking, t).is_empty()))
    }

    /// Explains why the transition named `name` cannot fire.
    ///
    /// Returns the first candidate list that is empty or blocked by something
    /// other than the marking, else the list of the last candidate.
    pub fn build_transition_blocker_list(
        &self,
        subject: &mut S,
        name: &str,
    ) -> Result<TransitionBlockerList, CoreError> {
        let marking = self.get_marking(subject)?;
        let subject: &S = subject;

        let mut last = None;
        for t in self.definition.transitions_named(name) {
            let blockers = self.blockers_for(subject, &marking, t);
            if blockers.is_empty() || !blockers.is_blocked_by_marking() {
                return Ok(blockers);
            }
            last = Some(blockers);
        }

        last.ok_or_else(|| self.undefined(subject, name))
    }

    /// Fires every enabled transition named `name` with an empty context.
    pub fn apply(&self, subject: &mut S, name: &str) -> Result<Marking, CoreError> {
        self.apply_with(subject, name, &TransitionOptions::default())
    }

    /// Fires every enabled transition named `name`, in definition order.
    ///
    /// All guards are evaluated before the marking is touched. If no candidate
    /// is enabled the call fails and the stored marking is left as it was.
    pub fn apply_with(
        &self,
        subject: &mut S,
        name: &str,
        options: &TransitionOptions,
    ) -> Result<Marking, CoreError> {
        let mut marking = self.get_marking_with(subject, options)?;

        let mut found = false;
        let mut approved: Vec<&Transition> = Vec::new();
        let mut rejected: Option<TransitionBlockerList> = None;

        for t in self.definition.transitions_named(name) {
            found = true;
            let blockers = self.blockers_for(subject, &marking, t);
            if blockers.is_empty() {
                approved.push(t);
                continue;
            }
            if rejected.is_none() || !blockers.is_blocked_by_marking() {
                rejected = Some(blockers);
            }
        }

        if !found {
            return Err(self.undefined(subject, name));
        }

        if approved.is_empty() {
            return Err(CoreError::NotEnabledTransition {
                subject: subject.subject_id(),
                transition: name.to_string(),
                workflow: self.name.clone(),
                blockers: rejected.unwrap_or_default(),
            });
        }

        let mut context = options.context.clone().unwrap_or_else(|| json!({}));

        for t in approved {
            self.emit(
                EventKind::Leave,
                options,
                subject,
                &marking,
                Some(t),
                || t.froms().iter().map(String::as_str).collect(),
                &mut context,
            );
            for place in t.froms() {
                marking.unmark(place);
            }

            self.emit(
                EventKind::Transition,
                options,
                subject,
                &marking,
                Some(t),
                || vec![t.name()],
                &mut context,
            );

            self.emit(
                EventKind::Enter,
                options,
                subject,
                &marking,
                Some(t),
                || t.tos().iter().map(String::as_str).collect(),
                &mut context,
            );
            for place in t.tos() {
                marking.mark(place);
            }

            self.store.set_marking(subject, &marking, &context)?;

            tracing::debug!(
                "subject {} fired {} in workflow {}: [{}] -> [{}]",
                subject.subject_id(),
                t.name(),
                self.name,
                t.froms().join(", "),
                t.tos().join(", ")
            );

            self.emit(
                EventKind::Entered,
                options,
                subject,
                &marking,
                Some(t),
                || marking.places().collect(),
                &mut context,
            );

            self.emit(
                EventKind::Completed,
                options,
                subject,
                &marking,
                Some(t),
                || vec![t.name()],
                &mut context,
            );

            self.emit(
                EventKind::Announce,
                options,
                subject,
                &marking,
                Some(t),
                || {
                    self.enabled_under(subject, &marking)
                        .into_iter()
                        .map(Transition::name)
                        .collect()
                },
                &mut context,
            );
        }

        marking.set_context(context);
        Ok(marking)
    }

    /// Every enabled transition, in definition order.
    pub fn enabled_transitions(&self, subject: &mut S) -> Result<Vec<&Transition>, CoreError> {
        let marking = self.get_marking(subject)?;
        Ok(self.enabled_under(subject, &marking))
    }

    /// The first enabled transition named `name`, if any.
    pub fn enabled_transition(
        &self,
        subject: &mut S,
        name: &str,
    ) -> Result<Option<&Transition>, CoreError> {
        let marking = self.get_marking(subject)?;
        let subject: &S = subject;

        Ok(self
            .definition
            .transitions()
            .iter()
            .filter(|t| t.name() == name)
            .find(|t| self.blockers_for(subject, &marking, t).is_empty()))
    }

    fn enabled_under(&self, subject: &S, marking: &Marking) -> Vec<&Transition> {
        self.definition
            .transitions()
            .iter()
            .filter(|t| self.blockers_for(subject, marking, t).is_empty())
            .collect()
    }

    fn blockers_for(
        &self,
        subject: &S,
        marking: &Marking,
        transition: &Transition,
    ) -> TransitionBlockerList {
        if transition.froms().iter().any(|place| !marking.has(place)) {
            return vec![TransitionBlocker::blocked_by_marking(marking)].into();
        }

        let mut event = GuardEvent::new(
            subject,
            marking,
            transition,
            &self.name,
            self.definition.metadata_store().as_ref(),
        );
        for scope in [
            Scope::Global,
            Scope::workflow(&self.name),
            Scope::named(&self.name, transition.name()),
        ] {
            self.dispatcher
                .dispatch_guard(&Channel::guard(scope), &mut event);
        }
        event.into_blockers()
    }

    /// Publishes a lifecycle notification on the global and workflow channels,
    /// then on one named channel per entry returned by `names`.
    ///
    /// Only a transition notification may replace `context`.
    #[allow(clippy::too_many_arguments)]
    fn emit<'n, F>(
        &self,
        kind: EventKind,
        options: &TransitionOptions,
        subject: &S,
        marking: &Marking,
        transition: Option<&Transition>,
        names: F,
        context: &mut Value,
    ) where
        F: FnOnce() -> Vec<&'n str>,
    {
        if !self.policy.allows(kind) || options.disabled.is_disabled(kind) {
            return;
        }

        let mut event = WorkflowEvent::new(
            kind,
            subject,
            marking,
            transition,
            &self.name,
            self.definition.metadata_store().as_ref(),
            context.clone(),
        );

        self.dispatcher
            .dispatch(&Channel::event(kind, Scope::Global), &mut event);
        self.dispatcher
            .dispatch(&Channel::event(kind, Scope::workflow(&self.name)), &mut event);
        for name in names() {
            self.dispatcher
                .dispatch(&Channel::event(kind, Scope::named(&self.name, name)), &mut event);
        }

        if kind == EventKind::Transition {
            *context = event.into_context();
        }
    }

    fn undefined(&self, subject: &S, name: &str) -> CoreError {
        CoreError::UndefinedTransition {
            subject: subject.subject_id(),
            transition: name.to_string(),
            workflow: self.name.clone(),
        }
    }
}

impl<S> fmt::Debug for Workflow<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("definition", &self.definition)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
