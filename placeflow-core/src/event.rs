//! Workflow notifications and the listener registry.
//!
//! Every notification is published on three channels at most: a global one, one
//! scoped to the workflow, and (for guard, leave, transition, enter, entered,
//! completed and announce) one scoped to a place or transition name. Channel
//! names follow a fixed wire format:
//!
//! - `workflow.<category>`
//! - `workflow.<workflow>.<category>`
//! - `workflow.<workflow>.<category>.<place or transition>`

use crate::blocker::{TransitionBlocker, TransitionBlockerList};
use crate::error::CoreError;
use crate::marking::Marking;
use crate::metadata::{MetadataStore, MetadataTarget};
use crate::transition::Transition;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle notification categories, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Leave,
    Transition,
    Enter,
    Entered,
    Completed,
    Announce,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Leave,
        EventKind::Transition,
        EventKind::Enter,
        EventKind::Entered,
        EventKind::Completed,
        EventKind::Announce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Leave => "leave",
            EventKind::Transition => "transition",
            EventKind::Enter => "enter",
            EventKind::Entered => "entered",
            EventKind::Completed => "completed",
            EventKind::Announce => "announce",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::InvalidArgument {
                reason: format!("unknown event kind '{}'", s),
            })
    }
}

/// What a channel carries: guard checks or a lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Guard,
    Lifecycle(EventKind),
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Guard => "guard",
            Topic::Lifecycle(kind) => kind.as_str(),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        if s == "guard" {
            return Some(Topic::Guard);
        }
        s.parse().ok().map(Topic::Lifecycle)
    }
}

/// Which notifications of a topic a channel receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every workflow attached to the dispatcher.
    Global,
    /// One workflow.
    Workflow(String),
    /// One place or transition of one workflow.
    Named(String, String),
}

impl Scope {
    pub fn workflow(workflow: impl Into<String>) -> Self {
        Scope::Workflow(workflow.into())
    }

    pub fn named(workflow: impl Into<String>, name: impl Into<String>) -> Self {
        Scope::Named(workflow.into(), name.into())
    }
}

/// A notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub topic: Topic,
    pub scope: Scope,
}

impl Channel {
    pub fn new(topic: Topic, scope: Scope) -> Self {
        Self { topic, scope }
    }

    pub fn guard(scope: Scope) -> Self {
        Self::new(Topic::Guard, scope)
    }

    pub fn event(kind: EventKind, scope: Scope) -> Self {
        Self::new(Topic::Lifecycle(kind), scope)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topic = self.topic.as_str();
        match &self.scope {
            Scope::Global => write!(f, "workflow.{}", topic),
            Scope::Workflow(workflow) => write!(f, "workflow.{}.{}", workflow, topic),
            Scope::Named(workflow, name) => write!(f, "workflow.{}.{}.{}", workflow, topic, name),
        }
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    /// Parses a channel name. The first segment after the workflow name that
    /// names a topic ends the workflow name, so workflow names may contain dots
    /// as long as no dotted segment is itself a topic name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidChannel {
            channel: s.to_string(),
        };

        let rest = s.strip_prefix("workflow.").ok_or_else(invalid)?;
        if let Some(topic) = Topic::parse(rest) {
            return Ok(Channel::new(topic, Scope::Global));
        }

        let segments: Vec<&str> = rest.split('.').collect();
        let (at, topic) = segments
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(i, segment)| Topic::parse(segment).map(|topic| (i, topic)))
            .ok_or_else(invalid)?;

        let workflow = segments[..at].join(".");
        if workflow.is_empty() {
            return Err(invalid());
        }
        if at + 1 == segments.len() {
            return Ok(Channel::new(topic, Scope::Workflow(workflow)));
        }

        let name = segments[at + 1..].join(".");
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Channel::new(topic, Scope::Named(workflow, name)))
    }
}

/// Guard check for one candidate transition.
///
/// Listeners veto the transition by adding blockers or calling
/// [`GuardEvent::set_blocked`].
pub struct GuardEvent<'a, S> {
    subject: &'a S,
    marking: &'a Marking,
    transition: &'a Transition,
    workflow_name: &'a str,
    metadata: &'a dyn MetadataStore,
    blockers: TransitionBlockerList,
}

impl<'a, S> GuardEvent<'a, S> {
    pub(crate) fn new(
        subject: &'a S,
        marking: &'a Marking,
        transition: &'a Transition,
        workflow_name: &'a str,
        metadata: &'a dyn MetadataStore,
    ) -> Self {
        Self {
            subject,
            marking,
            transition,
            workflow_name,
            metadata,
            blockers: TransitionBlockerList::new(),
        }
    }

    pub fn subject(&self) -> &S {
        self.subject
    }

    pub fn marking(&self) -> &Marking {
        self.marking
    }

    pub fn transition(&self) -> &Transition {
        self.transition
    }

    pub fn workflow_name(&self) -> &str {
        self.workflow_name
    }

    pub fn metadata(&self, key: &str, target: MetadataTarget<'_>) -> Option<&Value> {
        self.metadata.get_metadata(key, target)
    }

    pub fn is_blocked(&self) -> bool {
        !self.blockers.is_empty()
    }

    /// Blocking appends an `Unknown` blocker; unblocking drops every blocker
    /// collected so far for this check.
    #[track_caller]
    pub fn set_blocked(&mut self, blocked: bool, message: Option<&str>) {
        if !blocked {
            self.blockers.clear();
            return;
        }
        self.blockers.add(TransitionBlocker::unknown(message));
    }

    pub fn add_transition_blocker(&mut self, blocker: TransitionBlocker) {
        self.blockers.add(blocker);
    }

    pub fn transition_blocker_list(&self) -> &TransitionBlockerList {
        &self.blockers
    }

    pub(crate) fn into_blockers(self) -> TransitionBlockerList {
        self.blockers
    }
}

/// Lifecycle notification.
pub struct WorkflowEvent<'a, S> {
    kind: EventKind,
    subject: &'a S,
    marking: &'a Marking,
    transition: Option<&'a Transition>,
    workflow_name: &'a str,
    metadata: &'a dyn MetadataStore,
    context: Value,
}

impl<'a, S> WorkflowEvent<'a, S> {
    pub(crate) fn new(
        kind: EventKind,
        subject: &'a S,
        marking: &'a Marking,
        transition: Option<&'a Transition>,
        workflow_name: &'a str,
        metadata: &'a dyn MetadataStore,
        context: Value,
    ) -> Self {
        Self {
            kind,
            subject,
            marking,
            transition,
            workflow_name,
            metadata,
            context,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn subject(&self) -> &S {
        self.subject
    }

    pub fn marking(&self) -> &Marking {
        self.marking
    }

    /// The transition being applied; `None` for the entered notification sent
    /// when a subject is first placed in the workflow.
    pub fn transition(&self) -> Option<&Transition> {
        self.transition
    }

    pub fn workflow_name(&self) -> &str {
        self.workflow_name
    }

    pub fn metadata(&self, key: &str, target: MetadataTarget<'_>) -> Option<&Value> {
        self.metadata.get_metadata(key, target)
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Replaces the context. Only honored on `transition` notifications, where
    /// the new value is used for the rest of the apply call.
    pub fn set_context(&mut self, context: Value) {
        self.context = context;
    }

    pub(crate) fn into_context(self) -> Value {
        self.context
    }
}

type GuardListener<S> = Arc<dyn Fn(&mut GuardEvent<'_, S>) + Send + Sync>;
type EventListener<S> = Arc<dyn Fn(&mut WorkflowEvent<'_, S>) + Send + Sync>;
type Tap = Arc<dyn Fn(&Channel) + Send + Sync>;

enum Listener<S> {
    Guard(GuardListener<S>),
    Event(EventListener<S>),
}

impl<S> Clone for Listener<S> {
    fn clone(&self) -> Self {
        match self {
            Listener::Guard(f) => Listener::Guard(Arc::clone(f)),
            Listener::Event(f) => Listener::Event(Arc::clone(f)),
        }
    }
}

/// Ordered listener lists keyed by channel.
///
/// Listeners run synchronously in registration order. The list for a channel is
/// copied before it runs, so a listener may register further listeners.
pub struct EventDispatcher<S> {
    listeners: RwLock<HashMap<Channel, Vec<Listener<S>>>>,
    taps: RwLock<Vec<Tap>>,
}

impl<S> Default for EventDispatcher<S> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            taps: RwLock::new(Vec::new()),
        }
    }
}

impl<S> EventDispatcher<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a guard listener.
    pub fn on_guard<F>(&self, scope: Scope, listener: F)
    where
        F: Fn(&mut GuardEvent<'_, S>) + Send + Sync + 'static,
    {
        self.insert(Channel::guard(scope), Listener::Guard(Arc::new(listener)));
    }

    /// Registers a lifecycle listener.
    pub fn on<F>(&self, kind: EventKind, scope: Scope, listener: F)
    where
        F: Fn(&mut WorkflowEvent<'_, S>) + Send + Sync + 'static,
    {
        self.insert(
            Channel::event(kind, scope),
            Listener::Event(Arc::new(listener)),
        );
    }

    /// Registers a guard listener by channel name, e.g. `workflow.order.guard.pay`.
    pub fn listen_guard<F>(&self, channel: &str, listener: F) -> Result<(), CoreError>
    where
        F: Fn(&mut GuardEvent<'_, S>) + Send + Sync + 'static,
    {
        let parsed: Channel = channel.parse()?;
        if parsed.topic != Topic::Guard {
            return Err(CoreError::InvalidChannel {
                channel: channel.to_string(),
            });
        }
        self.insert(parsed, Listener::Guard(Arc::new(listener)));
        Ok(())
    }

    /// Registers a lifecycle listener by channel name, e.g. `workflow.order.entered`.
    pub fn listen<F>(&self, channel: &str, listener: F) -> Result<(), CoreError>
    where
        F: Fn(&mut WorkflowEvent<'_, S>) + Send + Sync + 'static,
    {
        let parsed: Channel = channel.parse()?;
        if parsed.topic == Topic::Guard {
            return Err(CoreError::InvalidChannel {
                channel: channel.to_string(),
            });
        }
        self.insert(parsed, Listener::Event(Arc::new(listener)));
        Ok(())
    }

    /// Registers a callback invoked with every channel a notification is
    /// published on, whether or not it has listeners.
    pub fn tap<F>(&self, tap: F)
    where
        F: Fn(&Channel) + Send + Sync + 'static,
    {
        self.taps.write().push(Arc::new(tap));
    }

    pub fn listener_count(&self, channel: &Channel) -> usize {
        self.listeners
            .read()
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Removes every listener and tap.
    pub fn clear(&self) {
        self.listeners.write().clear();
        self.taps.write().clear();
    }

    fn insert(&self, channel: Channel, listener: Listener<S>) {
        self.listeners
            .write()
            .entry(channel)
            .or_default()
            .push(listener);
    }

    fn snapshot(&self, channel: &Channel) -> Vec<Listener<S>> {
        let taps: Vec<Tap> = self.taps.read().clone();
        for tap in &taps {
            tap(channel);
        }

        tracing::trace!("dispatching {}", channel);
        self.listeners
            .read()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn dispatch_guard(&self, channel: &Channel, event: &mut GuardEvent<'_, S>) {
        for listener in self.snapshot(channel) {
            if let Listener::Guard(f) = listener {
                f(event);
            }
        }
    }

    pub(crate) fn dispatch(&self, channel: &Channel, event: &mut WorkflowEvent<'_, S>) {
        for listener in self.snapshot(channel) {
            if let Listener::Event(f) = listener {
                f(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadataStore;
    use parking_lot::Mutex;

    #[test]
    fn test_channel_names() {
        assert_eq!(
            Channel::guard(Scope::Global).to_string(),
            "workflow.guard"
        );
        assert_eq!(
            Channel::event(EventKind::Entered, Scope::workflow("order")).to_string(),
            "workflow.order.entered"
        );
        assert_eq!(
            Channel::guard(Scope::named("order", "pay")).to_string(),
            "workflow.order.guard.pay"
        );
    }

    #[test]
    fn test_channel_parse() {
        let channel: Channel = "workflow.order.guard.pay".parse().unwrap();
        assert_eq!(channel, Channel::guard(Scope::named("order", "pay")));

        let channel: Channel = "workflow.announce".parse().unwrap();
        assert_eq!(channel, Channel::event(EventKind::Announce, Scope::Global));

        let channel: Channel = "workflow.order.leave".parse().unwrap();
        assert_eq!(channel, Channel::event(EventKind::Leave, Scope::workflow("order")));

        let channel: Channel = "workflow.order.enter.in.stock".parse().unwrap();
        assert_eq!(
            channel,
            Channel::event(EventKind::Enter, Scope::named("order", "in.stock"))
        );

        let channel: Channel = "workflow.order.v2.guard.pay".parse().unwrap();
        assert_eq!(channel, Channel::guard(Scope::named("order.v2", "pay")));

        let channel: Channel = "workflow.order.v2.entered".parse().unwrap();
        assert_eq!(channel, Channel::event(EventKind::Entered, Scope::workflow("order.v2")));
    }

    #[test]
    fn test_channel_parse_rejects_garbage() {
        for bad in [
            "",
            "workflow",
            "workflow.",
            "workflow.order.explode",
            "order.guard",
            "workflow..guard",
            "workflow.order.guard.",
        ] {
            let result = bad.parse::<Channel>();
            assert!(
                matches!(result, Err(CoreError::InvalidChannel { .. })),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_event_kind_parse() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("guard".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_listen_rejects_mismatched_topic() {
        let dispatcher: EventDispatcher<String> = EventDispatcher::new();
        assert!(dispatcher.listen("workflow.order.guard", |_| {}).is_err());
        assert!(dispatcher.listen_guard("workflow.order.enter", |_| {}).is_err());
        assert!(dispatcher.listen("workflow.order.enter", |_| {}).is_ok());
        assert_eq!(
            dispatcher.listener_count(&Channel::event(EventKind::Enter, Scope::workflow("order"))),
            1
        );
    }

    #[test]
    fn test_guard_dispatch_collects_blockers() {
        let dispatcher: EventDispatcher<String> = EventDispatcher::new();
        dispatcher.on_guard(Scope::Global, |e| e.set_blocked(true, Some("first")));
        dispatcher.on_guard(Scope::Global, |e| e.set_blocked(true, Some("second")));

        let subject = "s-1".to_string();
        let marking = Marking::from_places(["a"]);
        let transition = Transition::new("go", "a", "b");
        let metadata = InMemoryMetadataStore::new();
        let mut event = GuardEvent::new(&subject, &marking, &transition, "wf", &metadata);

        dispatcher.dispatch_guard(&Channel::guard(Scope::Global), &mut event);
        assert!(event.is_blocked());
        assert_eq!(event.transition_blocker_list().len(), 2);

        event.set_blocked(false, None);
        assert!(!event.is_blocked());
    }

    #[test]
    fn test_listeners_run_in_order_and_taps_see_every_channel() {
        let dispatcher: Arc<EventDispatcher<String>> = Arc::new(EventDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        dispatcher.on(EventKind::Completed, Scope::Global, move |_| {
            log.lock().push("first".to_string())
        });
        let log = Arc::clone(&seen);
        dispatcher.on(EventKind::Completed, Scope::Global, move |_| {
            log.lock().push("second".to_string())
        });
        let log = Arc::clone(&seen);
        dispatcher.tap(move |channel| log.lock().push(channel.to_string()));

        let subject = "s-1".to_string();
        let marking = Marking::new();
        let metadata = InMemoryMetadataStore::new();
        let mut event = WorkflowEvent::new(
            EventKind::Completed,
            &subject,
            &marking,
            None,
            "wf",
            &metadata,
            Value::Null,
        );
        dispatcher.dispatch(&Channel::event(EventKind::Completed, Scope::Global), &mut event);
        dispatcher.dispatch(
            &Channel::event(EventKind::Completed, Scope::workflow("wf")),
            &mut event,
        );

        assert_eq!(
            *seen.lock(),
            vec![
                "workflow.completed",
                "first",
                "second",
                "workflow.wf.completed"
            ]
        );
    }

    #[test]
    fn test_listener_may_register_listener() {
        let dispatcher: Arc<EventDispatcher<String>> = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.on(EventKind::Entered, Scope::Global, move |_| {
            inner.on(EventKind::Entered, Scope::Global, |_| {});
        });

        let subject = "s-1".to_string();
        let marking = Marking::new();
        let metadata = InMemoryMetadataStore::new();
        let mut event = WorkflowEvent::new(
            EventKind::Entered,
            &subject,
            &marking,
            None,
            "wf",
            &metadata,
            Value::Null,
        );
        let channel = Channel::event(EventKind::Entered, Scope::Global);
        dispatcher.dispatch(&channel, &mut event);

        assert_eq!(dispatcher.listener_count(&channel), 2);
    }
}
