//! Metadata attached to a workflow, its places and its transitions.

use crate::transition::Transition;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Key/value metadata bag.
pub type Metadata = Map<String, Value>;

/// What a metadata lookup refers to.
#[derive(Debug, Clone, Copy)]
pub enum MetadataTarget<'a> {
    Workflow,
    Place(&'a str),
    Transition(&'a Transition),
}

/// Read access to workflow, place and transition metadata.
pub trait MetadataStore: Send + Sync {
    fn workflow_metadata(&self) -> &Metadata;

    /// Metadata of a place. Unknown places yield an empty bag.
    fn place_metadata(&self, place: &str) -> &Metadata;

    /// Metadata of a transition. Unknown transitions yield an empty bag.
    fn transition_metadata(&self, transition: &Transition) -> &Metadata;

    /// Looks up `key` on the workflow, a place, or a transition.
    fn get_metadata(&self, key: &str, target: MetadataTarget<'_>) -> Option<&Value> {
        let bag = match target {
            MetadataTarget::Workflow => self.workflow_metadata(),
            MetadataTarget::Place(place) => self.place_metadata(place),
            MetadataTarget::Transition(transition) => self.transition_metadata(transition),
        };
        bag.get(key)
    }
}

fn empty() -> &'static Metadata {
    static EMPTY: OnceLock<Metadata> = OnceLock::new();
    EMPTY.get_or_init(Metadata::new)
}

/// Metadata held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    workflow: Metadata,
    places: HashMap<String, Metadata>,
    transitions: HashMap<Transition, Metadata>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_metadata(mut self, metadata: Metadata) -> Self {
        self.workflow = metadata;
        self
    }

    pub fn with_place_metadata(mut self, place: impl Into<String>, metadata: Metadata) -> Self {
        self.places.insert(place.into(), metadata);
        self
    }

    /// Transitions are keyed by value: identical transitions share metadata.
    pub fn with_transition_metadata(mut self, transition: Transition, metadata: Metadata) -> Self {
        self.transitions.insert(transition, metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.workflow.is_empty() && self.places.is_empty() && self.transitions.is_empty()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn workflow_metadata(&self) -> &Metadata {
        &self.workflow
    }

    fn place_metadata(&self, place: &str) -> &Metadata {
        self.places.get(place).unwrap_or_else(|| empty())
    }

    fn transition_metadata(&self, transition: &Transition) -> &Metadata {
        self.transitions
            .get(transition)
            .unwrap_or_else(|| empty())
    }
}
