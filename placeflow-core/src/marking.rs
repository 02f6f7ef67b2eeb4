//! Marking: the set of active places for one subject.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Active places of a subject, plus the context left by the last applied call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marking {
    places: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<Value>,
}

impl Marking {
    /// Creates an empty marking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a marking with the given places active.
    pub fn from_places<I, P>(places: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            places: places.into_iter().map(Into::into).collect(),
            context: None,
        }
    }

    pub fn mark(&mut self, place: &str) {
        if !self.places.contains(place) {
            self.places.insert(place.to_string());
        }
    }

    pub fn unmark(&mut self, place: &str) {
        self.places.remove(place);
    }

    pub fn has(&self, place: &str) -> bool {
        self.places.contains(place)
    }

    /// Active places, each exactly once, in name order.
    pub fn places(&self) -> impl Iterator<Item = &str> {
        self.places.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    /// Context after the subject last transitioned, if any.
    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub(crate) fn set_context(&mut self, context: Value) {
        self.context = Some(context);
    }

    /// Places as a JSON array, used as a blocker parameter.
    pub fn to_json(&self) -> Value {
        Value::Array(self.places.iter().cloned().map(Value::String).collect())
    }
}
