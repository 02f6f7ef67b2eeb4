//! Marking persistence.
//!
//! The engine never owns markings. It reads a subject's marking through a
//! [`MarkingStore`] when a call starts and writes it back once per executed
//! transition (and once when the subject is first placed in the workflow).

use crate::error::CoreError;
use crate::marking::Marking;
use dashmap::DashMap;
use serde_json::Value;

/// Something a workflow can move through places.
pub trait Subject {
    /// Stable identifier, used in errors and to key in-memory markings.
    fn subject_id(&self) -> String;
}

impl Subject for String {
    fn subject_id(&self) -> String {
        self.clone()
    }
}

/// Reads and writes the marking of a subject.
pub trait MarkingStore<S>: Send + Sync {
    /// Returns the stored marking, or an empty one for an untouched subject.
    fn get_marking(&self, subject: &S) -> Result<Marking, CoreError>;

    /// Persists `marking` together with the context of the call that produced it.
    fn set_marking(&self, subject: &mut S, marking: &Marking, context: &Value)
        -> Result<(), CoreError>;
}

/// Markings kept in memory, keyed by subject id.
#[derive(Debug, Default)]
pub struct InMemoryMarkingStore {
    markings: DashMap<String, Marking>,
}

impl InMemoryMarkingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the stored marking, so the next read starts from the initial places.
    pub fn forget<S: Subject>(&self, subject: &S) -> Option<Marking> {
        self.markings
            .remove(&subject.subject_id())
            .map(|(_, marking)| marking)
    }

    /// Number of subjects with a stored marking.
    pub fn len(&self) -> usize {
        self.markings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markings.is_empty()
    }
}

impl<S: Subject> MarkingStore<S> for InMemoryMarkingStore {
    fn get_marking(&self, subject: &S) -> Result<Marking, CoreError> {
        Ok(self
            .markings
            .get(&subject.subject_id())
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn set_marking(
        &self,
        subject: &mut S,
        marking: &Marking,
        context: &Value,
    ) -> Result<(), CoreError> {
        let mut stored = marking.clone();
        stored.set_context(context.clone());
        self.markings.insert(subject.subject_id(), stored);
        Ok(())
    }
}

/// A subject that carries its own marking in a field.
pub trait MarkedSubject {
    /// Places currently recorded on the subject.
    fn marking_field(&self) -> Vec<String>;

    /// Records `places` on the subject. The context may be ignored.
    fn set_marking_field(&mut self, places: Vec<String>, context: &Value);
}

/// Reads and writes the marking through [`MarkedSubject`].
///
/// In single-state mode the subject holds at most one place, as state-machine
/// subjects usually do.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMarkingStore {
    single_state: bool,
}

impl FieldMarkingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_state() -> Self {
        Self { single_state: true }
    }

    pub fn is_single_state(&self) -> bool {
        self.single_state
    }
}

impl<S: MarkedSubject + Subject> MarkingStore<S> for FieldMarkingStore {
    fn get_marking(&self, subject: &S) -> Result<Marking, CoreError> {
        let places = subject.marking_field();
        if self.single_state && places.len() > 1 {
            return Err(CoreError::logic(format!(
                "subject '{}' holds {} places but its marking field stores a single place",
                subject.subject_id(),
                places.len()
            )));
        }
        Ok(Marking::from_places(places))
    }

    fn set_marking(
        &self,
        subject: &mut S,
        marking: &Marking,
        context: &Value,
    ) -> Result<(), CoreError> {
        if self.single_state && marking.len() > 1 {
            return Err(CoreError::logic(format!(
                "cannot store {} places on subject '{}': its marking field stores a single place",
                marking.len(),
                subject.subject_id()
            )));
        }
        let places = marking.places().map(str::to_string).collect();
        subject.set_marking_field(places, context);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ticket {
        id: u32,
        state: Vec<String>,
    }

    impl Subject for Ticket {
        fn subject_id(&self) -> String {
            format!("ticket-{}", self.id)
        }
    }

    impl MarkedSubject for Ticket {
        fn marking_field(&self) -> Vec<String> {
            self.state.clone()
        }

        fn set_marking_field(&mut self, places: Vec<String>, _context: &Value) {
            self.state = places;
        }
    }

    #[test]
    fn test_in_memory_untouched_subject_is_empty() {
        let store = InMemoryMarkingStore::new();
        let marking = store.get_marking(&"order-1".to_string()).unwrap();
        assert!(marking.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_in_memory_keeps_context() {
        let store = InMemoryMarkingStore::new();
        let mut subject = "order-1".to_string();

        store
            .set_marking(&mut subject, &Marking::from_places(["paid"]), &json!({"by": "alice"}))
            .unwrap();

        let marking = store.get_marking(&subject).unwrap();
        assert!(marking.has("paid"));
        assert_eq!(marking.context(), Some(&json!({"by": "alice"})));
        assert_eq!(store.len(), 1);

        assert!(store.forget(&subject).is_some());
        assert!(store.get_marking(&subject).unwrap().is_empty());
    }

    #[test]
    fn test_field_store_roundtrip() {
        let store = FieldMarkingStore::new();
        let mut ticket = Ticket { id: 7, state: vec![] };

        store
            .set_marking(&mut ticket, &Marking::from_places(["a", "b"]), &json!({}))
            .unwrap();
        assert_eq!(ticket.state, vec!["a", "b"]);

        let marking = store.get_marking(&ticket).unwrap();
        assert!(marking.has("a") && marking.has("b"));
    }

    #[test]
    fn test_single_state_rejects_many_places() {
        let store = FieldMarkingStore::single_state();
        let mut ticket = Ticket { id: 7, state: vec![] };

        store
            .set_marking(&mut ticket, &Marking::from_places(["open"]), &json!({}))
            .unwrap();
        assert_eq!(ticket.state, vec!["open"]);

        let err = store
            .set_marking(&mut ticket, &Marking::from_places(["a", "b"]), &json!({}))
            .unwrap_err();
        assert_eq!(err.error_code(), "LOGIC_ERROR");
        assert!(err.to_string().contains("ticket-7"));
        assert_eq!(ticket.state, vec!["open"]);

        ticket.state = vec!["a".into(), "b".into()];
        assert!(store.get_marking(&ticket).is_err());
    }
}
