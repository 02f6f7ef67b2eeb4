//! Workflow definition types.
//!
//! Definitions can be assembled in code with [`DefinitionBuilder`] or loaded
//! from a serialized form:
//!
//! ```json
//! {
//!   "places": ["draft", "review", "published"],
//!   "initial_places": "draft",
//!   "transitions": [
//!     {"name": "approve", "from": "draft", "to": "review"},
//!     {"name": "publish", "from": "review", "to": "published",
//!      "metadata": {"label": "Go live"}}
//!   ],
//!   "metadata": {"title": "Article review"},
//!   "place_metadata": {"draft": {"color": "grey"}}
//! }
//! ```

use crate::error::CoreError;
use crate::metadata::{InMemoryMetadataStore, Metadata, MetadataStore};
use crate::transition::{deserialize_places, Places, Transition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A transition as written in a workflow file, with optional inline metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRaw {
    #[serde(flatten)]
    pub transition: Transition,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Raw definition as stored/transmitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionRaw {
    /// All places, in declaration order.
    pub places: Vec<String>,

    /// Initial places. Defaults to the first declared place when omitted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_initial_places"
    )]
    pub initial_places: Option<Vec<String>>,

    #[serde(default)]
    pub transitions: Vec<TransitionRaw>,

    /// Workflow-level metadata.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Per-place metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub place_metadata: BTreeMap<String, Metadata>,
}

fn deserialize_initial_places<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_places(deserializer).map(Some)
}

/// Fields covered by the topology checksum.
#[derive(Serialize)]
struct Topology<'a> {
    places: &'a [String],
    initial_places: &'a [String],
    transitions: &'a [Transition],
}

/// Immutable workflow topology.
#[derive(Clone)]
pub struct Definition {
    places: Vec<String>,
    place_index: HashSet<String>,
    transitions: Vec<Transition>,
    initial_places: Vec<String>,
    metadata: Arc<dyn MetadataStore>,
    checksum: String,
}

impl Definition {
    /// Creates a definition, checking that every referenced place exists.
    ///
    /// `initial_places` of `None` selects the first place; `Some(vec![])` means
    /// the definition has no initial place.
    pub fn new<I, P>(
        places: I,
        transitions: Vec<Transition>,
        initial_places: Option<Vec<String>>,
        metadata: Option<Arc<dyn MetadataStore>>,
    ) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut place_index = HashSet::new();
        for place in places {
            let place = place.into();
            if place_index.insert(place.clone()) {
                ordered.push(place);
            }
        }

        for t in &transitions {
            for place in t.froms().iter().chain(t.tos()) {
                if !place_index.contains(place) {
                    return Err(CoreError::invalid_definition(format!(
                        "place '{}' referenced in transition '{}' does not exist",
                        place,
                        t.name()
                    )));
                }
            }
        }

        let initial_places: Vec<String> = match initial_places {
            Some(initial) => {
                if let Some(missing) = initial.iter().find(|p| !place_index.contains(*p)) {
                    return Err(CoreError::invalid_definition(format!(
                        "place '{}' cannot be the initial place as it does not exist",
                        missing
                    )));
                }
                let mut seen = HashSet::new();
                initial
                    .into_iter()
                    .filter(|p| seen.insert(p.clone()))
                    .collect()
            }
            None => ordered.first().cloned().into_iter().collect(),
        };

        let checksum = {
            let topology = Topology {
                places: &ordered,
                initial_places: &initial_places,
                transitions: &transitions,
            };
            let json_bytes = serde_json::to_vec(&topology)?;
            format!("{:08x}", crc32c::crc32c(&json_bytes))
        };

        Ok(Self {
            places: ordered,
            place_index,
            transitions,
            initial_places,
            metadata: metadata.unwrap_or_else(|| Arc::new(InMemoryMetadataStore::new())),
            checksum,
        })
    }

    /// Parses a definition from JSON.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: DefinitionRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(raw)
    }

    /// Builds a definition and an in-memory metadata store from raw parts.
    pub fn from_raw(raw: DefinitionRaw) -> Result<Self, CoreError> {
        let mut metadata = InMemoryMetadataStore::new().with_workflow_metadata(raw.metadata);
        for (place, bag) in raw.place_metadata {
            metadata = metadata.with_place_metadata(place, bag);
        }

        let mut transitions = Vec::with_capacity(raw.transitions.len());
        for t in raw.transitions {
            if !t.metadata.is_empty() {
                metadata = metadata.with_transition_metadata(t.transition.clone(), t.metadata);
            }
            transitions.push(t.transition);
        }

        Self::new(
            raw.places,
            transitions,
            raw.initial_places,
            Some(Arc::new(metadata)),
        )
    }

    /// All places, in insertion order.
    pub fn places(&self) -> &[String] {
        &self.places
    }

    pub fn has_place(&self, place: &str) -> bool {
        self.place_index.contains(place)
    }

    /// All transitions, in insertion order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Transitions named `name`, in insertion order.
    pub fn transitions_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Transition> + 'n
    where
        'a: 'n,
    {
        self.transitions.iter().filter(move |t| t.name() == name)
    }

    pub fn initial_places(&self) -> &[String] {
        &self.initial_places
    }

    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// CRC32C of the topology (places, initial places, transitions), hex encoded.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("initial_places", &self.initial_places)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// Accumulates places and transitions, then emits a [`Definition`].
#[derive(Default, Clone)]
pub struct DefinitionBuilder {
    places: Vec<String>,
    transitions: Vec<Transition>,
    initial_places: Option<Vec<String>>,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_place(&mut self, place: impl Into<String>) -> &mut Self {
        let place = place.into();
        if !self.places.contains(&place) {
            self.places.push(place);
        }
        self
    }

    pub fn add_places<I, P>(&mut self, places: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        for place in places {
            self.add_place(place);
        }
        self
    }

    pub fn add_transition(&mut self, transition: Transition) -> &mut Self {
        self.transitions.push(transition);
        self
    }

    pub fn add_transitions(&mut self, transitions: impl IntoIterator<Item = Transition>) -> &mut Self {
        self.transitions.extend(transitions);
        self
    }

    /// Sets the initial places. An empty list means "no initial place".
    pub fn set_initial_places(&mut self, places: impl Into<Places>) -> &mut Self {
        self.initial_places = Some(places.into().into_vec());
        self
    }

    /// Goes back to using the first place as the initial place.
    pub fn reset_initial_places(&mut self) -> &mut Self {
        self.initial_places = None;
        self
    }

    pub fn set_metadata_store(&mut self, metadata: Arc<dyn MetadataStore>) -> &mut Self {
        self.metadata = Some(metadata);
        self
    }

    /// Snapshots the accumulated state into a definition.
    pub fn build(&self) -> Result<Definition, CoreError> {
        Definition::new(
            self.places.iter().cloned(),
            self.transitions.clone(),
            self.initial_places.clone(),
            self.metadata.clone(),
        )
    }

    /// Resets the builder to empty.
    pub fn clear(&mut self) -> &mut Self {
        self.places.clear();
        self.transitions.clear();
        self.initial_places = None;
        self.metadata = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataTarget;

    fn sample_definition() -> serde_json::Value {
        serde_json::json!({
            "places": ["draft", "review", "published", "rejected"],
            "transitions": [
                {"name": "approve", "from": "draft", "to": "review"},
                {"name": "publish", "from": "review", "to": "published", "metadata": {"label": "Go live"}},
                {"name": "reject", "from": ["draft", "review"], "to": "rejected"}
            ],
            "metadata": {"title": "Article review"},
            "place_metadata": {"draft": {"color": "grey"}}
        })
    }

    #[test]
    fn test_parse_definition() {
        let def = Definition::from_json(&sample_definition()).unwrap();

        assert_eq!(def.places().len(), 4);
        assert_eq!(def.transitions().len(), 3);
        assert_eq!(def.initial_places(), ["draft"]);
        assert!(def.has_place("rejected"));
        assert!(!def.has_place("archived"));
        assert_eq!(def.checksum().len(), 8);
    }

    #[test]
    fn test_metadata_from_raw() {
        let def = Definition::from_json(&sample_definition()).unwrap();
        let store = def.metadata_store();
        let publish = &def.transitions()[1];

        assert_eq!(
            store.get_metadata("title", MetadataTarget::Workflow),
            Some(&serde_json::json!("Article review"))
        );
        assert_eq!(
            store.get_metadata("color", MetadataTarget::Place("draft")),
            Some(&serde_json::json!("grey"))
        );
        assert_eq!(
            store.get_metadata("label", MetadataTarget::Transition(publish)),
            Some(&serde_json::json!("Go live"))
        );
    }

    #[test]
    fn test_explicit_initial_places() {
        let json = serde_json::json!({
            "places": ["a", "b", "c"],
            "initial_places": ["b", "c"],
            "transitions": []
        });
        let def = Definition::from_json(&json).unwrap();
        assert_eq!(def.initial_places(), ["b", "c"]);
    }

    #[test]
    fn test_initial_places_are_deduplicated() {
        let mut builder = DefinitionBuilder::new();
        builder
            .add_places(["a", "b", "c"])
            .set_initial_places(["c", "a", "c", "a"]);
        let def = builder.build().unwrap();
        assert_eq!(def.initial_places(), ["c", "a"]);
    }

    #[test]
    fn test_invalid_initial_place() {
        let json = serde_json::json!({
            "places": ["a", "b"],
            "initial_places": "c",
            "transitions": []
        });

        let result = Definition::from_json(&json);
        assert!(matches!(result, Err(CoreError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_invalid_transition_target() {
        let json = serde_json::json!({
            "places": ["a", "b"],
            "transitions": [
                {"name": "go", "from": "a", "to": "c"}
            ]
        });

        let result = Definition::from_json(&json);
        assert!(matches!(result, Err(CoreError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_invalid_transition_source() {
        let result = Definition::new(
            ["a", "b"],
            vec![Transition::new("go", ["a", "x"], "b")],
            None,
            None,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("'x'"));
        assert_eq!(err.error_code(), "INVALID_DEFINITION");
    }

    #[test]
    fn test_empty_definition_has_no_initial_place() {
        let def = Definition::new(Vec::<String>::new(), vec![], None, None).unwrap();
        assert!(def.initial_places().is_empty());
    }

    #[test]
    fn test_checksum_tracks_topology() {
        let a = Definition::new(["a", "b"], vec![Transition::new("go", "a", "b")], None, None).unwrap();
        let b = Definition::new(["a", "b"], vec![Transition::new("go", "a", "b")], None, None).unwrap();
        let c = Definition::new(["a", "b"], vec![Transition::new("go", "b", "a")], None, None).unwrap();

        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn test_transitions_named_preserves_order() {
        let def = Definition::new(
            ["a", "b", "c"],
            vec![
                Transition::new("go", "a", "b"),
                Transition::new("stop", "b", "c"),
                Transition::new("go", "b", "c"),
            ],
            None,
            None,
        )
        .unwrap();

        let named: Vec<_> = def.transitions_named("go").map(|t| t.froms()[0].as_str()).collect();
        assert_eq!(named, vec!["a", "b"]);
    }

    #[test]
    fn test_builder_accumulates_and_clears() {
        let mut builder = DefinitionBuilder::new();
        builder.add_places(["draft", "review"]);
        builder.add_place("published").add_place("draft");
        builder.add_transition(Transition::new("approve", "draft", "review"));
        builder.add_transitions([Transition::new("publish", "review", "published")]);

        let def = builder.build().unwrap();
        assert_eq!(def.places(), ["draft", "review", "published"]);
        assert_eq!(def.initial_places(), ["draft"]);
        assert_eq!(def.transitions().len(), 2);

        builder.set_initial_places("review");
        assert_eq!(builder.build().unwrap().initial_places(), ["review"]);

        builder.reset_initial_places();
        assert_eq!(builder.build().unwrap().initial_places(), ["draft"]);

        builder.clear();
        let empty = builder.build().unwrap();
        assert!(empty.places().is_empty());
        assert!(empty.transitions().is_empty());
    }

    #[test]
    fn test_builder_does_not_validate_structure() {
        // Duplicate names from one place are legal until a validator runs.
        let mut builder = DefinitionBuilder::new();
        builder
            .add_places(["a", "b", "c"])
            .add_transition(Transition::new("go", "a", "b"))
            .add_transition(Transition::new("go", "a", "c"));

        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_builder_rejects_dangling_place() {
        let mut builder = DefinitionBuilder::new();
        builder
            .add_place("a")
            .add_transition(Transition::new("go", "a", "missing"));

        assert!(matches!(
            builder.build(),
            Err(CoreError::InvalidDefinition { .. })
        ));
    }
}
