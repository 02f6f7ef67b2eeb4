//! Transition type.
//!
//! A transition is a named hyperedge: it consumes every place in `from` and
//! produces every place in `to`. In serialized form either side may be a single
//! place name or a list:
//!
//! ```json
//! {"name": "publish", "from": "review", "to": ["published", "indexed"]}
//! ```

use serde::{Deserialize, Serialize};

/// A named transition between places.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    name: String,

    #[serde(deserialize_with = "deserialize_places")]
    from: Vec<String>,

    #[serde(deserialize_with = "deserialize_places")]
    to: Vec<String>,
}

impl Transition {
    /// Creates a transition. `from` and `to` accept a single place name or a list.
    pub fn new(name: impl Into<String>, from: impl Into<Places>, to: impl Into<Places>) -> Self {
        Self {
            name: name.into(),
            from: from.into().0,
            to: to.into().0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input places, in declaration order.
    pub fn froms(&self) -> &[String] {
        &self.from
    }

    /// Output places, in declaration order.
    pub fn tos(&self) -> &[String] {
        &self.to
    }
}

/// Ordered list of place names accepted by [`Transition::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Places(Vec<String>);

impl Places {
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Places {
    fn from(s: &str) -> Self {
        Self(vec![s.to_string()])
    }
}

impl From<String> for Places {
    fn from(s: String) -> Self {
        Self(vec![s])
    }
}

impl From<Vec<String>> for Places {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl From<Vec<&str>> for Places {
    fn from(v: Vec<&str>) -> Self {
        Self(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Places {
    fn from(v: [&str; N]) -> Self {
        Self(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Accepts either a single string or an array of strings.
pub(crate) fn deserialize_places<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct PlacesVisitor;

    impl<'de> Visitor<'de> for PlacesVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a place name or array of place names")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut places = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                places.push(s);
            }
            Ok(places)
        }
    }

    deserializer.deserialize_any(PlacesVisitor)
}
