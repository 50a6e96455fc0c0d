//! CMI data model tree and supporting path/allowlist/harvest machinery.
//!
//! The SCORM 1.2 `cmi.*` namespace is held as a [`CmiNode`] tree: scalar
//! leaves, indexed collections (`cmi.objectives.0`, `.1`, …) and composite
//! categories keyed by name. The tree is built once per session by
//! [`harvest::harvest_data_model`] and shipped whole across the origin
//! boundary inside a single `LMSSetDataModel` envelope.
//!
//! # Wire shape
//!
//! A collection serializes as an object with stringified indices, not a
//! JSON array, matching how the browser side of the wire builds the tree:
//!
//! ```json
//! {
//!   "core": { "student_id": "u1", "lesson_status": "incomplete" },
//!   "objectives": { "0": { "id": "obj-a" }, "1": { "id": "obj-b" } }
//! }
//! ```
//!
//! Deserialization recognizes an all-numeric-key object as a collection and
//! preserves document order for composite keys.
//!
//! # Modules
//!
//! - [`path`] - dotted element path helpers and wildcard normalization
//! - [`allowlist`] - the fixed read allowlist consulted by `LMSGetValue`
//! - [`harvest`] - the recursive three-way tree walk over a [`harvest::CmiProbe`]
//!
//! Rust guideline compliant 2026-03

pub mod allowlist;
pub mod harvest;
pub mod path;

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use allowlist::ReadAllowlist;
pub use harvest::{harvest, harvest_data_model, CmiProbe};

/// One node of the CMI data model tree.
///
/// The three variants correspond exactly to the three-way branch of the
/// harvest: a node with a reported `_count` is a `Collection`, a node with a
/// non-empty `_children` list is a `Composite`, anything else is a `Scalar`
/// leaf holding whatever `LMSGetValue` returned (possibly the empty string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmiNode {
    /// Leaf value as returned by `LMSGetValue`.
    Scalar(String),
    /// Indexed entries `0..count`, each expanded recursively.
    Collection(Vec<CmiNode>),
    /// Named children in harvest order.
    Composite(Vec<(String, CmiNode)>),
}

impl CmiNode {
    /// Build a scalar leaf.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Build a composite node from `(name, node)` pairs, keeping their order.
    pub fn composite<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, CmiNode)>,
        K: Into<String>,
    {
        Self::Composite(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a collection node from indexed entries.
    pub fn collection(items: Vec<CmiNode>) -> Self {
        Self::Collection(items)
    }

    /// The scalar value, if this node is a leaf.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Number of children (collection entries or composite keys); 0 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Collection(items) => items.len(),
            Self::Composite(entries) => entries.len(),
        }
    }

    /// True when the node has no children (always true for scalars).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Collection(_) => "collection",
            Self::Composite(_) => "composite",
        }
    }

    /// Resolve one path segment.
    ///
    /// A composite resolves by name; a collection resolves a purely numeric
    /// segment as an index. A composite that happens to hold numeric keys
    /// resolves them by name, so trees loaded from hand-written JSON behave
    /// the same as harvested ones.
    pub fn child(&self, segment: &str) -> Option<&CmiNode> {
        match self {
            Self::Scalar(_) => None,
            Self::Collection(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)
            }
            Self::Composite(entries) => entries
                .iter()
                .find(|(name, _)| name == segment)
                .map(|(_, node)| node),
        }
    }

    /// Mutable variant of [`CmiNode::child`].
    pub fn child_mut(&mut self, segment: &str) -> Option<&mut CmiNode> {
        match self {
            Self::Scalar(_) => None,
            Self::Collection(items) => {
                let index: usize = segment.parse().ok()?;
                items.get_mut(index)
            }
            Self::Composite(entries) => entries
                .iter_mut()
                .find(|(name, _)| name == segment)
                .map(|(_, node)| node),
        }
    }

    /// Walk a dotted path below this node.
    pub fn lookup(&self, segments: &[&str]) -> Option<&CmiNode> {
        let mut node = self;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Names of composite children in order; stringified indices for a
    /// collection; empty for scalars.
    pub fn child_names(&self) -> Vec<String> {
        match self {
            Self::Scalar(_) => Vec::new(),
            Self::Collection(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            Self::Composite(entries) => entries.iter().map(|(name, _)| name.clone()).collect(),
        }
    }
}

impl fmt::Display for CmiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            other => write!(f, "<{} of {}>", other.kind(), other.len()),
        }
    }
}

impl Serialize for CmiNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Scalar(v) => serializer.serialize_str(v),
            Self::Collection(items) => {
                let mut map = serializer.serialize_map(Some(items.len()))?;
                for (index, item) in items.iter().enumerate() {
                    map.serialize_entry(&index.to_string(), item)?;
                }
                map.end()
            }
            Self::Composite(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (name, node) in entries {
                    map.serialize_entry(name, node)?;
                }
                map.end()
            }
        }
    }
}

struct CmiNodeVisitor;

impl<'de> Visitor<'de> for CmiNodeVisitor {
    type Value = CmiNode;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a string leaf or an object of child nodes")
    }

    fn visit_str<E>(self, v: &str) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(v))
    }

    // Leaves written by hand (fixtures, foreign tools) may carry JSON numbers
    // or booleans; the SCORM convention is strings, so coerce.

    fn visit_bool<E>(self, v: bool) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(v.to_string()))
    }

    fn visit_i64<E>(self, v: i64) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(v.to_string()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(v.to_string()))
    }

    fn visit_f64<E>(self, v: f64) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(v.to_string()))
    }

    fn visit_unit<E>(self) -> Result<CmiNode, E> {
        Ok(CmiNode::Scalar(String::new()))
    }

    fn visit_map<A>(self, mut access: A) -> Result<CmiNode, A::Error>
    where
        A: MapAccess<'de>,
    {
        // MapAccess yields entries in document order, which keeps composite
        // keys in the order the sender constructed them.
        let mut entries: Vec<(String, CmiNode)> = Vec::new();
        while let Some((key, node)) = access.next_entry::<String, CmiNode>()? {
            entries.push((key, node));
        }

        if !entries.is_empty() && entries.iter().all(|(k, _)| path::is_index_segment(k)) {
            // An object keyed entirely by indices is a serialized collection.
            // Order by index; harvested trees are dense 0..n.
            entries.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
            return Ok(CmiNode::Collection(
                entries.into_iter().map(|(_, node)| node).collect(),
            ));
        }

        Ok(CmiNode::Composite(entries))
    }
}

impl<'de> Deserialize<'de> for CmiNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CmiNodeVisitor)
    }
}
