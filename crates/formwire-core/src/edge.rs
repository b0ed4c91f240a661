//! Dependency edge types.
//!
//! A [`DependencyEdge`] records that the value of its producer feeds the
//! value of its consumer. Edges are scheduling information, not a vote: a
//! pseudo-node routinely has several producers (its post value, each
//! formatter, its default, the nearest load-transition), and which one
//! supplies the current value is decided later by the answer history.
//!
//! Edges carry ids only. Node data stays in the node store so that graph and
//! store can be cloned and serialized independently.

use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, NodeId};
use crate::reference::Namespace;

/// What kind of dependency an edge models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRole {
    /// The producer's value is read by the consumer.
    DataFlow,
    /// A transition's effects produce the consumer's value.
    Effect,
}

/// Well-known property names recorded on producer edges.
pub mod property {
    /// Post pseudo-node feeding an answer.
    pub const POST: &str = "post";
    /// Default-value expression feeding an answer.
    pub const DEFAULT_VALUE: &str = "defaultValue";
    /// Load-transition feeding an answer or data pseudo-node.
    pub const ON_LOAD: &str = "onLoad";
    /// Collection source expression feeding an item pseudo-node.
    pub const SOURCE: &str = "source";

    const FORMATTER_PREFIX: &str = "formatters[";

    /// Positional property name of the formatter at `index`.
    pub fn formatter(index: usize) -> String {
        format!("{FORMATTER_PREFIX}{index}]")
    }

    /// Parses a name produced by [`formatter`] back to its index.
    pub fn parse_formatter(name: &str) -> Option<usize> {
        name.strip_prefix(FORMATTER_PREFIX)?
            .strip_suffix(']')?
            .parse()
            .ok()
    }

    /// Positional property name of one collection iteration's item.
    pub fn item(index: usize) -> String {
        format!("items[{index}]")
    }
}

/// Descriptive metadata attached to an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeMetadata {
    /// Field code (or other lookup key) the edge was wired for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_code: Option<String>,
    /// Property of the consumer the producer fills, e.g. `formatters[1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Namespace of the reference expression, for consumer edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Namespace>,
}

impl EdgeMetadata {
    /// Metadata naming only a lookup key.
    pub fn keyed(code: impl Into<String>) -> Self {
        EdgeMetadata {
            field_code: Some(code.into()),
            ..EdgeMetadata::default()
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_reference(mut self, namespace: Namespace) -> Self {
        self.reference = Some(namespace);
        self
    }
}

/// A directed dependency between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: EdgeId,
    pub producer: NodeId,
    pub consumer: NodeId,
    pub role: EdgeRole,
    #[serde(default)]
    pub metadata: EdgeMetadata,
}

impl DependencyEdge {
    /// The identity used for duplicate suppression.
    pub fn triple(&self) -> (NodeId, NodeId, EdgeRole) {
        (self.producer, self.consumer, self.role)
    }
}
