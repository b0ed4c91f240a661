//! DependencyGraph: the typed edge set produced by the wiring passes.
//!
//! [`DependencyGraph`] stores [`DependencyEdge`]s in insertion order and keeps
//! per-node incoming/outgoing indices so that `edges_to` / `edges_from` are
//! proportional to the node's degree. Adding a `(producer, consumer, role)`
//! triple that is already present is a no-op, which keeps repeated wiring
//! passes from growing parallel edges.
//!
//! A graph may start its edge ids at an offset. Request overlays do this so
//! their edge ids never collide with the shared form graph's.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::edge::{DependencyEdge, EdgeMetadata, EdgeRole};
use crate::id::{EdgeId, NodeId};

type EdgeList = SmallVec<[usize; 4]>;

/// Directed, typed dependency edges over node ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredEdges", into = "StoredEdges")]
pub struct DependencyGraph {
    edges: Vec<DependencyEdge>,
    incoming: HashMap<NodeId, EdgeList>,
    outgoing: HashMap<NodeId, EdgeList>,
    seen: HashSet<(NodeId, NodeId, EdgeRole)>,
    first_edge_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEdges {
    #[serde(default)]
    first_edge_id: u32,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Creates an empty graph whose edge ids start at `first_edge_id`.
    pub fn starting_at(first_edge_id: u32) -> Self {
        DependencyGraph {
            first_edge_id,
            ..DependencyGraph::default()
        }
    }

    /// Adds a directed edge from `producer` to `consumer`.
    ///
    /// Returns `false` without touching the graph if an edge with the same
    /// `(producer, consumer, role)` triple already exists.
    pub fn add_edge(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        role: EdgeRole,
        metadata: EdgeMetadata,
    ) -> bool {
        if !self.seen.insert((producer, consumer, role)) {
            return false;
        }
        let slot = self.edges.len();
        let id = EdgeId(self.first_edge_id + slot as u32);
        self.edges.push(DependencyEdge {
            id,
            producer,
            consumer,
            role,
            metadata,
        });
        self.outgoing.entry(producer).or_default().push(slot);
        self.incoming.entry(consumer).or_default().push(slot);
        true
    }

    /// Copies every edge of `other` into this graph, keeping metadata and
    /// skipping triples already present. Returns the number of edges added.
    ///
    /// Used to build a merged read-only snapshot of a shared form graph and a
    /// request overlay.
    pub fn extend_from(&mut self, other: &DependencyGraph) -> usize {
        other
            .edges()
            .iter()
            .filter(|edge| {
                self.add_edge(edge.producer, edge.consumer, edge.role, edge.metadata.clone())
            })
            .count()
    }

    /// Removes every edge whose id is at or above `watermark`, undoing the
    /// edges added after reading [`next_edge_id`](Self::next_edge_id).
    pub fn truncate(&mut self, watermark: u32) {
        let keep = watermark.saturating_sub(self.first_edge_id) as usize;
        if keep >= self.edges.len() {
            return;
        }
        for edge in self.edges.drain(keep..) {
            self.seen.remove(&edge.triple());
        }
        for index in [&mut self.incoming, &mut self.outgoing] {
            for slots in index.values_mut() {
                slots.retain(|slot| *slot < keep);
            }
            index.retain(|_, slots| !slots.is_empty());
        }
    }

    /// Returns `true` if an edge with this triple exists.
    pub fn contains_edge(&self, producer: NodeId, consumer: NodeId, role: EdgeRole) -> bool {
        self.seen.contains(&(producer, consumer, role))
    }

    /// Edges whose consumer is `consumer`, in insertion order.
    pub fn edges_to(&self, consumer: NodeId) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.slots(&self.incoming, consumer)
    }

    /// Edges whose producer is `producer`, in insertion order.
    pub fn edges_from(&self, producer: NodeId) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.slots(&self.outgoing, producer)
    }

    /// Producers of `consumer`, in insertion order.
    pub fn producers_of(&self, consumer: NodeId) -> Vec<NodeId> {
        self.edges_to(consumer).map(|edge| edge.producer).collect()
    }

    /// Consumers of `producer`, in insertion order.
    pub fn consumers_of(&self, producer: NodeId) -> Vec<NodeId> {
        self.edges_from(producer).map(|edge| edge.consumer).collect()
    }

    /// Looks up an edge by id.
    pub fn edge(&self, id: EdgeId) -> Option<&DependencyEdge> {
        let slot = id.0.checked_sub(self.first_edge_id)? as usize;
        self.edges.get(slot)
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The id the next added edge will receive.
    pub fn next_edge_id(&self) -> u32 {
        self.first_edge_id + self.edges.len() as u32
    }

    /// The set of `(producer, consumer, role)` triples, for comparing graphs
    /// independently of insertion order and edge ids.
    pub fn triples(&self) -> HashSet<(NodeId, NodeId, EdgeRole)> {
        self.seen.clone()
    }

    fn slots<'a>(
        &'a self,
        index: &'a HashMap<NodeId, EdgeList>,
        node: NodeId,
    ) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        index
            .get(&node)
            .into_iter()
            .flat_map(|slots| slots.iter())
            .map(move |&slot| &self.edges[slot])
    }
}

impl From<StoredEdges> for DependencyGraph {
    fn from(stored: StoredEdges) -> Self {
        let mut graph = DependencyGraph::starting_at(stored.first_edge_id);
        for edge in stored.edges {
            graph.add_edge(edge.producer, edge.consumer, edge.role, edge.metadata);
        }
        graph
    }
}

impl From<DependencyGraph> for StoredEdges {
    fn from(graph: DependencyGraph) -> Self {
        StoredEdges {
            first_edge_id: graph.first_edge_id,
            edges: graph.edges,
        }
    }
}
