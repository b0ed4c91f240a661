//! Evaluation order derivation.
//!
//! Wiring never checks for cycles: a default-value expression that reads its
//! own field's answer is accepted at wiring time. The cycle surfaces here,
//! when the evaluation layer asks for a recompute order, as
//! [`CoreError::CycleDetected`].

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::edge::EdgeRole;
use crate::error::CoreError;
use crate::graph::DependencyGraph;
use crate::id::NodeId;

/// Builds a petgraph view over one or more dependency graphs (a shared form
/// graph plus a request overlay, typically).
pub fn dependency_view<'a>(
    graphs: impl IntoIterator<Item = &'a DependencyGraph>,
) -> DiGraphMap<NodeId, EdgeRole> {
    let mut view = DiGraphMap::new();
    for graph in graphs {
        for edge in graph.edges() {
            view.add_edge(edge.producer, edge.consumer, edge.role);
        }
    }
    view
}

/// Returns every node that takes part in a dependency, producers before
/// their consumers.
pub fn evaluation_order<'a>(
    graphs: impl IntoIterator<Item = &'a DependencyGraph>,
) -> Result<Vec<NodeId>, CoreError> {
    let view = dependency_view(graphs);
    toposort(&view, None).map_err(|cycle| CoreError::CycleDetected {
        node: cycle.node_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeMetadata;

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|&n| n == id).unwrap()
    }

    #[test]
    fn producers_come_before_consumers() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(NodeId(1), NodeId(2), EdgeRole::DataFlow, EdgeMetadata::default());
        graph.add_edge(NodeId(2), NodeId(3), EdgeRole::DataFlow, EdgeMetadata::default());
        graph.add_edge(NodeId(4), NodeId(2), EdgeRole::Effect, EdgeMetadata::default());

        let order = evaluation_order([&graph]).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, NodeId(1)) < position(&order, NodeId(2)));
        assert!(position(&order, NodeId(4)) < position(&order, NodeId(2)));
        assert!(position(&order, NodeId(2)) < position(&order, NodeId(3)));
    }

    #[test]
    fn overlay_edges_join_the_base_order() {
        let mut base = DependencyGraph::new();
        base.add_edge(NodeId(1), NodeId(2), EdgeRole::DataFlow, EdgeMetadata::default());
        let mut overlay = DependencyGraph::starting_at(1);
        overlay.add_edge(NodeId(2), NodeId(10), EdgeRole::DataFlow, EdgeMetadata::default());

        let order = evaluation_order([&base, &overlay]).unwrap();
        assert!(position(&order, NodeId(2)) < position(&order, NodeId(10)));
    }

    #[test]
    fn cycle_is_reported() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(NodeId(1), NodeId(2), EdgeRole::DataFlow, EdgeMetadata::default());
        graph.add_edge(NodeId(2), NodeId(1), EdgeRole::DataFlow, EdgeMetadata::default());

        match evaluation_order([&graph]) {
            Err(CoreError::CycleDetected { node }) => {
                assert!(node == NodeId(1) || node == NodeId(2));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn empty_graph_has_empty_order() {
        let graph = DependencyGraph::new();
        assert!(evaluation_order([&graph]).unwrap().is_empty());
    }
}
