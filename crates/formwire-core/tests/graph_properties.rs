// Property-based tests for the dependency graph and evaluation order.
//
// 1. On any acyclic edge set, every producer is ordered before its consumers.
// 2. Closing a path into a cycle is always reported.
// 3. Merging a graph into itself (or twice) adds nothing.

use proptest::prelude::*;

use formwire_core::schedule::evaluation_order;
use formwire_core::{CoreError, DependencyGraph, EdgeMetadata, EdgeRole, NodeId};

// ── Generators ──────────────────────────────────────────────────────────────

/// Edges between ids 0..16 that only ever point from a lower to a higher id,
/// so the graph is acyclic.
fn arb_dag_edges() -> impl Strategy<Value = Vec<(u32, u32, bool)>> {
    prop::collection::vec((0u32..16, 0u32..16, prop::bool::ANY), 0..40).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(a, b, _)| a != b)
            .map(|(a, b, effect)| (a.min(b), a.max(b), effect))
            .collect()
    })
}

fn build(edges: &[(u32, u32, bool)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for &(producer, consumer, effect) in edges {
        let role = if effect { EdgeRole::Effect } else { EdgeRole::DataFlow };
        graph.add_edge(NodeId(producer), NodeId(consumer), role, EdgeMetadata::default());
    }
    graph
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn producers_precede_consumers(edges in arb_dag_edges()) {
        let graph = build(&edges);
        let order = evaluation_order([&graph]).unwrap();
        let position = |id: NodeId| order.iter().position(|&n| n == id).unwrap();
        for edge in graph.edges() {
            prop_assert!(position(edge.producer) < position(edge.consumer));
        }
    }

    #[test]
    fn closing_a_path_is_a_cycle(length in 2u32..10) {
        let mut graph = DependencyGraph::new();
        for i in 0..length {
            graph.add_edge(NodeId(i), NodeId(i + 1), EdgeRole::DataFlow, EdgeMetadata::default());
        }
        graph.add_edge(NodeId(length), NodeId(0), EdgeRole::DataFlow, EdgeMetadata::default());
        let is_cycle = matches!(
            evaluation_order([&graph]),
            Err(CoreError::CycleDetected { node }) if node.0 <= length
        );
        prop_assert!(is_cycle);
    }

    #[test]
    fn merging_is_idempotent(a in arb_dag_edges(), b in arb_dag_edges()) {
        let mut merged = build(&a);
        let other = build(&b);
        merged.extend_from(&other);
        let once = merged.triples();

        prop_assert_eq!(merged.extend_from(&other), 0);
        let copy = merged.clone();
        prop_assert_eq!(merged.extend_from(&copy), 0);
        prop_assert_eq!(merged.triples(), once.clone());
        prop_assert_eq!(merged.edge_count(), once.len());
    }
}
