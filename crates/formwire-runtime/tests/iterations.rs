// Property-based tests for collection-iteration materialization.
//
// 1. Every materialized iteration gets its own renamed answer with a full
//    producer set, and the shared form is left untouched.
// 2. Materialization order does not change the wiring of an iteration.

use std::sync::Arc;

use proptest::prelude::*;

use formwire_core::{CompiledForm, NodeId, TransitionTrigger};
use formwire_runtime::{AnswerSource, RequestScope};
use formwire_wiring::{WiredForm, WiringConfig};

// ── Fixture ─────────────────────────────────────────────────────────────────

struct Fixture {
    wired: Arc<WiredForm>,
    step: NodeId,
    collection: NodeId,
}

/// `/items` repeats `line` over `data.lines`; each line has `qty` with
/// `formatters` formatters.
fn fixture(formatters: usize) -> Fixture {
    let mut form = CompiledForm::new("order");
    let journey = form.add_journey(None, "checkout").unwrap();
    let step = form.add_step(journey, "/items").unwrap();
    form.add_transition(step, TransitionTrigger::Load).unwrap();
    let source = form.add_reference(step, ["data", "lines"]).unwrap();
    let collection = form.add_collection(step, "line", Some(source)).unwrap();
    let qty = form.add_field(collection, "qty", "number").unwrap();
    for i in 0..formatters {
        form.add_formatter(qty, &format!("f{i}")).unwrap();
    }
    form.add_reference(collection, ["answers", "qty"]).unwrap();

    Fixture {
        wired: Arc::new(WiredForm::wire(form, WiringConfig::default()).unwrap()),
        step,
        collection,
    }
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 128,
        ..ProptestConfig::default()
    })]

    #[test]
    fn each_iteration_has_its_own_answer(
        formatters in 0usize..4,
        indices in prop::collection::btree_set(0usize..20, 1..6),
    ) {
        let fx = fixture(formatters);
        let base_edges = fx.wired.graph.edge_count();
        let mut request = RequestScope::new(Arc::clone(&fx.wired));
        for &index in &indices {
            request.materialize_iteration(fx.collection, index).unwrap();
        }

        for &index in &indices {
            let code = format!("line_{index}_qty");
            let producers = request.answer_producers(fx.step, &code);
            // load + post + formatters; no default value declared
            prop_assert_eq!(producers.len(), formatters + 2);
            prop_assert_eq!(producers[0].0, AnswerSource::Load);
            prop_assert_eq!(producers[1].0, AnswerSource::Post);

            let answer = request.answer_node(fx.step, &code).unwrap();
            prop_assert_eq!(request.edges_from(answer).count(), 1);
        }
        prop_assert_eq!(fx.wired.graph.edge_count(), base_edges);
    }

    #[test]
    fn order_of_materialization_does_not_matter(
        indices in prop::collection::vec(0usize..10, 1..5),
    ) {
        let fx = fixture(1);
        let mut forward = RequestScope::new(Arc::clone(&fx.wired));
        let mut backward = RequestScope::new(Arc::clone(&fx.wired));
        for &index in &indices {
            forward.materialize_iteration(fx.collection, index).unwrap();
        }
        for &index in indices.iter().rev() {
            backward.materialize_iteration(fx.collection, index).unwrap();
        }

        prop_assert_eq!(forward.overlay_nodes().len(), backward.overlay_nodes().len());
        prop_assert_eq!(
            forward.overlay_graph().edge_count(),
            backward.overlay_graph().edge_count()
        );
        for &index in &indices {
            let code = format!("line_{index}_qty");
            let f: Vec<AnswerSource> = forward
                .answer_producers(fx.step, &code)
                .into_iter()
                .map(|(source, _)| source)
                .collect();
            let b: Vec<AnswerSource> = backward
                .answer_producers(fx.step, &code)
                .into_iter()
                .map(|(source, _)| source)
                .collect();
            prop_assert_eq!(f, b);
        }
    }
}
