//! Incremental wiring of request-time nodes.
//!
//! [`wire_nodes`] wires a bounded batch of new node ids (typically one
//! collection iteration) against an already-wired form. It never builds a
//! consumer index and never scans nodes outside the batch: producers of new
//! pseudo-nodes are looked up directly, and each new reference gets at most
//! one consumer edge by key lookup.

use indexmap::IndexMap;
use tracing::debug;

use formwire_core::{DependencyGraph, NodeId, NodeSource, ScopeTree};

use crate::config::WiringConfig;
use crate::context::{awaits_iteration, ScopeMembers, WiringContext};
use crate::error::WiringError;
use crate::modules::modules;
use crate::orchestrator::WiringReport;

/// Groups `batch` by owning step, preserving batch order within each step.
pub fn group_by_step(
    nodes: &dyn NodeSource,
    scopes: &ScopeTree,
    batch: &[NodeId],
) -> Result<IndexMap<NodeId, Vec<NodeId>>, WiringError> {
    let mut by_step: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();
    for &id in batch {
        nodes.get(id)?;
        let step = nodes
            .owning_step(id)
            .filter(|&step| scopes.is_step(step))
            .ok_or(WiringError::UnknownStep { id })?;
        by_step.entry(step).or_default().push(id);
    }
    Ok(by_step)
}

/// Wires `batch` into `graph`, running every module's incremental entry
/// point in [`modules`] order for each step the batch touches.
///
/// Nodes of a nested template that is still open are left out; they are
/// wired when that template is instantiated.
pub fn wire_nodes(
    nodes: &dyn NodeSource,
    scopes: &ScopeTree,
    graph: &mut DependencyGraph,
    batch: &[NodeId],
    config: &WiringConfig,
) -> Result<WiringReport, WiringError> {
    let batch: Vec<NodeId> = batch
        .iter()
        .copied()
        .filter(|&id| !nodes.node(id).is_some_and(|node| awaits_iteration(nodes, node)))
        .collect();
    let by_step = group_by_step(nodes, scopes, &batch)?;
    let members = ScopeMembers::default();
    let mut report = WiringReport {
        steps: by_step.len(),
        ..WiringReport::default()
    };

    for (&step, ids) in &by_step {
        let mut ctx = WiringContext::new(nodes, graph, scopes, &members, step, config);
        for module in modules() {
            let stats = module.wire_nodes(&mut ctx, ids)?;
            report.record(module.name(), stats);
        }
    }

    debug!(
        batch = batch.len(),
        steps = report.steps,
        edges = report.edges(),
        "incremental wiring"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesize::synthesize_batch;
    use crate::test_support::FormFixture;
    use formwire_core::{CompiledForm, CoreError, PseudoKey, PseudoKind};

    #[test]
    fn iteration_batch_yields_one_producer_set_and_one_consumer() {
        let mut fx = FormFixture::new();
        fx.field(fx.step, "name");
        let other = fx.reference(fx.step, &["answers", "name"]);
        let wired = fx.wire();
        let before = wired.graph.triples();

        let mut form = wired.form.clone();
        let mut graph = wired.graph.clone();
        let field = form.add_field(fx.step, "item_0_name", "text").unwrap();
        let reference = form.add_reference(fx.step, ["answers", "item_0_name"]).unwrap();
        let created = synthesize_batch(&mut form.nodes, fx.step, &[field, reference]).unwrap();
        let local = wired_pseudo(&form, fx.step, "item_0_name");
        let post = created
            .iter()
            .copied()
            .find(|&id| id != local)
            .unwrap();

        let mut batch = vec![field, reference];
        batch.extend(&created);
        let scopes = ScopeTree::build(&form.nodes).unwrap();
        let report = wire_nodes(&form.nodes, &scopes, &mut graph, &batch, &WiringConfig::default())
            .unwrap();

        assert_eq!(graph.producers_of(local), vec![post]);
        assert_eq!(graph.consumers_of(local), vec![reference]);
        assert_eq!(report.edges(), 2);
        let added: Vec<_> = graph.triples().difference(&before).copied().collect();
        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|&(p, c, _)| p == local || c == local));
        assert!(!graph.consumers_of(local).contains(&other));
    }

    #[test]
    fn nodes_outside_steps_are_rejected() {
        let mut fx = FormFixture::new();
        let orphan = fx.reference(fx.journey, &["answers", "x"]);
        let scopes = ScopeTree::build(&fx.form.nodes).unwrap();
        let mut graph = DependencyGraph::new();
        let err = wire_nodes(&fx.form.nodes, &scopes, &mut graph, &[orphan], &WiringConfig::default())
            .unwrap_err();
        assert!(matches!(err, WiringError::UnknownStep { id } if id == orphan));
    }

    #[test]
    fn missing_batch_node_is_fatal() {
        let fx = FormFixture::new();
        let scopes = ScopeTree::build(&fx.form.nodes).unwrap();
        let mut graph = DependencyGraph::new();
        let err = wire_nodes(
            &fx.form.nodes,
            &scopes,
            &mut graph,
            &[NodeId(9999)],
            &WiringConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WiringError::Core(CoreError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn batch_spanning_steps_is_grouped() {
        let mut fx = FormFixture::new();
        let second = fx.step("/second");
        let a = fx.reference(fx.step, &["query", "a"]);
        let b = fx.reference(second, &["query", "b"]);
        let c = fx.reference(fx.step, &["query", "c"]);
        let scopes = ScopeTree::build(&fx.form.nodes).unwrap();
        let groups = group_by_step(&fx.form.nodes, &scopes, &[a, b, c]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&fx.step], vec![a, c]);
        assert_eq!(groups[&second], vec![b]);
    }

    fn wired_pseudo(form: &CompiledForm, step: NodeId, key: &str) -> NodeId {
        form.nodes
            .pseudo(&PseudoKey::new(PseudoKind::AnswerLocal, step, key))
            .unwrap()
    }
}
