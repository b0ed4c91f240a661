//! Compile-time wiring of a whole form.
//!
//! [`WiredForm::wire`] runs once per form registration:
//! 1. derive the scope tree and per-step membership
//! 2. synthesize every step's pseudo-nodes
//! 3. check every step's collection template references, then run every
//!    module, in [`modules`] order, over every step
//!
//! The result is immutable and meant to be shared behind an `Arc`.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use formwire_core::{CompiledForm, DependencyGraph, NodeSource, ScopeTree};

use crate::config::WiringConfig;
use crate::context::{StepMembership, WiringContext};
use crate::error::WiringError;
use crate::modules::{modules, WireStats};
use crate::synthesize::synthesize_step;

/// Counts gathered while wiring a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WiringReport {
    pub steps: usize,
    pub pseudo_nodes: usize,
    /// Edges added per module, in run order.
    pub modules: IndexMap<&'static str, WireStats>,
}

impl WiringReport {
    pub fn record(&mut self, module: &'static str, stats: WireStats) {
        *self.modules.entry(module).or_default() += stats;
    }

    /// Total edges added across all modules.
    pub fn edges(&self) -> usize {
        self.modules.values().map(WireStats::total).sum()
    }
}

/// A compiled form together with its pseudo-nodes and dependency graph.
#[derive(Debug, Clone)]
pub struct WiredForm {
    pub form: CompiledForm,
    pub scopes: ScopeTree,
    pub membership: StepMembership,
    pub graph: DependencyGraph,
    pub config: WiringConfig,
    pub report: WiringReport,
}

impl WiredForm {
    /// Synthesizes and wires `form`.
    pub fn wire(mut form: CompiledForm, config: WiringConfig) -> Result<Self, WiringError> {
        let scopes = ScopeTree::build(&form.nodes)?;
        let membership = StepMembership::build(&form.nodes);

        let mut report = WiringReport {
            steps: scopes.steps().len(),
            ..WiringReport::default()
        };
        for &step in scopes.steps() {
            report.pseudo_nodes +=
                synthesize_step(&mut form.nodes, step, membership.members(step))?.len();
        }

        let mut graph = DependencyGraph::new();
        let wired = wire_all(&form.nodes, &scopes, &membership, &mut graph, &config)?;
        for (module, stats) in wired.modules {
            report.record(module, stats);
        }

        info!(
            form = %form.code,
            steps = report.steps,
            pseudo_nodes = report.pseudo_nodes,
            edges = graph.edge_count(),
            "form wired"
        );
        Ok(WiredForm {
            form,
            scopes,
            membership,
            graph,
            config,
            report,
        })
    }

    /// Runs every module again over the already-wired graph. Wiring is
    /// idempotent, so the returned report counts zero new edges.
    pub fn rewire(&mut self) -> Result<WiringReport, WiringError> {
        wire_all(
            &self.form.nodes,
            &self.scopes,
            &self.membership,
            &mut self.graph,
            &self.config,
        )
    }

    /// Id above every node of the form; request overlays allocate from here.
    pub fn node_watermark(&self) -> u32 {
        self.form.nodes.next_id()
    }

    /// Id above every edge of the form graph.
    pub fn edge_watermark(&self) -> u32 {
        self.graph.next_edge_id()
    }
}

/// Runs every module over every step of `scopes`, adding edges to `graph`.
pub fn wire_all(
    nodes: &dyn NodeSource,
    scopes: &ScopeTree,
    membership: &StepMembership,
    graph: &mut DependencyGraph,
    config: &WiringConfig,
) -> Result<WiringReport, WiringError> {
    let mut report = WiringReport {
        steps: scopes.steps().len(),
        ..WiringReport::default()
    };
    for &step in scopes.steps() {
        let mut ctx = WiringContext::new(nodes, graph, scopes, membership.members(step), step, config);
        ctx.check_template_references()?;
        for module in modules() {
            let stats = module.wire(&mut ctx)?;
            debug!(
                module = module.name(),
                step = %step,
                producers = stats.producers,
                consumers = stats.consumers,
                "module pass"
            );
            report.record(module.name(), stats);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FormFixture;
    use formwire_core::{EdgeRole, PseudoKind};

    #[test]
    fn report_lists_modules_in_run_order() {
        let mut fx = FormFixture::new();
        fx.field(fx.step, "email");
        let wired = fx.wire();
        let names: Vec<&str> = wired.report.modules.keys().copied().collect();
        assert_eq!(names, vec!["post", "query", "params", "data", "answer", "self", "item"]);
        assert_eq!(wired.report.steps, 1);
        assert_eq!(wired.report.pseudo_nodes, 2);
        assert_eq!(wired.report.edges(), wired.graph.edge_count());
    }

    #[test]
    fn rewiring_adds_nothing() {
        let mut fx = FormFixture::new();
        fx.load(fx.journey);
        let field = fx.field(fx.step, "email");
        fx.formatter(field, "trim");
        fx.reference(fx.step, &["answers", "email"]);
        fx.reference(fx.step, &["answers", "elsewhere"]);
        fx.reference(fx.step, &["data", "lookup"]);
        let mut wired = fx.wire();
        let before = wired.graph.triples();

        let again = wired.rewire().unwrap();
        assert_eq!(again.edges(), 0);
        assert_eq!(wired.graph.triples(), before);
    }

    #[test]
    fn pseudo_nodes_are_scoped_per_step() {
        let mut fx = FormFixture::new();
        let second = fx.step("/second");
        fx.field(fx.step, "email");
        let reader = fx.reference(second, &["answers", "email"]);
        let wired = fx.wire();

        let local = wired.pseudo(PseudoKind::AnswerLocal, fx.step, "email");
        let remote = wired.pseudo(PseudoKind::AnswerRemote, second, "email");
        assert_ne!(local, remote);
        assert!(wired.graph.consumers_of(local).is_empty());
        assert_eq!(wired.graph.consumers_of(remote), vec![reader]);
    }

    #[test]
    fn email_scenario_counts_producers() {
        for with_load in [false, true] {
            let mut fx = FormFixture::new();
            if with_load {
                fx.load(fx.step);
            }
            let field = fx.field(fx.step, "email");
            fx.formatter(field, "trim");
            fx.formatter(field, "toLowerCase");
            let wired = fx.wire();

            let local = wired.pseudo(PseudoKind::AnswerLocal, fx.step, "email");
            let producers: Vec<_> = wired.graph.edges_to(local).collect();
            assert_eq!(producers.len(), if with_load { 4 } else { 3 });
            assert_eq!(
                producers.iter().filter(|e| e.role == EdgeRole::Effect).count(),
                usize::from(with_load)
            );
        }
    }

    #[test]
    fn reject_fails_registration_for_template_references() {
        let mut fx = FormFixture::new();
        let source = fx.reference(fx.step, &["data", "people"]);
        let collection = fx.collection(fx.step, "person", Some(source));
        fx.field(collection, "name");
        let short = fx.reference(collection, &["answers"]);

        assert!(FormFixture::try_wire_form(fx.form.clone(), &WiringConfig::default()).is_ok());
        let reject = WiringConfig {
            malformed_references: crate::config::MalformedReferencePolicy::Reject,
            ..WiringConfig::default()
        };
        let err = FormFixture::try_wire_form(fx.form.clone(), &reject).unwrap_err();
        assert!(matches!(err, WiringError::MalformedReference { id, .. } if id == short));
    }

    #[test]
    fn watermarks_sit_above_form_ids() {
        let mut fx = FormFixture::new();
        fx.field(fx.step, "email");
        let wired = fx.wire();
        assert!(wired.form.nodes.iter().all(|n| n.id.0 < wired.node_watermark()));
        assert!(wired
            .graph
            .edges()
            .iter()
            .all(|e| e.id.0 < wired.edge_watermark()));
    }
}
