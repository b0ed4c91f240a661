//! Keyed request-source families: post, query, params and data.
//!
//! All four share one shape. A pseudo-node keyed by name is consumed by every
//! reference `[namespace, name, ...]` of the step. Post, query and params
//! values come from the request itself and have no producer in the graph;
//! data values are produced by the nearest load-transition.

use tracing::debug;

use formwire_core::{NodeId, PseudoKind};

use super::{
    batch_keyed_references, batch_pseudo_nodes, connect_consumers, connect_on_load, WireStats,
    WiringModule,
};
use crate::context::WiringContext;
use crate::error::WiringError;
use crate::index::ReferenceIndex;

/// Where a keyed family's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyedProducer {
    /// Supplied by the request; nothing in the graph produces it.
    External,
    /// Produced by the effects of the nearest load-transition.
    OnLoad,
}

/// Wiring for one keyed family.
#[derive(Debug, Clone, Copy)]
pub struct KeyedSourceModule {
    name: &'static str,
    kind: PseudoKind,
    producer: KeyedProducer,
}

pub static POST: KeyedSourceModule =
    KeyedSourceModule::new("post", PseudoKind::Post, KeyedProducer::External);
pub static QUERY: KeyedSourceModule =
    KeyedSourceModule::new("query", PseudoKind::Query, KeyedProducer::External);
pub static PARAMS: KeyedSourceModule =
    KeyedSourceModule::new("params", PseudoKind::Params, KeyedProducer::External);
pub static DATA: KeyedSourceModule =
    KeyedSourceModule::new("data", PseudoKind::Data, KeyedProducer::OnLoad);

impl KeyedSourceModule {
    pub const fn new(name: &'static str, kind: PseudoKind, producer: KeyedProducer) -> Self {
        KeyedSourceModule {
            name,
            kind,
            producer,
        }
    }

    pub fn kind(&self) -> PseudoKind {
        self.kind
    }

    pub fn producer(&self) -> KeyedProducer {
        self.producer
    }

    fn wire_producers(&self, ctx: &mut WiringContext<'_>, pseudo: NodeId, key: &str) -> usize {
        match self.producer {
            KeyedProducer::External => 0,
            KeyedProducer::OnLoad => connect_on_load(ctx, pseudo, key),
        }
    }
}

impl WiringModule for KeyedSourceModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn wire(&self, ctx: &mut WiringContext<'_>) -> Result<WireStats, WiringError> {
        let namespace = self.kind.namespace();
        let index = ReferenceIndex::build(ctx, namespace)?;
        let mut stats = WireStats::default();

        for id in ctx.find_pseudo_nodes_by_type(self.kind) {
            let pseudo = ctx.pseudo(id)?;
            stats.producers += self.wire_producers(ctx, id, &pseudo.key);
            stats.consumers +=
                connect_consumers(ctx, id, &pseudo.key, namespace, index.get(&pseudo.key));
        }

        debug!(
            module = self.name,
            step = %ctx.current_step(),
            references = index.len(),
            producers = stats.producers,
            consumers = stats.consumers,
            "wired keyed source"
        );
        Ok(stats)
    }

    fn wire_nodes(
        &self,
        ctx: &mut WiringContext<'_>,
        batch: &[NodeId],
    ) -> Result<WireStats, WiringError> {
        let namespace = self.kind.namespace();
        let mut stats = WireStats::default();

        for (id, pseudo) in batch_pseudo_nodes(ctx, batch, self.kind)? {
            stats.producers += self.wire_producers(ctx, id, &pseudo.key);
        }
        for (reference, key) in batch_keyed_references(ctx, batch, namespace)? {
            if let Some(pseudo) = ctx.find_pseudo_node(self.kind, key) {
                stats.consumers += connect_consumers(ctx, pseudo, key, namespace, &[reference]);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FormFixture;
    use formwire_core::{EdgeRole, Namespace, NodeSource, TransitionTrigger};

    #[test]
    fn query_values_have_consumers_but_no_producers() {
        let mut fx = FormFixture::new();
        let page = fx.reference(fx.step, &["query", "page"]);
        let other = fx.reference(fx.step, &["query", "sort"]);
        fx.load(fx.step);
        let wired = fx.wire();

        let pseudo = wired.pseudo(PseudoKind::Query, fx.step, "page");
        assert!(wired.graph.producers_of(pseudo).is_empty());
        assert_eq!(wired.graph.consumers_of(pseudo), vec![page]);
        let sort = wired.pseudo(PseudoKind::Query, fx.step, "sort");
        assert_eq!(wired.graph.consumers_of(sort), vec![other]);
    }

    #[test]
    fn data_is_produced_by_nearest_load_transition() {
        let mut fx = FormFixture::new();
        let journey_load = fx.load(fx.journey);
        let reference = fx.reference(fx.step, &["data", "address", "postcode"]);
        let wired = fx.wire();

        let data = wired.pseudo(PseudoKind::Data, fx.step, "address");
        let producers: Vec<_> = wired.graph.edges_to(data).collect();
        assert_eq!(producers.len(), 1);
        assert_eq!(producers[0].producer, journey_load);
        assert_eq!(producers[0].role, EdgeRole::Effect);
        assert_eq!(wired.graph.consumers_of(data), vec![reference]);
        let consumer = wired.graph.edges_from(data).next().unwrap();
        assert_eq!(consumer.metadata.reference, Some(Namespace::Data));
    }

    #[test]
    fn step_load_shadows_journey_load() {
        let mut fx = FormFixture::new();
        fx.load(fx.journey);
        let step_load = fx.load(fx.step);
        fx.reference(fx.step, &["data", "x"]);
        let wired = fx.wire();

        let data = wired.pseudo(PseudoKind::Data, fx.step, "x");
        assert_eq!(wired.graph.producers_of(data), vec![step_load]);
    }

    #[test]
    fn data_without_load_transition_has_no_producer() {
        let mut fx = FormFixture::new();
        fx.transition(fx.step, TransitionTrigger::Submit);
        fx.reference(fx.step, &["data", "x"]);
        let wired = fx.wire();

        let data = wired.pseudo(PseudoKind::Data, fx.step, "x");
        assert!(wired.graph.producers_of(data).is_empty());
    }

    #[test]
    fn post_references_read_post_pseudo_nodes() {
        let mut fx = FormFixture::new();
        fx.field(fx.step, "email");
        let raw = fx.reference(fx.step, &["post", "email"]);
        let wired = fx.wire();

        let post = wired.pseudo(PseudoKind::Post, fx.step, "email");
        assert!(wired.graph.consumers_of(post).contains(&raw));
        assert!(wired.form.nodes.node(post).is_some());
    }

    #[test]
    fn keyed_modules_do_not_cross_namespaces() {
        let mut fx = FormFixture::new();
        let query = fx.reference(fx.step, &["query", "id"]);
        let params = fx.reference(fx.step, &["params", "id"]);
        let wired = fx.wire();

        let q = wired.pseudo(PseudoKind::Query, fx.step, "id");
        let p = wired.pseudo(PseudoKind::Params, fx.step, "id");
        assert_eq!(wired.graph.consumers_of(q), vec![query]);
        assert_eq!(wired.graph.consumers_of(p), vec![params]);
    }
}
