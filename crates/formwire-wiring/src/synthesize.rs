//! Pseudo-node synthesis.
//!
//! Before wiring, every data source a step can read gets its pseudo-node:
//! - each field: its post value and its local answer (origin: the field)
//! - each `answers` reference to a code with no local answer: a remote answer
//! - each `post`, `query`, `params` and `data` reference: the keyed
//!   pseudo-node it reads
//! - each collection or iteration: its item (origin: the collection or
//!   iteration)
//!
//! All creation goes through [`PseudoSink::find_or_create_pseudo`], so
//! running synthesis twice creates nothing the second time. Short reference
//! paths are passed over here; the wiring modules apply the
//! malformed-reference policy to them.

use tracing::debug;

use formwire_core::{
    item_key, Namespace, NodeId, NodeKind, PseudoKey, PseudoKind, PseudoSink, ReferenceNode,
};

use crate::context::{awaits_iteration, ScopeMembers};
use crate::error::WiringError;

/// Synthesizes the pseudo-nodes of one step from its precomputed members.
///
/// Returns the ids of the pseudo-nodes created.
pub fn synthesize_step(
    nodes: &mut dyn PseudoSink,
    step: NodeId,
    members: &ScopeMembers,
) -> Result<Vec<NodeId>, WiringError> {
    let created = synthesize(
        nodes,
        step,
        &members.fields,
        &members.references,
        &members.collections,
    )?;
    debug!(step = %step, created = created.len(), "synthesized pseudo-nodes");
    Ok(created)
}

/// Synthesizes the pseudo-nodes a batch of request-time nodes needs.
///
/// Fields, references and iterations in `batch` are picked out by kind;
/// everything else is ignored, as are nodes of a nested template that is
/// still open (see [`awaits_iteration`]). Returns the ids of the pseudo-nodes
/// created.
pub fn synthesize_batch(
    nodes: &mut dyn PseudoSink,
    step: NodeId,
    batch: &[NodeId],
) -> Result<Vec<NodeId>, WiringError> {
    let mut fields = Vec::new();
    let mut references = Vec::new();
    let mut item_origins = Vec::new();
    for &id in batch {
        let node = nodes.get(id)?;
        if awaits_iteration(&*nodes, node) {
            continue;
        }
        match node.kind {
            NodeKind::Field(_) => fields.push(id),
            NodeKind::Reference(_) => references.push(id),
            NodeKind::Collection(_) | NodeKind::Iteration(_) => item_origins.push(id),
            _ => {}
        }
    }
    synthesize(nodes, step, &fields, &references, &item_origins)
}

fn synthesize(
    nodes: &mut dyn PseudoSink,
    step: NodeId,
    fields: &[NodeId],
    references: &[NodeId],
    item_origins: &[NodeId],
) -> Result<Vec<NodeId>, WiringError> {
    let mut created = Vec::new();
    let mut record = |(id, fresh): (NodeId, bool)| {
        if fresh {
            created.push(id);
        }
    };

    for &field in fields {
        let code = match nodes.get(field)?.kind.as_field() {
            Some(definition) => definition.code.clone(),
            None => continue,
        };
        record(nodes.find_or_create_pseudo(PseudoKind::Post, step, &code, Some(field))?);
        record(nodes.find_or_create_pseudo(PseudoKind::AnswerLocal, step, &code, Some(field))?);
    }

    for &reference in references {
        let Some((namespace, key)) = keyed_target(nodes.get(reference)?.kind.as_reference()) else {
            continue;
        };
        let kind = match namespace {
            Namespace::Answers => {
                let local = PseudoKey::new(PseudoKind::AnswerLocal, step, key.as_str());
                if nodes.pseudo(&local).is_some() {
                    continue;
                }
                PseudoKind::AnswerRemote
            }
            Namespace::Post => PseudoKind::Post,
            Namespace::Query => PseudoKind::Query,
            Namespace::Params => PseudoKind::Params,
            Namespace::Data => PseudoKind::Data,
            Namespace::SelfValue | Namespace::Item => continue,
        };
        record(nodes.find_or_create_pseudo(kind, step, &key, None)?);
    }

    for &origin in item_origins {
        let key = match &nodes.get(origin)?.kind {
            NodeKind::Collection(_) => item_key(origin, None),
            NodeKind::Iteration(iteration) => item_key(iteration.collection, Some(iteration.index)),
            _ => continue,
        };
        record(nodes.find_or_create_pseudo(PseudoKind::Item, step, &key, Some(origin))?);
    }

    Ok(created)
}

/// Namespace and lookup key of a well-formed keyed reference.
fn keyed_target(reference: Option<&ReferenceNode>) -> Option<(Namespace, String)> {
    let reference = reference?;
    let namespace = reference.namespace().filter(Namespace::is_keyed)?;
    let key = reference.lookup_key(namespace)?;
    Some((namespace, key.to_string()))
}
