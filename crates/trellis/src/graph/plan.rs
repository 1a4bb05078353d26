//! Precomputed topological evaluation order for a cell.
//!
//! Evaluation must never walk the raw edge mapping: the plan fixes the order
//! once per structural change, and flags each source node's final outgoing
//! edge so its stored activation can be dropped as soon as nothing else
//! reads it.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::graph::{EdgeId, EdgeKey, NodeId};

/// One evaluation step: which edge to run and whether its source value dies
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    pub key: EdgeKey,
    pub edge: EdgeId,
    /// True on the last outgoing edge of `key.src`; the node's stored value
    /// is discarded after this step.
    pub last_read: bool,
}

/// The full forward order plus the synthesized output node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardPlan {
    steps: Vec<PlanStep>,
    output_node: NodeId,
}

impl ForwardPlan {
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Highest destination index over all edges; the cell's sole sink.
    pub fn output_node(&self) -> NodeId {
        self.output_node
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds the plan from the adjacency index: source nodes ascending, each
/// source's outgoing edges in index order.
pub(crate) fn build_plan(adjacency: &BTreeMap<EdgeKey, EdgeId>) -> ForwardPlan {
    let mut outgoing: BTreeMap<NodeId, SmallVec<[(EdgeKey, EdgeId); 4]>> = BTreeMap::new();
    let mut output_node = 0;
    for (&key, &edge) in adjacency {
        if key.dst > output_node {
            output_node = key.dst;
        }
        outgoing.entry(key.src).or_default().push((key, edge));
    }

    let mut steps = Vec::with_capacity(adjacency.len());
    for (_, edges) in outgoing {
        let last = edges.len() - 1;
        for (i, (key, edge)) in edges.into_iter().enumerate() {
            steps.push(PlanStep {
                key,
                edge,
                last_read: i == last,
            });
        }
    }
    ForwardPlan { steps, output_node }
}
