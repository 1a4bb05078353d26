//! A small DAG of edges between consecutively numbered nodes.
//!
//! The cell owns an arena of edges keyed by stable id plus an adjacency
//! index from positional keys to ids. Structural growth rewrites the
//! adjacency index and renumbers positions; the arena and the stable ids
//! are untouched, so an edge's identity survives any number of splits.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use rand::RngCore;

use crate::error::GraphError;
use crate::graph::plan::{build_plan, ForwardPlan};
use crate::graph::{CellId, Edge, EdgeId, EdgeKey, NodeId};
use crate::ops::{Catalog, EdgeDim};
use crate::tensor::Tensor;

pub struct Cell {
    id: CellId,
    entry_dim: EdgeDim,
    post_dim: EdgeDim,
    catalog: Catalog,
    next_edge: u64,
    edges: HashMap<EdgeId, Edge>,
    adjacency: BTreeMap<EdgeKey, EdgeId>,
    plan: ForwardPlan,
    stale: bool,
}

impl Cell {
    /// Builds a cell holding the single initial edge `0->1` at the entry
    /// dimension. `post_dim` is the stride-1 dimension used downstream of a
    /// reduction edge once it splits.
    pub fn new(id: CellId, entry_dim: EdgeDim, post_dim: EdgeDim, catalog: Catalog) -> Result<Self> {
        let mut cell = Cell {
            id,
            entry_dim,
            post_dim,
            catalog,
            next_edge: 0,
            edges: HashMap::new(),
            adjacency: BTreeMap::new(),
            plan: ForwardPlan::default(),
            stale: true,
        };
        let first = cell.mint_id();
        let edge = Edge::new(first, cell.entry_dim, &cell.catalog, Vec::new())?;
        cell.edges.insert(first, edge);
        cell.adjacency.insert(EdgeKey::new(0, 1), first);
        cell.rebuild_order();
        Ok(cell)
    }

    fn mint_id(&mut self) -> EdgeId {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        id
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn entry_dim(&self) -> EdgeDim {
        self.entry_dim
    }

    /// Recomputes the topological forward order from the adjacency index.
    /// Must run after every structural change; construction and
    /// [`Cell::split_edge`] invoke it themselves. Idempotent.
    pub fn rebuild_order(&mut self) {
        self.plan = build_plan(&self.adjacency);
        self.stale = false;
    }

    pub fn forward_order(&self) -> &ForwardPlan {
        &self.plan
    }

    /// Highest destination node; the cell's sole sink.
    pub fn output_node(&self) -> NodeId {
        self.plan.output_node()
    }

    pub fn n_nodes(&self) -> usize {
        self.plan.output_node() as usize + 1
    }

    pub fn n_edges(&self) -> usize {
        self.adjacency.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    pub fn id_at(&self, key: EdgeKey) -> Option<EdgeId> {
        self.adjacency.get(&key).copied()
    }

    pub fn edge_at(&self, key: EdgeKey) -> Option<&Edge> {
        self.id_at(key).map(|id| self.arena_edge(id))
    }

    pub fn edge_mut_at(&mut self, key: EdgeKey) -> Option<&mut Edge> {
        let id = self.id_at(key)?;
        Some(
            self.edges
                .get_mut(&id)
                .expect("adjacency points at a missing edge"),
        )
    }

    /// Edges in adjacency (deterministic) order.
    pub fn edges_in_order(&self) -> impl Iterator<Item = (EdgeKey, &Edge)> + '_ {
        self.adjacency
            .iter()
            .map(move |(&key, &id)| (key, self.arena_edge(id)))
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> + '_ {
        self.edges.values_mut()
    }

    fn arena_edge(&self, id: EdgeId) -> &Edge {
        self.edges
            .get(&id)
            .expect("adjacency points at a missing edge")
    }

    /// Evaluates the cell in the precomputed order. Node 0 is seeded with
    /// `x`; converging edges merge by addition (which assumes the factory
    /// scales candidate outputs consistently); a source node's stored value
    /// is discarded once its last outgoing edge has run. `mute` omits
    /// exactly the keys it marks with `0.0`.
    pub fn forward(
        &self,
        x: &Tensor,
        drop_prob: f32,
        mute: Option<&BTreeMap<EdgeKey, f64>>,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor> {
        if self.stale {
            return Err(GraphError::StaleOrder { cell: self.id }.into());
        }
        let mut values: HashMap<NodeId, Tensor> = HashMap::new();
        values.insert(0, x.clone());
        for step in self.plan.steps() {
            let omit = mute
                .and_then(|m| m.get(&step.key))
                .is_some_and(|&v| v == 0.0);
            let src = values
                .get(&step.key.src)
                .with_context(|| format!("node {} read before any edge wrote it", step.key.src))?;
            let out = self
                .arena_edge(step.edge)
                .forward(src, drop_prob, omit, rng)?;
            match values.get_mut(&step.key.dst) {
                Some(acc) => acc.add_assign(&out)?,
                None => {
                    values.insert(step.key.dst, out);
                }
            }
            if step.last_read {
                values.remove(&step.key.src);
            }
        }
        values
            .remove(&self.plan.output_node())
            .context("forward order produced no value at the output node")
    }

    /// Replaces the edge at `key = (i, j)` with three edges: fresh edges
    /// `(i, j)` and `(j, j+1)` restricted to the operation kinds still alive
    /// on the original, and the original edge object itself bridging
    /// `(i, j+1)` with its statistics reset. Every other endpoint index
    /// `>= j` shifts up by one, opening the slot for the new node. Returns
    /// the ids of the two freshly built edges.
    pub fn split_edge(&mut self, key: EdgeKey) -> Result<(EdgeId, EdgeId)> {
        let parent_id = *self
            .adjacency
            .get(&key)
            .ok_or(GraphError::UnknownEdge { cell: self.id, key })?;
        let parent = self.arena_edge(parent_id);
        if parent.is_dormant() {
            return Err(GraphError::DormantSplit { cell: self.id, key }.into());
        }

        let narrowed = self.catalog.restricted(parent.surviving_kinds())?;
        let parent_dim = parent.dim();
        // A reduction edge keeps its stride on the first hop; the second hop
        // runs at the post-reduction dimension.
        let (a_dim, b_dim) = if parent_dim.stride > 1 {
            (parent_dim, self.post_dim)
        } else {
            (parent_dim, parent_dim)
        };
        let mut lineage = parent.lineage().to_vec();
        lineage.push(parent_id);

        let a_id = self.mint_id();
        let b_id = self.mint_id();
        let edge_a = Edge::new(a_id, a_dim, &narrowed, lineage.clone())?;
        let edge_b = Edge::new(b_id, b_dim, &narrowed, lineage)?;

        let j = key.dst;
        let mut shifted: Vec<(EdgeKey, EdgeId)> = Vec::with_capacity(self.adjacency.len() + 2);
        for (&k, &id) in &self.adjacency {
            if k == key {
                continue;
            }
            let src = if k.src >= j { k.src + 1 } else { k.src };
            let dst = if k.dst >= j { k.dst + 1 } else { k.dst };
            shifted.push((EdgeKey::new(src, dst), id));
        }
        shifted.push((key, a_id));
        shifted.push((EdgeKey::new(j, j + 1), b_id));
        shifted.push((EdgeKey::new(key.src, j + 1), parent_id));

        self.edges.insert(a_id, edge_a);
        self.edges.insert(b_id, edge_b);
        self.edges
            .get_mut(&parent_id)
            .expect("split parent vanished from the arena")
            .reset_growth();

        self.adjacency = shifted.into_iter().collect();
        self.stale = true;
        self.rebuild_order();
        Ok((a_id, b_id))
    }

    /// Runs every edge's pruning sweep; returns the aggregate removal count.
    pub fn deadhead(&mut self, interval: usize) -> usize {
        let mut removed = 0;
        for edge in self.edges.values_mut() {
            removed += edge.deadhead(interval);
        }
        removed
    }

    /// Sum of the cell's active operation footprints, in KiB.
    pub fn size_kib(&self) -> f64 {
        self.edges_in_order()
            .map(|(_, edge)| edge.edge_size_kib())
            .sum()
    }

    pub fn param_count(&self) -> u64 {
        self.edges_in_order()
            .map(|(_, edge)| edge.param_count())
            .sum()
    }

    /// Sum of every operation count across live edges.
    pub fn op_count(&self) -> usize {
        self.edges_in_order().map(|(_, edge)| edge.num_ops()).sum()
    }
}
