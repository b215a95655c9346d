// SPDX-License-Identifier: Apache-2.0

//! Induced-subgraph extraction with a synthetic shadow root, transitive
//! reduction, and POSIX sync-family contraction (spec §4.4).

use crate::graph::Graph;
use crate::persistence_graph::PersistenceGraph;
use std::collections::{BTreeSet, HashMap};

/// A subgraph `H` extracted from a whole-program [`PersistenceGraph`]: a
/// synthetic shadow root plus a copy of the requested vertex set and the
/// edges between them, reduced and (for POSIX) sync-contracted.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub graph: Graph,
    pub shadow_root: usize,
    /// `original[v]` is the whole-program vertex id `v` was copied from, or
    /// `None` for the shadow root.
    original: Vec<Option<usize>>,
    /// Subgraph vertex ids eligible for the order enumerator: every copied
    /// vertex minus any removed by sync contraction.
    active: BTreeSet<usize>,
}

impl Subgraph {
    pub fn original_vertex(&self, sub_vertex: usize) -> Option<usize> {
        self.original[sub_vertex]
    }

    pub fn active_vertices(&self) -> &BTreeSet<usize> {
        &self.active
    }

    pub fn num_vertices(&self) -> usize {
        self.graph.num_vertices()
    }
}

/// Extracts the induced subgraph on `vertex_set` (steps 1-4 of spec §4.4).
/// `vertex_set` holds whole-program vertex ids; duplicates are ignored.
pub fn extract(pg: &PersistenceGraph, vertex_set: &[usize]) -> Subgraph {
    let mut sorted: Vec<usize> = vertex_set.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let shadow_root = 0;
    let mut graph = Graph::with_vertices(sorted.len() + 1);
    let mut original = vec![None];
    let mut orig_to_sub = HashMap::with_capacity(sorted.len());

    for (i, &orig) in sorted.iter().enumerate() {
        let sub = i + 1;
        orig_to_sub.insert(orig, sub);
        original.push(Some(orig));
    }

    let in_set: BTreeSet<usize> = sorted.iter().copied().collect();
    for &orig_u in &sorted {
        for orig_v in pg.graph.out_neighbors(orig_u) {
            if in_set.contains(&orig_v) {
                graph.add_edge(orig_to_sub[&orig_u], orig_to_sub[&orig_v]);
            }
        }
    }

    for &sub in orig_to_sub.values() {
        if graph.in_degree(sub) == 0 {
            graph.add_edge(shadow_root, sub);
        }
    }

    graph.transitive_reduction();

    let active: BTreeSet<usize> = orig_to_sub.values().copied().collect();
    Subgraph {
        graph,
        shadow_root,
        original,
        active,
    }
}

/// POSIX-only post-processing (spec §4.4 step 5): contract every sync-family
/// vertex, rewiring its predecessors directly to its successors, then drop
/// it from the set of vertices the order enumerator will ever select.
/// `is_sync_family` tests a whole-program vertex id.
pub fn contract_sync_family(sub: &mut Subgraph, is_sync_family: impl Fn(usize) -> bool) {
    let sync_vertices: Vec<usize> = sub
        .active
        .iter()
        .copied()
        .filter(|&v| sub.original[v].is_some_and(&is_sync_family))
        .collect();

    for x in sync_vertices {
        let preds: Vec<usize> = sub.graph.in_neighbors(x).collect();
        let succs: Vec<usize> = sub.graph.out_neighbors(x).collect();
        for &w in &preds {
            for &y in &succs {
                sub.graph.add_edge(w, y);
            }
        }
        sub.graph.isolate_vertex(x);
        sub.active.remove(&x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn pg_from(edges: &[(usize, usize)], n: usize) -> PersistenceGraph {
        let mut g = Graph::with_vertices(n);
        for &(u, v) in edges {
            g.add_edge(u, v);
        }
        PersistenceGraph::new(g, (0..n as u64).collect())
    }

    #[test]
    fn disconnected_vertices_all_get_shadow_root_edge() {
        let pg = pg_from(&[], 2);
        let h = extract(&pg, &[0, 1]);
        assert!(h.graph.has_edge(h.shadow_root, 1));
        assert!(h.graph.has_edge(h.shadow_root, 2));
    }

    #[test]
    fn chain_only_gets_root_edge_at_its_head() {
        let pg = pg_from(&[(0, 1), (1, 2)], 3);
        let h = extract(&pg, &[0, 1, 2]);
        assert!(h.graph.has_edge(h.shadow_root, 1));
        assert!(!h.graph.has_edge(h.shadow_root, 2));
        assert!(!h.graph.has_edge(h.shadow_root, 3));
    }

    #[test]
    fn sync_contraction_bridges_over_removed_vertex() {
        // write(0) -> fsync(1) -> write(2)
        let pg = pg_from(&[(0, 1), (1, 2)], 3);
        let mut h = extract(&pg, &[0, 1, 2]);
        contract_sync_family(&mut h, |v| v == 1);
        let fsync_sub_vertex = 2; // whole-program vertex 1 (the fsync) maps to sub-vertex 2
        assert!(!h.active_vertices().contains(&fsync_sub_vertex));
        let write0_sub_vertex = 1;
        let write2_sub_vertex = 3;
        assert!(h.graph.has_edge(write0_sub_vertex, write2_sub_vertex));
    }
}
