// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

/// A directed acyclic graph over dense `0..n` vertex ids. Edges carry no
/// data; callers attach meaning to vertex ids through a separate mapping.
///
/// Insertion order of vertex ids is significant: every graph built by this
/// crate assigns ids so that `u < v` implies the underlying event's
/// timestamp at `u` is earlier than at `v` (spec §3's vertex-identity
/// invariant).
#[derive(Debug, Clone, Default)]
pub struct Graph {
    out_edges: Vec<BTreeSet<usize>>,
    in_edges: Vec<BTreeSet<usize>>,
}

impl Graph {
    pub fn with_vertices(n: usize) -> Self {
        Self {
            out_edges: vec![BTreeSet::new(); n],
            in_edges: vec![BTreeSet::new(); n],
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.out_edges.len()
    }

    pub fn add_vertex(&mut self) -> usize {
        self.out_edges.push(BTreeSet::new());
        self.in_edges.push(BTreeSet::new());
        self.out_edges.len() - 1
    }

    /// Adds edge `u -> v`. Returns `true` if it was not already present.
    pub fn add_edge(&mut self, u: usize, v: usize) -> bool {
        if u == v {
            return false;
        }
        let added = self.out_edges[u].insert(v);
        self.in_edges[v].insert(u);
        added
    }

    pub fn remove_edge(&mut self, u: usize, v: usize) {
        self.out_edges[u].remove(&v);
        self.in_edges[v].remove(&u);
    }

    /// Removes `v` and every edge touching it.
    pub fn isolate_vertex(&mut self, v: usize) {
        let outs: Vec<usize> = self.out_edges[v].iter().copied().collect();
        let ins: Vec<usize> = self.in_edges[v].iter().copied().collect();
        for w in outs {
            self.in_edges[w].remove(&v);
        }
        for w in ins {
            self.out_edges[w].remove(&v);
        }
        self.out_edges[v].clear();
        self.in_edges[v].clear();
    }

    pub fn out_neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.out_edges[v].iter().copied()
    }

    pub fn in_neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.in_edges[v].iter().copied()
    }

    pub fn in_degree(&self, v: usize) -> usize {
        self.in_edges[v].len()
    }

    pub fn out_degree(&self, v: usize) -> usize {
        self.out_edges[v].len()
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.out_edges[u].contains(&v)
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.out_edges
            .iter()
            .enumerate()
            .flat_map(|(u, vs)| vs.iter().map(move |&v| (u, v)))
    }

    pub fn vertices(&self) -> impl Iterator<Item = usize> {
        0..self.num_vertices()
    }

    /// Forward transitive closure (everything reachable from `v`, excluding
    /// `v` itself), computed by requiring callers to process vertices in
    /// decreasing index order so successors already have `reach` filled in.
    pub fn reachable_from(&self, v: usize, reach: &[BTreeSet<usize>]) -> BTreeSet<usize> {
        let mut acc = BTreeSet::new();
        for w in self.out_neighbors(v) {
            acc.insert(w);
            acc.extend(reach[w].iter().copied());
        }
        acc
    }

    /// Full transitive closure, vertex-indexed. Valid only when edges always
    /// go from a lower to a higher index (true for every graph this crate
    /// builds), since it processes vertices from the highest index down.
    pub fn transitive_closure(&self) -> Vec<BTreeSet<usize>> {
        let n = self.num_vertices();
        let mut reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for v in (0..n).rev() {
            reach[v] = self.reachable_from(v, &reach);
        }
        reach
    }

    /// Removes every edge `(u, v)` for which an alternate path `u -> w -> .. -> v`
    /// already exists, preserving reachability (spec §4.4 step 4).
    pub fn transitive_reduction(&mut self) {
        let reach = self.transitive_closure();
        let mut to_remove = Vec::new();
        for u in self.vertices() {
            let outs: Vec<usize> = self.out_neighbors(u).collect();
            for &v in &outs {
                let redundant = outs.iter().any(|&w| w != v && reach[w].contains(&v));
                if redundant {
                    to_remove.push((u, v));
                }
            }
        }
        for (u, v) in to_remove {
            self.remove_edge(u, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitive_reduction_drops_shortcut_edge() {
        let mut g = Graph::with_vertices(3);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(0, 2); // redundant: 0->1->2 already implies it
        g.transitive_reduction();
        assert!(g.has_edge(0, 1));
        assert!(g.has_edge(1, 2));
        assert!(!g.has_edge(0, 2));
    }

    #[test]
    fn transitive_reduction_preserves_reachability() {
        let mut g = Graph::with_vertices(4);
        g.add_edge(0, 1);
        g.add_edge(1, 3);
        g.add_edge(0, 2);
        g.add_edge(2, 3);
        g.add_edge(0, 3);
        let before = g.transitive_closure();
        g.transitive_reduction();
        let after = g.transitive_closure();
        assert_eq!(before, after);
        assert!(!g.has_edge(0, 3));
    }

    #[test]
    fn isolate_vertex_removes_all_incident_edges() {
        let mut g = Graph::with_vertices(3);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.isolate_vertex(1);
        assert_eq!(g.in_degree(1), 0);
        assert_eq!(g.out_degree(1), 0);
        assert!(!g.has_edge(0, 1));
        assert!(!g.has_edge(1, 2));
    }
}
