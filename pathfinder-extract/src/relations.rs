// SPDX-License-Identifier: Apache-2.0

//! Representative Relations (spec §4.6): the `σ` correspondence between two
//! Update Mechanisms, the induced-subgraph and covers relations built on
//! top of it, and the grouping algorithm that turns a bag of UMs into
//! Update-Mechanism Groups.

use crate::pm_extract::event_of;
use crate::type_layout::{TypeLayout, TypeOracle};
use crate::um::{UpdateMechanism, UpdateMechanismGroup, VertexId};
use pathfinder_graph::{Graph, PersistenceGraph};
use pathfinder_trace::{Event, EventKind, Trace};
use std::collections::{HashMap, HashSet};

/// Which crash-state relation groups an Update-Mechanism Group (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `S covers L` (PM default): `L`'s constraints are a subset of `S`'s.
    Covers,
    /// `S` is isomorphic to an induced subgraph of `L` (PM optional, POSIX always).
    InducedSubgraph,
}

fn frame_at_function<'a>(bt: &'a [pathfinder_trace::StackFrame], f: &str) -> Option<&'a pathfinder_trace::StackFrame> {
    bt.iter().find(|fr| fr.function.as_deref() == Some(f))
}

/// PM equivalence: true iff the two stores touch the same field of `T`, or
/// (for non-struct types) have identical backtraces (spec §4.6).
pub fn equivalent_in_type(trace: &Trace, pg: &PersistenceGraph, oracle: &dyn TypeOracle, s: VertexId, l: VertexId) -> bool {
    let es = event_of(trace, pg, s);
    let el = event_of(trace, pg, l);
    let (EventKind::Store { address: addr_s, .. }, EventKind::Store { address: addr_l, .. }) = (&es.kind, &el.kind) else {
        return false;
    };

    match (oracle.locate(*addr_s), oracle.locate(*addr_l)) {
        (Some((base_s, layout_s)), Some((base_l, layout_l))) => match (layout_s, layout_l) {
            (TypeLayout::Struct { name: ns, .. }, TypeLayout::Struct { name: nl, .. }) if ns == nl => {
                layout_s.field_at(addr_s - base_s) == layout_l.field_at(addr_l - base_l)
            }
            _ => es.backtrace == el.backtrace,
        },
        _ => false,
    }
}

/// POSIX equivalence: true iff both backtraces have matching frames at
/// function `f` (same file/line/address), or (when `f` appears in neither)
/// the full backtraces match (spec §4.6).
pub fn equivalent_in_function(a: &Event, b: &Event, f: &str) -> bool {
    match (frame_at_function(&a.backtrace, f), frame_at_function(&b.backtrace, f)) {
        (Some(fa), Some(fb)) => fa.file == fb.file && fa.line == fb.line && fa.binary_address == fb.binary_address,
        (None, None) => a.backtrace == b.backtrace,
        _ => false,
    }
}

/// Builds `σ: S -> L` by scanning `L` in order and, for each `s ∈ S` in
/// order, picking the first unmapped `ℓ ∈ L` satisfying `equiv(s, ℓ)`.
/// Returns `None` if some `s` cannot be mapped (spec §4.6).
pub fn build_sigma(l: &[VertexId], s: &[VertexId], equiv: impl Fn(VertexId, VertexId) -> bool) -> Option<HashMap<VertexId, VertexId>> {
    let mut sigma = HashMap::new();
    let mut used: HashSet<VertexId> = HashSet::new();
    for &sv in s {
        let mapped = l.iter().copied().find(|lv| !used.contains(lv) && equiv(sv, *lv));
        match mapped {
            Some(lv) => {
                sigma.insert(sv, lv);
                used.insert(lv);
            }
            None => return None,
        }
    }
    Some(sigma)
}

fn edges_within(graph: &Graph, vs: &[VertexId]) -> HashSet<(VertexId, VertexId)> {
    let set: HashSet<VertexId> = vs.iter().copied().collect();
    let mut edges = HashSet::new();
    for &u in vs {
        for v in graph.out_neighbors(u) {
            if set.contains(&v) {
                edges.insert((u, v));
            }
        }
    }
    edges
}

fn relates_with_sigma(graph: &Graph, s: &[VertexId], sigma: &HashMap<VertexId, VertexId>, kind: RelationKind) -> bool {
    let e_s = edges_within(graph, s);
    let image: Vec<VertexId> = s.iter().map(|v| sigma[v]).collect();
    let e_l = edges_within(graph, &image);
    let sigma_e_s: HashSet<(VertexId, VertexId)> = e_s.iter().map(|&(u, v)| (sigma[&u], sigma[&v])).collect();

    match kind {
        RelationKind::InducedSubgraph => sigma_e_s == e_l,
        RelationKind::Covers => e_l.iter().all(|e| sigma_e_s.contains(e)),
    }
}

/// True iff `s` relates to `l` under `kind`, building `σ` with `equiv`.
pub fn um_relates(graph: &Graph, l: &UpdateMechanism, s: &UpdateMechanism, equiv: impl Fn(VertexId, VertexId) -> bool, kind: RelationKind) -> bool {
    match build_sigma(l, s, equiv) {
        Some(sigma) => relates_with_sigma(graph, s, &sigma, kind),
        None => false,
    }
}

/// Splits a bag of Update Mechanisms by contiguity on event-id (spec §4.5
/// "Grouping per function": "split each UM by DBSCAN clustering on event-id
/// (ε=10, min_pts=1) to re-form near-contiguous UMs"). Flattens every vertex
/// across the bag, sorts by event timestamp, and cuts wherever consecutive
/// ids differ by more than ε: with `min_pts=1` every point is its own core
/// point, so a DBSCAN cluster on 1-D data is exactly a maximal run of points
/// each within ε of its neighbor, i.e. a contiguity split at gaps > ε.
pub fn split_by_clustering(bag: &[UpdateMechanism], vertex_ts: &[u64]) -> Vec<UpdateMechanism> {
    const EPSILON: u64 = 10;

    let mut vertices: Vec<VertexId> = bag.iter().flatten().copied().collect();
    vertices.sort_by_key(|&v| vertex_ts[v]);
    vertices.dedup();

    let mut splits: Vec<UpdateMechanism> = Vec::new();
    let mut current: UpdateMechanism = Vec::new();
    for v in vertices {
        if let Some(&last) = current.last() {
            if vertex_ts[v].saturating_sub(vertex_ts[last]) > EPSILON {
                splits.push(std::mem::take(&mut current));
            }
        }
        current.push(v);
    }
    if !current.is_empty() {
        splits.push(current);
    }
    splits
}

/// Groups a bag of Update Mechanisms (all within one type `T` or function
/// `F`) per spec §4.6's grouping algorithm: sort by ascending internal-edge
/// count, then stable-sort by descending size; place each UM in every
/// existing group whose representative relates to it, or start a new group.
pub fn group_update_mechanisms(
    graph: &Graph,
    mut ums: Vec<UpdateMechanism>,
    equiv: impl Fn(VertexId, VertexId) -> bool,
    kind: RelationKind,
) -> Vec<UpdateMechanismGroup> {
    ums.sort_by_key(|um| edges_within(graph, um).len());
    ums.sort_by_key(|um| std::cmp::Reverse(um.len()));

    let mut groups: Vec<UpdateMechanismGroup> = Vec::new();
    for um in ums {
        let mut placed = false;
        for group in &mut groups {
            if um_relates(graph, group.representative(), &um, &equiv, kind) {
                group.push(um.clone());
                placed = true;
            }
        }
        if !placed {
            groups.push(UpdateMechanismGroup::new(um));
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfinder_graph::Graph as G;

    #[test]
    fn sigma_maps_in_scan_order_and_fails_when_unmappable() {
        let l = vec![10, 11, 12];
        let s = vec![1, 2];
        // s[0] equiv to l[1] only, s[1] equiv to l[0] only
        let sigma = build_sigma(&l, &s, |sv, lv| (sv == 1 && lv == 11) || (sv == 2 && lv == 10)).unwrap();
        assert_eq!(sigma[&1], 11);
        assert_eq!(sigma[&2], 10);

        let none = build_sigma(&l, &s, |_, _| false);
        assert!(none.is_none());
    }

    #[test]
    fn induced_subgraph_requires_exact_edge_match() {
        let mut g = G::with_vertices(4);
        g.add_edge(0, 1);
        g.add_edge(2, 3);
        let l = vec![0, 1];
        let s = vec![2, 3];
        let sigma: HashMap<VertexId, VertexId> = [(2, 0), (3, 1)].into_iter().collect();
        assert!(relates_with_sigma(&g, &s, &sigma, RelationKind::InducedSubgraph));
    }

    #[test]
    fn covers_allows_l_with_fewer_edges_than_sigma_of_s() {
        let mut g = G::with_vertices(4);
        g.add_edge(0, 1); // L has the edge
        // S has no edge between 2,3
        let s = vec![2, 3];
        let sigma: HashMap<VertexId, VertexId> = [(2, 0), (3, 1)].into_iter().collect();
        assert!(relates_with_sigma(&g, &s, &sigma, RelationKind::Covers));
        assert!(!relates_with_sigma(&g, &s, &sigma, RelationKind::InducedSubgraph));
    }

    #[test]
    fn split_by_clustering_cuts_at_gaps_over_epsilon_and_dedups() {
        // ts: 0 1 2 15 16 40 — gaps of 13 and 24 exceed epsilon=10, so three
        // clusters form; vertex 1 appears in two input UMs and is kept once.
        let vertex_ts = vec![0, 1, 2, 15, 16, 40];
        let bag = vec![vec![0, 1], vec![1, 2], vec![3], vec![4], vec![5]];
        let splits = split_by_clustering(&bag, &vertex_ts);
        assert_eq!(splits, vec![vec![0, 1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn grouping_places_um_in_every_relating_group() {
        let g = G::with_vertices(6);
        let ums = vec![vec![0, 1], vec![2, 3], vec![4, 5]];
        let groups = group_update_mechanisms(&g, ums, |_, _| true, RelationKind::Covers);
        // all equal size, all mutually relate under a trivial always-true
        // equivalence with no edges anywhere: first UM becomes the sole
        // representative and every later one joins its group.
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }
}
