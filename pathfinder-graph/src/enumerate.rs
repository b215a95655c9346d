// SPDX-License-Identifier: Apache-2.0

//! Partial-order (downset) enumeration over a reduced subgraph (spec §4.4).

use crate::subgraph::Subgraph;
use pathfinder_common::CancellationFlag;
use std::collections::{BTreeSet, HashSet};

/// Result of one enumeration run.
#[derive(Debug, Clone, Default)]
pub struct EnumerationOutcome {
    /// Every distinct downset found, as original (whole-program) vertex ids
    /// in a topologically valid application order.
    pub orders: Vec<Vec<usize>>,
    /// The caller's cancellation flag was observed mid-enumeration.
    pub cancelled: bool,
    /// More than `max_perms` distinct downsets exist; enumeration stopped
    /// after accumulating `max_perms` of them (spec §9, `MAX_PERMS`).
    pub over_budget: bool,
}

struct Ctx<'a> {
    sub: &'a Subgraph,
    universe: BTreeSet<usize>,
    in_degree: Vec<usize>,
    visited: Vec<bool>,
    cancel: &'a CancellationFlag,
    limit: usize,
    seen: HashSet<BTreeSet<usize>>,
    outcome: EnumerationOutcome,
    stop: bool,
}

/// Enumerates every downset of `sub`, up to `limit` distinct downsets,
/// cooperatively cancellable via `cancel`.
pub fn enumerate_downsets(sub: &Subgraph, cancel: &CancellationFlag, limit: usize) -> EnumerationOutcome {
    let universe: BTreeSet<usize> = std::iter::once(sub.shadow_root).chain(sub.active_vertices().iter().copied()).collect();

    let mut in_degree = vec![0usize; sub.num_vertices()];
    for &v in &universe {
        in_degree[v] = sub.graph.in_neighbors(v).filter(|p| universe.contains(p)).count();
    }

    let mut ctx = Ctx {
        sub,
        universe,
        in_degree,
        visited: vec![false; sub.num_vertices()],
        cancel,
        limit,
        seen: HashSet::new(),
        outcome: EnumerationOutcome::default(),
        stop: false,
    };

    let mut current = BTreeSet::new();
    dfs(&mut ctx, sub.shadow_root, &mut current);
    ctx.outcome
}

fn dfs(ctx: &mut Ctx<'_>, pick: usize, current: &mut BTreeSet<usize>) {
    if ctx.cancel.is_cancelled() {
        ctx.outcome.cancelled = true;
        ctx.stop = true;
        return;
    }

    ctx.visited[pick] = true;
    let is_root = pick == ctx.sub.shadow_root;
    if !is_root {
        current.insert(original_id(ctx.sub, pick));
    }

    let touched: Vec<usize> = ctx
        .sub
        .graph
        .out_neighbors(pick)
        .filter(|v| ctx.universe.contains(v))
        .collect();
    for &v in &touched {
        ctx.in_degree[v] -= 1;
    }

    if ctx.seen.insert(current.clone()) {
        if ctx.outcome.orders.len() < ctx.limit {
            ctx.outcome.orders.push(current.iter().copied().collect());
        } else {
            ctx.outcome.over_budget = true;
            ctx.stop = true;
        }
    }

    if !ctx.stop {
        let candidates: Vec<usize> = ctx
            .universe
            .iter()
            .copied()
            .filter(|v| !ctx.visited[*v] && ctx.in_degree[*v] == 0)
            .collect();
        for c in candidates {
            dfs(ctx, c, current);
            if ctx.stop {
                break;
            }
        }
    }

    for &v in &touched {
        ctx.in_degree[v] += 1;
    }
    if !is_root {
        current.remove(&original_id(ctx.sub, pick));
    }
    ctx.visited[pick] = false;
}

fn original_id(sub: &Subgraph, sub_vertex: usize) -> usize {
    match sub.original_vertex(sub_vertex) {
        Some(id) => id,
        None => unreachable!("non-root subgraph vertex always carries an original id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::persistence_graph::PersistenceGraph;
    use crate::subgraph::extract;

    fn pg_from(edges: &[(usize, usize)], n: usize) -> PersistenceGraph {
        let mut g = Graph::with_vertices(n);
        for &(u, v) in edges {
            g.add_edge(u, v);
        }
        PersistenceGraph::new(g, (0..n as u64).collect())
    }

    #[test]
    fn two_independent_vertices_yield_four_downsets() {
        let pg = pg_from(&[], 2);
        let h = extract(&pg, &[0, 1]);
        let cancel = CancellationFlag::new();
        let out = enumerate_downsets(&h, &cancel, 512);
        assert_eq!(out.orders.len(), 4);
        let as_sets: HashSet<BTreeSet<usize>> = out.orders.iter().map(|o| o.iter().copied().collect()).collect();
        assert!(as_sets.contains(&BTreeSet::new()));
        assert!(as_sets.contains(&BTreeSet::from([0])));
        assert!(as_sets.contains(&BTreeSet::from([1])));
        assert!(as_sets.contains(&BTreeSet::from([0, 1])));
        assert!(!out.cancelled);
        assert!(!out.over_budget);
    }

    #[test]
    fn chain_of_three_yields_four_downsets() {
        let pg = pg_from(&[(0, 1), (1, 2)], 3);
        let h = extract(&pg, &[0, 1, 2]);
        let cancel = CancellationFlag::new();
        let out = enumerate_downsets(&h, &cancel, 512);
        // {}, {0}, {0,1}, {0,1,2}
        assert_eq!(out.orders.len(), 4);
    }

    #[test]
    fn cancellation_flag_is_observed() {
        let pg = pg_from(&[], 2);
        let h = extract(&pg, &[0, 1]);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let out = enumerate_downsets(&h, &cancel, 512);
        assert!(out.cancelled);
        assert!(out.orders.is_empty());
    }

    #[test]
    fn over_budget_truncates_and_sets_flag() {
        let pg = pg_from(&[], 4); // 4 independent vertices -> 16 downsets
        let h = extract(&pg, &[0, 1, 2, 3]);
        let cancel = CancellationFlag::new();
        let out = enumerate_downsets(&h, &cancel, 5);
        assert_eq!(out.orders.len(), 5);
        assert!(out.over_budget);
    }

    #[test]
    fn single_store_yields_two_orderings() {
        let pg = pg_from(&[], 1);
        let h = extract(&pg, &[0]);
        let cancel = CancellationFlag::new();
        let out = enumerate_downsets(&h, &cancel, 512);
        assert_eq!(out.orders.len(), 2);
    }
}
