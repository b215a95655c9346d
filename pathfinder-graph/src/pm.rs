// SPDX-License-Identifier: Apache-2.0

//! Persistence graph construction for PM (persistent-memory) traces (spec
//! §4.2). One pass over the trace, maintaining a dirty tree, a flush tree,
//! and a clean list of not-yet-durable and durable store vertices.

use crate::graph::Graph;
use crate::persistence_graph::PersistenceGraph;
use pathfinder_trace::{cacheline_range, ByteRange, EventKind, Trace};

/// A coarse bucket of cacheline ranges to store-vertex lists. Overlap is
/// resolved at entry granularity: an entry that overlaps the query range is
/// removed (and its vertices handed to the caller) in its entirety rather
/// than split byte-for-byte, which matches the common case of same-sized,
/// cacheline-aligned stores and keeps the bookkeeping simple.
#[derive(Debug, Default)]
struct RangeBucket {
    entries: Vec<(ByteRange, Vec<usize>)>,
}

impl RangeBucket {
    fn take_overlapping(&mut self, range: &ByteRange) -> Vec<usize> {
        let mut taken = Vec::new();
        self.entries.retain_mut(|(r, vs)| {
            if r.overlaps(range) {
                taken.append(vs);
                false
            } else {
                true
            }
        });
        taken
    }

    fn insert(&mut self, range: ByteRange, vertices: Vec<usize>) {
        if !vertices.is_empty() {
            self.entries.push((range, vertices));
        }
    }
}

/// Builds the PM whole-program persistence graph. Vertices are the trace's
/// `Store` events, in timestamp order.
pub fn build(trace: &Trace) -> PersistenceGraph {
    let store_count = trace.events.iter().filter(|e| e.kind.is_store()).count();
    let mut graph = Graph::with_vertices(store_count);
    let mut event_ts = Vec::with_capacity(store_count);

    let mut dirty_tree = RangeBucket::default();
    let mut flush_tree = RangeBucket::default();
    let mut clean_list: Vec<usize> = Vec::new();

    for event in &trace.events {
        match &event.kind {
            EventKind::Store { address, size, .. } => {
                let clr = cacheline_range(*address, *size as u64);
                let s = event_ts.len();
                event_ts.push(event.timestamp);

                // Flush-tree overlap: every prior *clean* store that predates
                // the overlapped (flushed-but-unfenced) store must precede `s`
                // (Intel-TSO constraint), then that portion moves out of the
                // flush tree (it's now subsumed by the new store).
                let flushed = flush_tree.take_overlapping(&clr);
                for &overlapped in &flushed {
                    for &clean in &clean_list {
                        if event_ts[clean] < event_ts[overlapped] {
                            graph.add_edge(clean, overlapped);
                        }
                    }
                }

                // Dirty-tree overlap: any not-yet-flushed store touching the
                // same cacheline must precede `s`.
                let dirty = dirty_tree.take_overlapping(&clr);
                for &prior in &dirty {
                    graph.add_edge(prior, s);
                }

                // Every already-clean store precedes every new store
                // (it is durable before `s` is even issued).
                for &clean in &clean_list {
                    graph.add_edge(clean, s);
                }

                dirty_tree.insert(clr, vec![s]);
            }
            EventKind::Flush { address, size } => {
                let clr = cacheline_range(*address, *size as u64);
                let moved = dirty_tree.take_overlapping(&clr);
                flush_tree.insert(clr, moved);
            }
            EventKind::Fence => {
                for (_, vs) in flush_tree.entries.drain(..) {
                    clean_list.extend(vs);
                }
            }
            EventKind::MSync { address, size } => {
                let clr = cacheline_range(*address, *size as u64);
                let moved = dirty_tree.take_overlapping(&clr);
                clean_list.extend(moved);
            }
            _ => {}
        }
    }

    PersistenceGraph::new(graph, event_ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfinder_trace::pm as pm_ingest;

    fn trace_of(records: &str) -> Trace {
        let input = format!("START||{records}||STOP");
        pm_ingest::parse(&input, false).unwrap()
    }

    #[test]
    fn two_independent_stores_have_no_edge() {
        let trace = trace_of("STORE;1;0x0;8;0000000000000001;||STORE;1;0x40;8;0000000000000002;");
        let g = build(&trace);
        assert_eq!(g.num_vertices(), 2);
        assert_eq!(g.graph.edges().count(), 0);
    }

    #[test]
    fn store_flush_fence_store_same_cacheline_orders_them() {
        let trace = trace_of(
            "STORE;1;0x0;8;0000000000000001;||FLUSH;1;0x0;8;||FENCE;1;||STORE;1;0x0;8;0000000000000002;",
        );
        let g = build(&trace);
        assert_eq!(g.num_vertices(), 2);
        assert!(g.graph.has_edge(0, 1));
    }

    #[test]
    fn dirty_overlap_orders_prior_store_before_later_one() {
        let trace = trace_of("STORE;1;0x0;8;0000000000000001;||STORE;1;0x4;8;0000000000000002;");
        let g = build(&trace);
        assert!(g.graph.has_edge(0, 1));
    }

    #[test]
    fn msync_drains_dirty_range_to_clean() {
        let trace = trace_of(
            "STORE;1;0x0;8;0000000000000001;||MSYNC;1;0x0;8;||STORE;1;0x0;8;0000000000000002;",
        );
        let g = build(&trace);
        assert!(g.graph.has_edge(0, 1));
    }
}
