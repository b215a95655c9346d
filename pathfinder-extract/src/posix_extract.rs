// SPDX-License-Identifier: Apache-2.0

//! POSIX variant of the Update-Mechanism Extractor: per-thread stack-tree
//! construction via a small state machine, and representative-range
//! extension (spec §4.5).

use crate::stack_tree::StackTree;
use crate::um::{UpdateMechanism, VertexId};
use pathfinder_trace::{common_prefix_depth, resolved_prefix, Event, EventKind, Trace};
use std::collections::HashMap;

fn is_vertex_event(e: &Event) -> bool {
    !e.kind.is_marker() && !matches!(e.kind, EventKind::OpBegin { .. } | EventKind::OpEnd { .. })
}

/// The stack tree built from a trace, plus the vertex-id -> event-timestamp
/// mapping every downstream graph/C4 step shares (vertex ids here are dense
/// over the same filtered event set `pathfinder_graph::posix::build` uses).
pub struct PosixExtraction {
    pub tree: StackTree,
    pub vertex_ts: Vec<u64>,
}

enum State {
    Idle,
    InUm { um: UpdateMechanism, protocol_depth: usize, protocol_node: usize },
}

/// Builds the per-thread stack trees and returns the combined forest (spec
/// §4.5 POSIX variant). `max_um_size` caps an in-progress UM's length.
pub fn extract_posix(trace: &Trace, max_um_size: usize) -> PosixExtraction {
    let vertices: Vec<(VertexId, &Event)> = trace.events.iter().filter(|e| is_vertex_event(e)).enumerate().collect();
    let vertex_ts: Vec<u64> = vertices.iter().map(|(_, e)| e.timestamp).collect();

    let mut by_tid: HashMap<u64, Vec<(VertexId, &Event)>> = HashMap::new();
    for &(v, e) in &vertices {
        by_tid.entry(e.tid).or_default().push((v, e));
    }

    let mut tree = StackTree::new();
    let mut tids: Vec<u64> = by_tid.keys().copied().collect();
    tids.sort_unstable();
    for tid in tids {
        run_thread(&mut tree, &by_tid[&tid], max_um_size);
    }

    PosixExtraction { tree, vertex_ts }
}

fn run_thread(tree: &mut StackTree, events: &[(VertexId, &Event)], max_um_size: usize) {
    let mut state = State::Idle;

    for w in events.windows(2) {
        let (lv, l) = w[0];
        let (rv, r) = w[1];

        let l_resolved = resolved_prefix(&l.backtrace);
        let r_resolved = resolved_prefix(&r.backtrace);
        let depth = common_prefix_depth(&l_resolved, &r_resolved);

        let l_names: Vec<String> = l_resolved.iter().map(|f| f.function.clone().unwrap_or_default()).collect();
        let l_path = tree.ensure_path(&l_names);

        let protocol_index = if depth < l_names.len() { depth } else { l_names.len().saturating_sub(1) };
        let protocol_node = if l_names.is_empty() { tree.root() } else { l_path[protocol_index + 1] };

        let prev = std::mem::replace(&mut state, State::Idle);
        state = match prev {
            State::Idle => State::InUm { um: vec![lv, rv], protocol_depth: depth, protocol_node },
            State::InUm { mut um, protocol_depth, protocol_node: cur_protocol_node } => {
                if depth > protocol_depth {
                    // `rv`'s scope is deeper than the UM in progress; the
                    // last vertex pushed onto it (L of this pair) actually
                    // belongs to the new, deeper scope.
                    let popped = um.pop();
                    tree.attach(cur_protocol_node, um);
                    let mut new_um: Vec<VertexId> = popped.into_iter().collect();
                    new_um.push(rv);
                    State::InUm { um: new_um, protocol_depth: depth, protocol_node }
                } else if depth == protocol_depth {
                    um.push(rv);
                    if um.len() >= max_um_size {
                        tree.attach(cur_protocol_node, um);
                        State::Idle
                    } else {
                        State::InUm { um, protocol_depth, protocol_node: cur_protocol_node }
                    }
                } else {
                    tree.attach(cur_protocol_node, um);
                    State::Idle
                }
            }
        };
    }

    if let State::InUm { um, protocol_node, .. } = state {
        if !um.is_empty() {
            tree.attach(protocol_node, um);
        }
    }
}

/// Extends a representative to a continuous event range: the min/max event
/// ids in `um`, a margin on each side (clamped to trace bounds), including
/// every non-marker event in that window (spec §4.5).
pub fn extend_representative(um: &UpdateMechanism, vertex_ts: &[u64], trace: &Trace, margin: u64) -> UpdateMechanism {
    let (min_v, max_v) = match (um.iter().min(), um.iter().max()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return um.clone(),
    };
    let min_ts = vertex_ts[min_v].saturating_sub(margin);
    let trace_last = trace.last_ts().unwrap_or(vertex_ts[max_v]);
    let max_ts = (vertex_ts[max_v] + margin).min(trace_last);

    vertex_ts
        .iter()
        .enumerate()
        .filter(|(_, &ts)| ts >= min_ts && ts <= max_ts)
        .map(|(v, _)| v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfinder_trace::posix as posix_ingest;

    #[test]
    fn two_threads_each_form_at_least_one_um() {
        // two independent writes on different threads, each with a flat
        // one-frame backtrace: depth stays 0 across the pair, so a single
        // UM per thread should be attached under that frame's function.
        let input = "0,1,WRITE,3,/a,0,4,AQIDBA==;\n1,1,WRITE,3,/a,4,4,AQIDBA==;\n2,2,WRITE,5,/b,0,4,AQIDBA==;\n3,2,WRITE,5,/b,4,4,AQIDBA==;\n";
        let trace = posix_ingest::parse(input, false).unwrap();
        let extraction = extract_posix(&trace, 40);
        let bags = extraction.tree.gather_by_function();
        assert!(!bags.is_empty());
        let total_ums: usize = bags.values().map(|v| v.len()).sum();
        assert!(total_ums >= 2);
    }

    #[test]
    fn extend_representative_adds_margin_and_clamps_to_trace_bounds() {
        let input = "0,1,WRITE,3,/a,0,4,AQIDBA==;\n1,1,WRITE,3,/a,4,4,AQIDBA==;\n2,1,WRITE,3,/a,8,4,AQIDBA==;\n3,1,WRITE,3,/a,12,4,AQIDBA==;\n";
        let trace = posix_ingest::parse(input, false).unwrap();
        let extraction = extract_posix(&trace, 40);
        let um = vec![1, 2];
        let extended = extend_representative(&um, &extraction.vertex_ts, &trace, 1);
        assert_eq!(extended, vec![0, 1, 2, 3]);
    }
}
