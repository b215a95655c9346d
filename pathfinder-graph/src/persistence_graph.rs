// SPDX-License-Identifier: Apache-2.0

use crate::graph::Graph;
use std::collections::HashMap;

/// A whole-program persistence graph: the dense [`Graph`] plus the mapping
/// back to the event timestamps it was built over. Vertex `v` always refers
/// to `trace.events[event_ts[v] as usize]`.
#[derive(Debug, Clone)]
pub struct PersistenceGraph {
    pub graph: Graph,
    event_ts: Vec<u64>,
    vertex_of_ts: HashMap<u64, usize>,
}

impl PersistenceGraph {
    pub(crate) fn new(graph: Graph, event_ts: Vec<u64>) -> Self {
        let vertex_of_ts = event_ts.iter().enumerate().map(|(v, &ts)| (ts, v)).collect();
        Self {
            graph,
            event_ts,
            vertex_of_ts,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.graph.num_vertices()
    }

    /// The event timestamp a vertex refers to.
    pub fn event_ts(&self, vertex: usize) -> u64 {
        self.event_ts[vertex]
    }

    /// The vertex, if any, that refers to the event at `ts`.
    pub fn vertex_for_ts(&self, ts: u64) -> Option<usize> {
        self.vertex_of_ts.get(&ts).copied()
    }

    pub fn vertices_in_ts_order(&self) -> &[u64] {
        &self.event_ts
    }
}
