// SPDX-License-Identifier: Apache-2.0

//! PM variant of the Update-Mechanism Extractor: per-instance epoch and
//! field splitting (spec §4.5).

use crate::type_layout::TypeOracle;
use crate::um::{UpdateMechanism, VertexId};
use pathfinder_graph::PersistenceGraph;
use pathfinder_trace::{Event, EventKind, Trace};
use std::collections::{BTreeSet, HashMap};

pub(crate) fn event_of<'t>(trace: &'t Trace, pg: &PersistenceGraph, v: VertexId) -> &'t Event {
    &trace.events[pg.event_ts(v) as usize]
}

fn store_id_of(trace: &Trace, pg: &PersistenceGraph, v: VertexId) -> u64 {
    event_of(trace, pg, v).store_id.unwrap_or(0)
}

fn store_address(trace: &Trace, pg: &PersistenceGraph, v: VertexId) -> Option<u64> {
    match &event_of(trace, pg, v).kind {
        EventKind::Store { address, .. } => Some(*address),
        _ => None,
    }
}

fn field_of(trace: &Trace, pg: &PersistenceGraph, oracle: &dyn TypeOracle, v: VertexId) -> Option<usize> {
    let address = store_address(trace, pg, v)?;
    let (base, layout) = oracle.locate(address)?;
    layout.field_at(address - base)
}

/// Pass 1: split after `a` when a path `a -> b` exists in `pg` but no direct
/// edge, or the store-id gap exceeds the instance type's size (spec §4.5
/// step 1).
fn interruption_split(
    vertices: &[VertexId],
    pg: &PersistenceGraph,
    reach: &[BTreeSet<usize>],
    trace: &Trace,
    type_size: u64,
) -> Vec<UpdateMechanism> {
    let mut out = Vec::new();
    let mut current = vec![vertices[0]];
    for w in vertices.windows(2) {
        let (a, b) = (w[0], w[1]);
        let indirect_path = reach[a].contains(&b) && !pg.graph.has_edge(a, b);
        let gap = store_id_of(trace, pg, b).saturating_sub(store_id_of(trace, pg, a));
        if indirect_path || gap > type_size {
            out.push(std::mem::take(&mut current));
        }
        current.push(b);
    }
    out.push(current);
    out
}

/// Pass 2: split after `x` when `field(x) == field(x+1)` and either the
/// store-id gap exceeds 1 or the field is an array type (spec §4.5 step 2).
fn repeated_field_split(
    subs: Vec<UpdateMechanism>,
    pg: &PersistenceGraph,
    trace: &Trace,
    oracle: &dyn TypeOracle,
) -> Vec<UpdateMechanism> {
    let mut out = Vec::new();
    for sub in subs {
        let mut current = vec![sub[0]];
        for w in sub.windows(2) {
            let (a, b) = (w[0], w[1]);
            let fa = field_of(trace, pg, oracle, a);
            let same_field = fa.is_some() && fa == field_of(trace, pg, oracle, b);
            let gap = store_id_of(trace, pg, b).saturating_sub(store_id_of(trace, pg, a));
            let is_array_field = fa
                .and_then(|f| store_address(trace, pg, a).and_then(|addr| oracle.locate(addr)).and_then(|(_, l)| l.field(f)))
                .is_some_and(|field| field.is_array);
            if same_field && (gap > 1 || is_array_field) {
                out.push(std::mem::take(&mut current));
            }
            current.push(b);
        }
        out.push(current);
    }
    out
}

/// Pass 3: among fields repeated within a sub-mechanism, split on the one
/// whose consecutive occurrences have the smallest maximum vertex-id span
/// (spec §4.5 step 3).
fn min_max_range_field_split(subs: Vec<UpdateMechanism>, pg: &PersistenceGraph, trace: &Trace, oracle: &dyn TypeOracle) -> Vec<UpdateMechanism> {
    let mut out = Vec::new();
    for sub in subs {
        let mut positions: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, &v) in sub.iter().enumerate() {
            if let Some(f) = field_of(trace, pg, oracle, v) {
                positions.entry(f).or_default().push(i);
            }
        }
        let repeated: Vec<(usize, u64)> = positions
            .iter()
            .filter(|(_, idxs)| idxs.len() > 1)
            .map(|(&f, idxs)| {
                let max_span = idxs.windows(2).map(|w| (sub[w[1]] - sub[w[0]]) as u64).max().unwrap_or(0);
                (f, max_span)
            })
            .collect();

        if repeated.is_empty() {
            out.push(sub);
            continue;
        }

        let winner = match repeated.iter().min_by_key(|(_, span)| *span) {
            Some((f, _)) => *f,
            None => unreachable!("repeated is non-empty"),
        };
        let split_at: BTreeSet<usize> = positions[&winner].iter().skip(1).copied().collect();

        let mut current = Vec::new();
        for (i, &v) in sub.iter().enumerate() {
            if split_at.contains(&i) && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            current.push(v);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

/// Runs the PM extractor over every instrumented instance the oracle knows
/// about, grouping the resulting Update Mechanisms by type name.
pub fn extract_pm(pg: &PersistenceGraph, trace: &Trace, oracle: &dyn TypeOracle) -> HashMap<String, Vec<UpdateMechanism>> {
    let mut instances: HashMap<u64, Vec<VertexId>> = HashMap::new();
    for v in 0..pg.num_vertices() {
        if let Some(address) = store_address(trace, pg, v) {
            if let Some((base, _)) = oracle.locate(address) {
                instances.entry(base).or_default().push(v);
            }
        }
    }

    let reach = pg.graph.transitive_closure();
    let mut grouped: HashMap<String, Vec<UpdateMechanism>> = HashMap::new();

    for (base, mut vertices) in instances {
        vertices.sort_unstable();
        let Some((_, layout)) = oracle.locate(base) else { continue };
        let sub1 = interruption_split(&vertices, pg, &reach, trace, layout.size());
        let sub2 = repeated_field_split(sub1, pg, trace, oracle);
        let sub3 = min_max_range_field_split(sub2, pg, trace, oracle);
        grouped.entry(layout.name().to_string()).or_default().extend(sub3);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_layout::{FieldLayout, MapTypeOracle, TypeLayout};
    use pathfinder_trace::pm as pm_ingest;

    fn trace_of(records: &str) -> Trace {
        let input = format!("START||{records}||STOP");
        pm_ingest::parse(&input, false).unwrap()
    }

    #[test]
    fn single_field_run_stays_one_mechanism_after_splitting() {
        // two stores to the same scalar instance, tight together
        let trace = trace_of("STORE;1;0x1000;8;0000000000000001;||STORE;1;0x1000;8;0000000000000002;");
        let pg = pathfinder_graph::pm::build(&trace);
        let mut oracle = MapTypeOracle::new();
        oracle.register(0x1000, TypeLayout::Scalar { size: 8 });
        let grouped = extract_pm(&pg, &trace, &oracle);
        assert_eq!(grouped["<scalar>"].len(), 1);
        assert_eq!(grouped["<scalar>"][0].len(), 2);
    }

    #[test]
    fn repeated_array_field_splits_into_separate_mechanisms() {
        let trace = trace_of("STORE;1;0x1000;8;0000000000000001;||STORE;1;0x1000;8;0000000000000002;");
        let pg = pathfinder_graph::pm::build(&trace);
        let mut oracle = MapTypeOracle::new();
        oracle.register(
            0x1000,
            TypeLayout::Struct {
                name: "Arr".into(),
                size: 8,
                fields: vec![FieldLayout { name: "items".into(), offset: 0, size: 8, is_array: true }],
            },
        );
        let grouped = extract_pm(&pg, &trace, &oracle);
        assert_eq!(grouped["Arr"].len(), 2);
        assert_eq!(grouped["Arr"][0].len(), 1);
        assert_eq!(grouped["Arr"][1].len(), 1);
    }

    #[test]
    fn large_store_id_gap_splits_on_interruption() {
        // four intervening stores to an unrelated instance push the store-id
        // gap between the two 0x1000 stores past the (deliberately small)
        // type size, forcing a split independent of any graph edge.
        let trace = trace_of(
            "STORE;1;0x1000;8;0000000000000001;||STORE;1;0x2000;8;0000000000000002;||STORE;1;0x2100;8;0000000000000003;||\
             STORE;1;0x2200;8;0000000000000004;||STORE;1;0x2300;8;0000000000000005;||STORE;1;0x1000;8;0000000000000006;",
        );
        let pg = pathfinder_graph::pm::build(&trace);
        let mut oracle = MapTypeOracle::new();
        oracle.register(0x1000, TypeLayout::Scalar { size: 4 });
        oracle.register(0x2000, TypeLayout::Scalar { size: 8 });
        oracle.register(0x2100, TypeLayout::Scalar { size: 8 });
        oracle.register(0x2200, TypeLayout::Scalar { size: 8 });
        oracle.register(0x2300, TypeLayout::Scalar { size: 8 });
        let grouped = extract_pm(&pg, &trace, &oracle);
        // the 0x1000 instance splits into 2 (gap 5 > type size 4); the other
        // four single-store instances stay whole: 2 + 4 = 6.
        assert_eq!(grouped["<scalar>"].len(), 6);
    }
}
