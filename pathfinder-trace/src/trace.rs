// SPDX-License-Identifier: Apache-2.0

use crate::event::Event;

/// The normalized, ingested trace: a dense, timestamp-ordered event list
/// plus the selective-testing ranges derived from `MarkerBegin`/`MarkerEnd`
/// pairs (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub events: Vec<Event>,
    /// Inclusive `[first_ts, last_ts]` testing windows.
    pub testing_ranges: Vec<(u64, u64)>,
}

impl Trace {
    pub fn new(events: Vec<Event>, testing_ranges: Vec<(u64, u64)>) -> Self {
        Self {
            events,
            testing_ranges,
        }
    }

    /// True iff `ts` falls inside any configured testing range (spec §4.1).
    pub fn within_testing_range(&self, ts: u64) -> bool {
        self.testing_ranges.iter().any(|(a, b)| *a <= ts && ts <= *b)
    }

    pub fn first_ts(&self) -> Option<u64> {
        self.events.first().map(|e| e.timestamp)
    }

    pub fn last_ts(&self) -> Option<u64> {
        self.events.last().map(|e| e.timestamp)
    }
}

/// Builds the testing-range list from observed `MarkerBegin`/`MarkerEnd`
/// timestamps. Unmatched begins/ends snap to the trace endpoints; if no
/// markers were seen at all, the full trace range is used (spec §4.1).
pub(crate) fn finalize_testing_ranges(
    events: &[Event],
    marker_begins: &[u64],
    marker_ends: &[u64],
) -> Vec<(u64, u64)> {
    use crate::event::EventKind;

    if marker_begins.is_empty() && marker_ends.is_empty() {
        return match (events.first(), events.last()) {
            (Some(first), Some(last)) => vec![(first.timestamp, last.timestamp)],
            _ => vec![],
        };
    }

    let first_ts = events.first().map(|e| e.timestamp).unwrap_or(0);
    let last_ts = events.last().map(|e| e.timestamp).unwrap_or(0);

    // Exclude markers themselves from the testable set of timestamps, but
    // keep using their position to bound ranges.
    let non_marker_first = events
        .iter()
        .find(|e| !e.kind.is_marker())
        .map(|e| e.timestamp)
        .unwrap_or(first_ts);
    let non_marker_last = events
        .iter()
        .rev()
        .find(|e| !e.kind.is_marker())
        .map(|e| e.timestamp)
        .unwrap_or(last_ts);

    let mut begins = marker_begins.to_vec();
    let mut ends = marker_ends.to_vec();
    begins.sort_unstable();
    ends.sort_unstable();

    // Pair each begin with the next end after it; unmatched begins get the
    // trace's last non-marker timestamp, unmatched ends get the first.
    let mut ranges = Vec::new();
    let mut end_iter = ends.into_iter().peekable();
    for begin in begins {
        while let Some(&next_end) = end_iter.peek() {
            if next_end < begin {
                end_iter.next();
            } else {
                break;
            }
        }
        let end = end_iter.next().unwrap_or(non_marker_last);
        ranges.push((begin, end));
    }
    // Any remaining unmatched ends (no preceding begin) pair with the start.
    for end in end_iter {
        ranges.push((non_marker_first, end));
    }
    if ranges.is_empty() {
        ranges.push((non_marker_first, non_marker_last));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn marker(ts: u64, begin: bool) -> Event {
        Event::new(
            ts,
            0,
            if begin {
                EventKind::MarkerBegin
            } else {
                EventKind::MarkerEnd
            },
            vec![],
        )
    }

    fn plain(ts: u64) -> Event {
        Event::new(ts, 0, EventKind::Fence, vec![])
    }

    #[test]
    fn no_markers_yields_full_range() {
        let events = vec![plain(0), plain(1), plain(2)];
        let ranges = finalize_testing_ranges(&events, &[], &[]);
        assert_eq!(ranges, vec![(0, 2)]);
    }

    #[test]
    fn marker_pair_yields_exact_range() {
        let events = vec![plain(0), marker(10, true), plain(15), marker(20, false), plain(25)];
        let ranges = finalize_testing_ranges(&events, &[10], &[20]);
        assert_eq!(ranges, vec![(10, 20)]);
        let trace = Trace::new(events, ranges);
        assert!(trace.within_testing_range(15));
        assert!(!trace.within_testing_range(25));
    }
}
