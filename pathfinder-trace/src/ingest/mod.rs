// SPDX-License-Identifier: Apache-2.0

pub mod pm;
pub mod posix;

mod decompose;

use crate::backtrace::Backtrace;
use crate::event::{Event, EventKind};
use crate::trace::{finalize_testing_ranges, Trace};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unrecognized event kind {0:?}")]
    UnrecognizedKind(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Shared ingest-time bookkeeping for both trace formats: sequential
/// timestamp assignment plus the `store_id`/`write_id` dense counters
/// (spec §4.1, "Every successfully ingested event is assigned
/// `timestamp = next_index++`").
#[derive(Default)]
pub(crate) struct TraceBuilder {
    events: Vec<Event>,
    next_store_id: u64,
    next_write_id: u64,
    marker_begins: Vec<u64>,
    marker_ends: Vec<u64>,
}

impl TraceBuilder {
    pub(crate) fn push(&mut self, tid: u64, kind: EventKind, backtrace: Backtrace) -> u64 {
        let ts = self.events.len() as u64;
        let mut event = Event::new(ts, tid, kind, backtrace);
        if event.kind.is_store() {
            event.store_id = Some(self.next_store_id);
            self.next_store_id += 1;
        }
        if matches!(
            event.kind,
            EventKind::Write(_) | EventKind::Pwrite(_) | EventKind::Pwritev(_) | EventKind::Writev(_)
        ) {
            event.write_id = Some(self.next_write_id);
            self.next_write_id += 1;
        }
        match event.kind {
            EventKind::MarkerBegin => self.marker_begins.push(ts),
            EventKind::MarkerEnd => self.marker_ends.push(ts),
            _ => {}
        }
        self.events.push(event);
        ts
    }

    pub(crate) fn finish(self, decompose_syscall: bool) -> Trace {
        let mut events = self.events;
        if decompose_syscall {
            decompose::derive_micro_events(&mut events);
        }
        let ranges = finalize_testing_ranges(&events, &self.marker_begins, &self.marker_ends);
        Trace::new(events, ranges)
    }
}
