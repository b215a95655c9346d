// SPDX-License-Identifier: Apache-2.0

//! Orchestrates one test: setup-phase replay, then per-ordering apply and
//! restore (spec §4.7).

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::replay::{apply_event, read_translated, ReplayState};
use crate::scratch::ScratchDir;
use pathfinder_common::Result;
use pathfinder_trace::{EventKind, Trace};
use std::collections::HashSet;
use std::path::Path;

/// Whether the materializer is testing a PM representative (checkpoint
/// byte-vector restore) or a POSIX one (scratch-directory restore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Pm,
    Posix,
}

/// One fully-set-up test instance: a scratch directory populated through
/// `setup_until`, ready to apply and restore many orderings in turn.
pub struct Materializer {
    mode: Mode,
    scratch: ScratchDir,
    state: ReplayState,
    checkpoints: CheckpointStore,
    setup_until: usize,
    prior_fs_events: Vec<usize>,
    redundant_store_pruning: bool,
    already_tested: HashSet<Vec<usize>>,
}

impl Materializer {
    /// Runs setup-phase replay of `trace.events[0..setup_until)` against a
    /// fresh scratch directory copied from `backup` (spec §4.7 "Setup
    /// phase").
    pub fn setup(mode: Mode, trace: &Trace, setup_until: usize, backup: &Path, redundant_store_pruning: bool) -> Result<Self> {
        let mut scratch = ScratchDir::create_from_backup(backup)?;
        let mut state = ReplayState::new(scratch.path().to_path_buf());
        let mut prior_fs_events = Vec::new();

        for (idx, event) in trace.events.iter().take(setup_until).enumerate() {
            apply_event(&mut state, event, false)?;
            if is_fd_table_event(&event.kind) {
                prior_fs_events.push(idx);
            }
        }
        state.snapshot_seek_offsets()?;

        if mode == Mode::Posix {
            // spec §4.7: restore must bring the scratch dir back to *this*
            // post-setup state, not the pre-setup `backup` template.
            scratch.snapshot_post_setup()?;
        }

        Ok(Self {
            mode,
            scratch,
            state,
            checkpoints: CheckpointStore::new(),
            setup_until,
            prior_fs_events,
            redundant_store_pruning,
            already_tested: HashSet::new(),
        })
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Applies one ordering (a list of event indices into `trace`) and
    /// returns the path to fsync before invoking the checker. The caller is
    /// responsible for spawning the checker and calling `restore` after
    /// (spec §4.7 "Per-ordering apply" steps 1-4).
    pub fn apply_ordering(&mut self, trace: &Trace, order: &[usize]) -> Result<()> {
        self.already_tested.insert(order.to_vec());

        match self.mode {
            Mode::Pm => {
                let mut checkpoint = Checkpoint::new();
                for region in self.state.translation.regions() {
                    let bytes = read_translated(&self.state, region.original_start, region.len as usize)?;
                    checkpoint.record(region.path.clone(), region.original_start, bytes);
                }
                self.checkpoints.push(checkpoint);
            }
            Mode::Posix => {
                // The post-setup snapshot `wipe_and_repopulate` restores from
                // was taken once in `setup`; nothing to do per-ordering.
            }
        }

        for &idx in order {
            let event = &trace.events[idx];
            apply_event(&mut self.state, event, self.redundant_store_pruning && self.mode == Mode::Pm)?;
        }

        fsync_dir(self.scratch.path())?;
        Ok(())
    }

    /// Restores post-setup state after a verdict has been recorded (spec
    /// §4.7 "Per-ordering apply" step 5).
    pub fn restore(&mut self, trace: &Trace) -> Result<()> {
        match self.mode {
            Mode::Pm => {
                if let Some(checkpoint) = self.checkpoints.pop() {
                    for (_, original_start, bytes) in checkpoint.ranges {
                        if let Some(base) = self.state.translation.translate(original_start) {
                            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), base as *mut u8, bytes.len()) };
                        }
                    }
                }
            }
            Mode::Posix => {
                self.scratch.wipe_and_repopulate()?;
                self.state.live_fds.clear();
                for &idx in &self.prior_fs_events.clone() {
                    apply_event(&mut self.state, &trace.events[idx], false)?;
                }
                self.state.restore_seek_offsets()?;
            }
        }
        Ok(())
    }

    /// True iff `order` was already materialized and verdicted (spec §4.7
    /// redundant-store pruning note: "registered regardless of whether it
    /// produced a new verdict").
    pub fn already_tested(&self, order: &[usize]) -> bool {
        self.already_tested.contains(order)
    }

    pub fn setup_until(&self) -> usize {
        self.setup_until
    }
}

fn is_fd_table_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::RegisterFile { .. } | EventKind::UnregisterFile { .. } | EventKind::Open { .. } | EventKind::Creat { .. } | EventKind::Close { .. }
    )
}

fn fsync_dir(dir: &Path) -> Result<()> {
    let f = std::fs::File::open(dir).map_err(|e| pathfinder_common::PathfinderError::ResourceFailure { operation: "fsync_dir open", source: e })?;
    f.sync_all().map_err(|e| pathfinder_common::PathfinderError::ResourceFailure { operation: "fsync_dir", source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfinder_trace::{Event, OpenFlags, SyscallIo};

    fn open_write_close_trace() -> Trace {
        let events = vec![
            Event::new(0, 1, EventKind::Open { fd: 3, path: "/a".into(), flags: OpenFlags { creat: true, excl: false, trunc: false } }, vec![]),
            Event::new(1, 1, EventKind::Pwrite(SyscallIo { fd: 3, path: "/a".into(), offset: 0, size: 4, buffer: vec![1, 2, 3, 4] }), vec![]),
            Event::new(2, 1, EventKind::Close { fd: 3 }, vec![]),
        ];
        Trace::new(events, vec![(0, 2)])
    }

    #[test]
    fn setup_then_apply_empty_order_is_idempotent() {
        let backup = tempfile::tempdir().unwrap();
        let trace = open_write_close_trace();
        let mut m = Materializer::setup(Mode::Posix, &trace, 3, backup.path(), false).unwrap();
        let before = std::fs::read(m.scratch_path().join("a")).unwrap();
        m.apply_ordering(&trace, &[]).unwrap();
        m.restore(&trace).unwrap();
        let after = std::fs::read(m.scratch_path().join("a")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn already_tested_tracks_orders_regardless_of_pruning() {
        let backup = tempfile::tempdir().unwrap();
        let trace = open_write_close_trace();
        let mut m = Materializer::setup(Mode::Posix, &trace, 3, backup.path(), false).unwrap();
        assert!(!m.already_tested(&[0]));
        m.apply_ordering(&trace, &[]).unwrap();
        assert!(m.already_tested(&[]));
    }
}
