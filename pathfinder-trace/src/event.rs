// SPDX-License-Identifier: Apache-2.0

use crate::backtrace::Backtrace;
use crate::micro_event::MicroEvent;
use serde::{Deserialize, Serialize};

/// Whence argument of `lseek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Shared payload of the write/read syscall family (`write`, `pwrite`,
/// `writev`, `pwritev`, `read`, `pread`): fd, resolved path, affected byte
/// range, and the raw buffer bytes (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallIo {
    pub fd: i32,
    pub path: String,
    pub offset: u64,
    pub size: u64,
    pub buffer: Vec<u8>,
}

/// Flags relevant to `open`'s create/exclusive semantics (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenFlags {
    pub creat: bool,
    pub excl: bool,
    pub trunc: bool,
}

/// `sync_file_range`'s wait/write flags (spec §4.3: applies only when flags
/// include `WAIT_BEFORE|WRITE|WAIT_AFTER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncFileRangeFlags {
    pub wait_before: bool,
    pub write: bool,
    pub wait_after: bool,
}

impl SyncFileRangeFlags {
    pub fn is_full_sync(&self) -> bool {
        self.wait_before && self.write && self.wait_after
    }
}

/// The kind-specific payload of an event (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    // --- PM events ---
    Store { address: u64, size: u32, value: Vec<u8> },
    Flush { address: u64, size: u32 },
    Fence,
    MSync { address: u64, size: u32 },
    RegisterFile { path: String, address: u64, size: u64 },
    UnregisterFile { address: u64, size: u64 },

    // --- POSIX syscalls ---
    Write(SyscallIo),
    Pwrite(SyscallIo),
    Pwritev(SyscallIo),
    Writev(SyscallIo),
    Read(SyscallIo),
    Pread(SyscallIo),
    Lseek { fd: i32, offset: i64, whence: Whence },
    Ftruncate { fd: i32, path: String, new_len: u64 },
    Fallocate { fd: i32, path: String, offset: u64, len: u64 },
    Rename { old_path: String, new_path: String },
    Unlink { path: String },
    Fsync { fd: i32, path: String },
    Fdatasync { fd: i32, path: String },
    Sync,
    Syncfs { fd: i32, path: String },
    SyncFileRange {
        fd: i32,
        path: String,
        offset: u64,
        len: u64,
        flags: SyncFileRangeFlags,
    },
    Open { fd: i32, path: String, flags: OpenFlags },
    Creat { fd: i32, path: String },
    Close { fd: i32 },
    Mkdir { path: String },
    Rmdir { path: String },

    // --- Markers ---
    MarkerBegin,
    MarkerEnd,
    OpBegin { workload_tid: u64, op_id: u64 },
    OpEnd { workload_tid: u64, op_id: u64 },
}

impl EventKind {
    pub fn is_store(&self) -> bool {
        matches!(self, EventKind::Store { .. })
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, EventKind::MarkerBegin | EventKind::MarkerEnd)
    }

    /// Write-family syscalls that advance the fd offset and affect a byte
    /// range of a file (spec §4.1).
    pub fn as_write_io(&self) -> Option<&SyscallIo> {
        match self {
            EventKind::Write(io) | EventKind::Pwrite(io) | EventKind::Pwritev(io) | EventKind::Writev(io) => {
                Some(io)
            }
            _ => None,
        }
    }

    pub fn as_read_io(&self) -> Option<&SyscallIo> {
        match self {
            EventKind::Read(io) | EventKind::Pread(io) => Some(io),
            _ => None,
        }
    }

    /// True for the sync family used in C3's sync-family dependency rule
    /// and the subgraph's sync-contraction pass (spec §4.3, §4.4).
    pub fn is_sync_family(&self) -> bool {
        matches!(
            self,
            EventKind::Fsync { .. }
                | EventKind::Fdatasync { .. }
                | EventKind::Sync
                | EventKind::Syncfs { .. }
                | EventKind::SyncFileRange { .. }
        )
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            EventKind::RegisterFile { path, .. }
            | EventKind::Ftruncate { path, .. }
            | EventKind::Fallocate { path, .. }
            | EventKind::Unlink { path }
            | EventKind::Fsync { path, .. }
            | EventKind::Fdatasync { path, .. }
            | EventKind::Syncfs { path, .. }
            | EventKind::SyncFileRange { path, .. }
            | EventKind::Open { path, .. }
            | EventKind::Creat { path, .. }
            | EventKind::Mkdir { path }
            | EventKind::Rmdir { path } => Some(path),
            EventKind::Rename { old_path, .. } => Some(old_path),
            _ => self.as_write_io().map(|io| io.path.as_str()).or_else(|| self.as_read_io().map(|io| io.path.as_str())),
        }
    }
}

/// A single normalized element of the ingested trace (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: u64,
    pub tid: u64,
    pub kind: EventKind,
    pub store_id: Option<u64>,
    pub write_id: Option<u64>,
    pub backtrace: Backtrace,
    pub block_ids: Option<(u64, u64)>,
    pub micro_events: Vec<MicroEvent>,
}

impl Event {
    pub fn new(timestamp: u64, tid: u64, kind: EventKind, backtrace: Backtrace) -> Self {
        Self {
            timestamp,
            tid,
            kind,
            store_id: None,
            write_id: None,
            backtrace,
            block_ids: None,
            micro_events: Vec::new(),
        }
    }
}
