// SPDX-License-Identifier: Apache-2.0

//! Applies one event's semantics against mapped PM memory or the simulated
//! filesystem. Shared by setup-phase replay and per-ordering apply (spec
//! §4.7).

use crate::sim_fs::SimFs;
use crate::translation::TranslationTable;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use pathfinder_common::{PathfinderError, Result};
use pathfinder_trace::{Event, EventKind, Whence};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

fn resource(operation: &'static str, source: std::io::Error) -> PathfinderError {
    PathfinderError::ResourceFailure { operation, source }
}

fn nix_resource(operation: &'static str, e: nix::Error) -> PathfinderError {
    resource(operation, std::io::Error::from_raw_os_error(e as i32))
}

/// Live replay state threaded through setup and every per-ordering apply
/// (spec §4.7): the translation table, simulated filesystem bookkeeping,
/// and the trace-fd -> live-fd / seek-offset tables.
pub struct ReplayState {
    pub scratch_root: PathBuf,
    pub translation: TranslationTable,
    pub sim_fs: SimFs,
    pub live_fds: HashMap<i32, File>,
    pub seek_offsets: HashMap<i32, u64>,
}

impl ReplayState {
    pub fn new(scratch_root: PathBuf) -> Self {
        Self {
            scratch_root,
            translation: TranslationTable::new(),
            sim_fs: SimFs::new(),
            live_fds: HashMap::new(),
            seek_offsets: HashMap::new(),
        }
    }

    pub fn resolve(&self, trace_path: &str) -> PathBuf {
        self.scratch_root.join(trace_path.trim_start_matches('/'))
    }

    /// Snapshots every live fd's current seek offset, so it can be restored
    /// after the scratch directory is wiped and repopulated between
    /// orderings (spec §4.7: "records the seek offset of every live fd").
    pub fn snapshot_seek_offsets(&mut self) -> Result<()> {
        let fds: Vec<i32> = self.live_fds.keys().copied().collect();
        for fd in fds {
            if let Some(file) = self.live_fds.get_mut(&fd) {
                let pos = file.stream_position().map_err(|e| resource("stream_position", e))?;
                self.seek_offsets.insert(fd, pos);
            }
        }
        Ok(())
    }

    /// Restores every tracked fd's seek offset onto its (freshly reopened)
    /// live file.
    pub fn restore_seek_offsets(&mut self) -> Result<()> {
        for (fd, pos) in &self.seek_offsets {
            if let Some(file) = self.live_fds.get_mut(fd) {
                file.seek(SeekFrom::Start(*pos)).map_err(|e| resource("seek", e))?;
            }
        }
        Ok(())
    }
}

fn mmap_file(file: &File, len: u64) -> Result<usize> {
    let len = NonZeroUsize::new(len as usize).ok_or_else(|| PathfinderError::MalformedInput("zero-length RegisterFile".into()))?;
    let ptr = unsafe { mmap(None, len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, MapFlags::MAP_SHARED, file, 0) }
        .map_err(|e| nix_resource("mmap", e))?;
    Ok(ptr.as_ptr() as usize)
}

fn munmap_at(base: usize, len: u64) -> Result<()> {
    let ptr = NonNull::new(base as *mut core::ffi::c_void)
        .ok_or_else(|| PathfinderError::MalformedInput("munmap of null mapping".into()))?;
    unsafe { munmap(ptr, len as usize) }.map_err(|e| nix_resource("munmap", e))
}

/// Writes `bytes` into the mapped region containing `address`. Errors if
/// `address` is outside every registered mapping (spec §7: malformed input).
fn write_translated(state: &ReplayState, address: u64, bytes: &[u8]) -> Result<()> {
    let dest = state
        .translation
        .translate(address)
        .ok_or_else(|| PathfinderError::MalformedInput(format!("store at {address:#x} outside every registered mapping")))?;
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dest as *mut u8, bytes.len()) };
    Ok(())
}

/// Reads `len` bytes currently mapped at `address`, used by redundant-store
/// pruning (spec §4.7).
pub fn read_translated(state: &ReplayState, address: u64, len: usize) -> Result<Vec<u8>> {
    let src = state
        .translation
        .translate(address)
        .ok_or_else(|| PathfinderError::MalformedInput(format!("read at {address:#x} outside every registered mapping")))?;
    let mut buf = vec![0u8; len];
    unsafe { std::ptr::copy_nonoverlapping(src as *const u8, buf.as_mut_ptr(), len) };
    Ok(buf)
}

fn open_for_write(path: &Path, creat: bool, excl: bool, trunc: bool) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true);
    opts.create(creat);
    opts.create_new(creat && excl);
    opts.truncate(trunc);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| resource("create_dir_all", e))?;
    }
    opts.open(path).map_err(|e| resource("open", e))
}

/// Applies one event's semantics during setup or a per-ordering replay
/// (spec §4.7). `redundant_store_pruning` skips PM stores whose value
/// matches what is already mapped (PM exhaustive mode).
pub fn apply_event(state: &mut ReplayState, event: &Event, redundant_store_pruning: bool) -> Result<()> {
    match &event.kind {
        EventKind::RegisterFile { path, address, size } => {
            let real_path = state.resolve(path);
            let file = open_for_write(&real_path, true, false, false)?;
            file.set_len(*size).map_err(|e| resource("ftruncate", e))?;
            let base = mmap_file(&file, *size)?;
            state.translation.register(real_path, *address, *size, base);
        }
        EventKind::UnregisterFile { address, size } => {
            for region in state.translation.unregister(*address, *size) {
                munmap_at(region.mapped_base, region.len)?;
            }
        }
        EventKind::Store { address, value, .. } => {
            if redundant_store_pruning {
                if let Ok(current) = read_translated(state, *address, value.len()) {
                    if &current == value {
                        return Ok(());
                    }
                }
            }
            write_translated(state, *address, value)?;
        }
        EventKind::Flush { .. } | EventKind::Fence | EventKind::MSync { .. } => {
            // Ordering-only events; no bytes move during replay.
        }
        EventKind::Write(io) | EventKind::Pwrite(io) | EventKind::Writev(io) | EventKind::Pwritev(io) => {
            let file = state.live_fds.get(&io.fd).ok_or_else(|| PathfinderError::MalformedInput(format!("write on unopened fd {}", io.fd)))?;
            file.write_at(&io.buffer, io.offset).map_err(|e| resource("pwrite", e))?;
            if matches!(event.kind, EventKind::Write(_) | EventKind::Writev(_)) {
                state.seek_offsets.insert(io.fd, io.offset + io.size);
            }
        }
        EventKind::Read(_) | EventKind::Pread(_) => {
            // Reads do not mutate crash-consistency-relevant state.
        }
        EventKind::Lseek { fd, offset, whence } => {
            let base = match whence {
                Whence::Set => 0,
                Whence::Cur => *state.seek_offsets.get(fd).unwrap_or(&0) as i64,
                Whence::End => {
                    let len = state.live_fds.get(fd).and_then(|f| f.metadata().ok()).map(|m| m.len()).unwrap_or(0);
                    len as i64
                }
            };
            let new_pos = (base + offset).max(0) as u64;
            state.seek_offsets.insert(*fd, new_pos);
        }
        EventKind::Ftruncate { fd, path, new_len } => {
            let real_path = state.resolve(path);
            if let Some(file) = state.live_fds.get(fd) {
                file.set_len(*new_len).map_err(|e| resource("ftruncate", e))?;
            } else {
                let file = open_for_write(&real_path, false, false, false)?;
                file.set_len(*new_len).map_err(|e| resource("ftruncate", e))?;
            }
        }
        EventKind::Fallocate { fd, path, offset, len } => {
            let real_path = state.resolve(path);
            let needed = offset + len;
            if let Some(file) = state.live_fds.get(fd) {
                let cur = file.metadata().map_err(|e| resource("stat", e))?.len();
                if needed > cur {
                    file.set_len(needed).map_err(|e| resource("fallocate", e))?;
                }
            } else {
                let file = open_for_write(&real_path, true, false, false)?;
                let cur = file.metadata().map_err(|e| resource("stat", e))?.len();
                if needed > cur {
                    file.set_len(needed).map_err(|e| resource("fallocate", e))?;
                }
            }
        }
        EventKind::Rename { old_path, new_path } => {
            let old_real = state.resolve(old_path);
            let new_real = state.resolve(new_path);
            if let Some(parent) = new_real.parent() {
                std::fs::create_dir_all(parent).map_err(|e| resource("create_dir_all", e))?;
            }
            std::fs::rename(&old_real, &new_real).map_err(|e| resource("rename", e))?;
            state.sim_fs.rename(&old_real, &new_real);
        }
        EventKind::Unlink { path } => {
            let real_path = state.resolve(path);
            std::fs::remove_file(&real_path).map_err(|e| resource("unlink", e))?;
            state.sim_fs.unlink(&real_path);
        }
        EventKind::Fsync { fd, path } | EventKind::Fdatasync { fd, path } => {
            let real_path = state.resolve(path);
            if real_path.is_dir() {
                state.sim_fs.fsync_dir(&real_path);
            } else if let Some(file) = state.live_fds.get(fd) {
                file.sync_all().map_err(|e| resource("fsync", e))?;
            }
        }
        EventKind::Sync => unsafe {
            libc::sync();
        },
        EventKind::Syncfs { fd, .. } => {
            if let Some(file) = state.live_fds.get(fd) {
                use std::os::unix::io::AsRawFd;
                let rc = unsafe { libc::syncfs(file.as_raw_fd()) };
                if rc != 0 {
                    return Err(resource("syncfs", std::io::Error::last_os_error()));
                }
            }
        }
        EventKind::SyncFileRange { fd, flags, .. } => {
            if flags.is_full_sync() {
                if let Some(file) = state.live_fds.get(fd) {
                    file.sync_data().map_err(|e| resource("sync_file_range", e))?;
                }
            }
        }
        EventKind::Open { fd, path, flags } => {
            let real_path = state.resolve(path);
            let file = open_for_write(&real_path, flags.creat, flags.excl, flags.trunc)?;
            if flags.creat {
                state.sim_fs.open_file_creat(&real_path);
            }
            state.live_fds.insert(*fd, file);
            state.seek_offsets.insert(*fd, 0);
        }
        EventKind::Creat { fd, path } => {
            let real_path = state.resolve(path);
            let file = open_for_write(&real_path, true, false, true)?;
            state.sim_fs.create_file(&real_path);
            state.live_fds.insert(*fd, file);
            state.seek_offsets.insert(*fd, 0);
        }
        EventKind::Close { fd } => {
            state.live_fds.remove(fd);
        }
        EventKind::Mkdir { path } => {
            let real_path = state.resolve(path);
            std::fs::create_dir_all(&real_path).map_err(|e| resource("mkdir", e))?;
        }
        EventKind::Rmdir { path } => {
            let real_path = state.resolve(path);
            std::fs::remove_dir(&real_path).map_err(|e| resource("rmdir", e))?;
        }
        EventKind::MarkerBegin | EventKind::MarkerEnd | EventKind::OpBegin { .. } | EventKind::OpEnd { .. } => {
            // Delimiters only; no replay-time effect.
        }
    }
    Ok(())
}
