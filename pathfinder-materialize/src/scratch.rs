// SPDX-License-Identifier: Apache-2.0

//! Scratch directory lifecycle (spec §3 "Simulated Filesystem State"):
//! created from a backup at test start, torn down at test end.

use pathfinder_common::{PathfinderError, Result};
use std::fs;
use std::path::Path;

fn resource(operation: &'static str, source: std::io::Error) -> PathfinderError {
    PathfinderError::ResourceFailure { operation, source }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| resource("create_dir_all", e))?;
    for entry in fs::read_dir(src).map_err(|e| resource("read_dir", e))? {
        let entry = entry.map_err(|e| resource("read_dir entry", e))?;
        let ty = entry.file_type().map_err(|e| resource("file_type", e))?;
        let target = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else if ty.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| resource("copy", e))?;
        }
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| resource("read_dir", e))? {
        let entry = entry.map_err(|e| resource("read_dir entry", e))?;
        let ty = entry.file_type().map_err(|e| resource("file_type", e))?;
        if ty.is_dir() {
            fs::remove_dir_all(entry.path()).map_err(|e| resource("remove_dir_all", e))?;
        } else {
            fs::remove_file(entry.path()).map_err(|e| resource("remove_file", e))?;
        }
    }
    Ok(())
}

/// A per-test scratch directory, backed by a unique temp directory that is
/// removed on drop.
pub struct ScratchDir {
    dir: tempfile::TempDir,
    backup: std::path::PathBuf,
    post_setup: Option<tempfile::TempDir>,
}

impl ScratchDir {
    /// Creates a fresh scratch directory and populates it from `backup`
    /// (spec §3 lifecycle: "created at test start from a backup").
    pub fn create_from_backup(backup: &Path) -> Result<Self> {
        let dir = tempfile::tempdir().map_err(|e| resource("tempdir", e))?;
        copy_dir_recursive(backup, dir.path())?;
        Ok(Self { dir, backup: backup.to_path_buf(), post_setup: None })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Snapshots the current (post-setup-replay) scratch directory into an
    /// owned directory of its own, outside the scratch dir itself. Every
    /// subsequent `wipe_and_repopulate` restores from this snapshot rather
    /// than the pre-setup `backup` (spec §8 "Restore idempotence": restoring
    /// between orderings must bring the scratch dir back to the post-setup
    /// state, not the original template).
    pub fn snapshot_post_setup(&mut self) -> Result<()> {
        let snap = tempfile::tempdir().map_err(|e| resource("tempdir", e))?;
        copy_dir_recursive(self.dir.path(), snap.path())?;
        self.post_setup = Some(snap);
        Ok(())
    }

    /// Wipes the scratch directory's contents and repopulates it from the
    /// post-setup snapshot, or from the original backup if setup replayed no
    /// events and no snapshot was taken (spec §4.7 step 5, POSIX restore).
    pub fn wipe_and_repopulate(&self) -> Result<()> {
        let source = self.post_setup.as_ref().map(tempfile::TempDir::path).unwrap_or(&self.backup);
        clear_dir(self.dir.path())?;
        copy_dir_recursive(source, self.dir.path())
    }
}
