// SPDX-License-Identifier: Apache-2.0

//! Simulated filesystem wrapper (spec §3 "Simulated Filesystem State",
//! §4.7): tracks known files and, per directory, which basenames were
//! created since that directory was last `fsync`ed — the state directory
//! `fsync` consistency checks are evaluated against.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

fn split(path: &Path) -> (PathBuf, String) {
    let dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let base = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    (dir, base)
}

/// In-process simulated filesystem state. `active` mirrors the upstream
/// design's in-process/out-of-process distinction; this materializer only
/// implements the in-process variant, so it is always `true`.
#[derive(Debug, Default)]
pub struct SimFs {
    active: bool,
    known_files: HashSet<PathBuf>,
    new_since_sync: HashMap<PathBuf, HashSet<String>>,
}

impl SimFs {
    pub fn new() -> Self {
        Self { active: true, known_files: HashSet::new(), new_since_sync: HashMap::new() }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn mark_new(&mut self, path: &Path) {
        let (dir, base) = split(path);
        self.new_since_sync.entry(dir).or_default().insert(base);
        self.known_files.insert(path.to_path_buf());
    }

    /// `create`/`creat` and `open(O_CREAT)` both insert the basename into
    /// the parent directory's new-files-since-sync set (spec §4.7).
    pub fn create_file(&mut self, path: &Path) {
        self.mark_new(path);
    }

    pub fn open_file_creat(&mut self, path: &Path) {
        self.mark_new(path);
    }

    /// `fsync` on a directory clears its new-files-since-sync set.
    pub fn fsync_dir(&mut self, dir: &Path) {
        self.new_since_sync.remove(dir);
    }

    /// Moves the new-files bookkeeping entry from the old parent to the new
    /// one (spec §4.7 `rename`).
    pub fn rename(&mut self, old: &Path, new: &Path) {
        let (old_dir, old_base) = split(old);
        let (new_dir, new_base) = split(new);
        let moved = self.new_since_sync.get_mut(&old_dir).map(|set| set.remove(&old_base)).unwrap_or(false);
        self.known_files.remove(old);
        self.known_files.insert(new.to_path_buf());
        if moved {
            self.new_since_sync.entry(new_dir).or_default().insert(new_base);
        }
    }

    pub fn unlink(&mut self, path: &Path) {
        let (dir, base) = split(path);
        if let Some(set) = self.new_since_sync.get_mut(&dir) {
            set.remove(&base);
        }
        self.known_files.remove(path);
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.known_files.contains(path)
    }

    /// True iff `path`'s basename was created in its parent directory
    /// without a subsequent `fsync` of that directory.
    pub fn is_new_since_sync(&self, path: &Path) -> bool {
        let (dir, base) = split(path);
        self.new_since_sync.get(&dir).is_some_and(|set| set.contains(&base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_fsync_dir_clears_new_set() {
        let mut fs = SimFs::new();
        fs.create_file(Path::new("/scratch/a"));
        assert!(fs.is_new_since_sync(Path::new("/scratch/a")));
        fs.fsync_dir(Path::new("/scratch"));
        assert!(!fs.is_new_since_sync(Path::new("/scratch/a")));
        assert!(fs.is_known(Path::new("/scratch/a")));
    }

    #[test]
    fn rename_moves_new_since_sync_entry() {
        let mut fs = SimFs::new();
        fs.create_file(Path::new("/scratch/old"));
        fs.rename(Path::new("/scratch/old"), Path::new("/scratch/sub/new"));
        assert!(!fs.is_new_since_sync(Path::new("/scratch/old")));
        assert!(fs.is_new_since_sync(Path::new("/scratch/sub/new")));
        assert!(fs.is_known(Path::new("/scratch/sub/new")));
        assert!(!fs.is_known(Path::new("/scratch/old")));
    }

    #[test]
    fn unlink_untracks_and_clears_new_set() {
        let mut fs = SimFs::new();
        fs.create_file(Path::new("/scratch/a"));
        fs.unlink(Path::new("/scratch/a"));
        assert!(!fs.is_known(Path::new("/scratch/a")));
        assert!(!fs.is_new_since_sync(Path::new("/scratch/a")));
    }
}
