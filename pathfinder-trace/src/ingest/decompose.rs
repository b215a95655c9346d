// SPDX-License-Identifier: Apache-2.0

use crate::event::{Event, EventKind, Whence};
use crate::micro_event::MicroEvent;
use crate::range::block_ids;
use std::collections::{HashMap, HashSet};

/// dirname(path), falling back to "/" for a bare filename (spec §4.1 treats
/// every path-affecting syscall as also touching its parent directory).
fn dirname(path: &str) -> String {
    match std::path::Path::new(path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => "/".to_string(),
    }
}

#[derive(Default)]
struct ShadowState {
    fd_offset: HashMap<i32, u64>,
    fd_path: HashMap<i32, String>,
    path_size: HashMap<String, u64>,
    path_open_fds: HashMap<String, HashSet<i32>>,
}

impl ShadowState {
    fn register_open(&mut self, fd: i32, path: &str) {
        self.fd_path.insert(fd, path.to_string());
        self.fd_offset.insert(fd, 0);
        self.path_open_fds
            .entry(path.to_string())
            .or_default()
            .insert(fd);
    }

    fn close(&mut self, fd: i32) {
        self.fd_offset.remove(&fd);
        if let Some(path) = self.fd_path.remove(&fd) {
            if let Some(set) = self.path_open_fds.get_mut(&path) {
                set.remove(&fd);
            }
        }
    }

    fn rename(&mut self, old_path: &str, new_path: &str) {
        if let Some(size) = self.path_size.remove(old_path) {
            self.path_size.insert(new_path.to_string(), size);
        }
        if let Some(fds) = self.path_open_fds.remove(old_path) {
            for &fd in &fds {
                self.fd_path.insert(fd, new_path.to_string());
            }
            self.path_open_fds.insert(new_path.to_string(), fds);
        }
    }
}

/// Derives `micro_events` (and, where applicable, `block_ids`) for every
/// syscall event, maintaining the shadow `fd→offset`, `path→size`, and
/// `path→openfds` tables described in spec §4.1. Runs once, after ingest,
/// over events in timestamp order.
pub(crate) fn derive_micro_events(events: &mut [Event]) {
    let mut state = ShadowState::default();

    for event in events.iter_mut() {
        let mut micro: Vec<MicroEvent> = Vec::new();
        let mut byte_range: Option<(u64, u64)> = None;

        match &mut event.kind {
            EventKind::Open { fd, path, flags } => {
                state.register_open(*fd, path);
                if flags.creat {
                    micro.push(MicroEvent::AddFileInode { path: path.clone() });
                    micro.push(MicroEvent::InodeDirWrite {
                        path: dirname(path),
                    });
                }
            }
            EventKind::Creat { fd, path } => {
                state.register_open(*fd, path);
                micro.push(MicroEvent::AddFileInode { path: path.clone() });
                micro.push(MicroEvent::InodeDirWrite {
                    path: dirname(path),
                });
            }
            EventKind::Close { fd } => {
                state.close(*fd);
            }
            EventKind::Write(io) | EventKind::Writev(io) => {
                let cur = *state.fd_offset.get(&io.fd).unwrap_or(&0);
                io.offset = cur;
                let end = cur + io.size;
                micro.push(MicroEvent::DataWrite {
                    path: io.path.clone(),
                    offset: cur,
                    len: io.size,
                });
                let old_size = *state.path_size.get(&io.path).unwrap_or(&0);
                if end > old_size {
                    state.path_size.insert(io.path.clone(), end);
                    micro.push(MicroEvent::SetAttr {
                        path: io.path.clone(),
                    });
                }
                state.fd_offset.insert(io.fd, end);
                byte_range = Some((cur, io.size));
            }
            EventKind::Pwrite(io) | EventKind::Pwritev(io) => {
                let end = io.offset + io.size;
                micro.push(MicroEvent::DataWrite {
                    path: io.path.clone(),
                    offset: io.offset,
                    len: io.size,
                });
                let old_size = *state.path_size.get(&io.path).unwrap_or(&0);
                if end > old_size {
                    state.path_size.insert(io.path.clone(), end);
                    micro.push(MicroEvent::SetAttr {
                        path: io.path.clone(),
                    });
                }
                byte_range = Some((io.offset, io.size));
            }
            EventKind::Read(io) => {
                let cur = *state.fd_offset.get(&io.fd).unwrap_or(&0);
                io.offset = cur;
                state.fd_offset.insert(io.fd, cur + io.size);
            }
            EventKind::Pread(_) => {}
            EventKind::Lseek { fd, offset, whence } => {
                let cur = *state.fd_offset.get(fd).unwrap_or(&0) as i64;
                let path = state.fd_path.get(fd).cloned();
                let file_size = path
                    .as_deref()
                    .and_then(|p| state.path_size.get(p))
                    .copied()
                    .unwrap_or(0) as i64;
                let new_offset = match whence {
                    Whence::Set => *offset,
                    Whence::Cur => cur + *offset,
                    Whence::End => file_size + *offset,
                };
                state.fd_offset.insert(*fd, new_offset.max(0) as u64);
            }
            EventKind::Fallocate { path, offset, len, .. } => {
                micro.push(MicroEvent::SetAttr { path: path.clone() });
                micro.push(MicroEvent::DataWrite {
                    path: path.clone(),
                    offset: *offset,
                    len: *len,
                });
                let end = *offset + *len;
                let old_size = *state.path_size.get(path).unwrap_or(&0);
                if end > old_size {
                    state.path_size.insert(path.clone(), end);
                }
                byte_range = Some((*offset, *len));
            }
            EventKind::Ftruncate { path, new_len, .. } => {
                let old_len = *state.path_size.get(path).unwrap_or(new_len);
                if *new_len < old_len {
                    micro.push(MicroEvent::DataWrite {
                        path: path.clone(),
                        offset: *new_len,
                        len: old_len - *new_len,
                    });
                    micro.push(MicroEvent::SetAttr { path: path.clone() });
                } else if *new_len > old_len {
                    micro.push(MicroEvent::SetAttr { path: path.clone() });
                }
                state.path_size.insert(path.clone(), *new_len);
            }
            EventKind::Unlink { path } => {
                state.path_size.remove(path);
                state.path_open_fds.remove(path);
                micro.push(MicroEvent::InodeDirWrite {
                    path: dirname(path),
                });
                micro.push(MicroEvent::SetAttr { path: path.clone() });
            }
            EventKind::Rename { old_path, new_path } => {
                state.rename(old_path, new_path);
                micro.push(MicroEvent::InodeDirWrite {
                    path: dirname(old_path),
                });
                micro.push(MicroEvent::InodeDirWrite {
                    path: dirname(new_path),
                });
            }
            EventKind::Mkdir { path } => {
                micro.push(MicroEvent::AddDirInode { path: path.clone() });
                micro.push(MicroEvent::InodeDirWrite {
                    path: dirname(path),
                });
            }
            EventKind::Rmdir { path } => {
                micro.push(MicroEvent::SetAttr { path: path.clone() });
                micro.push(MicroEvent::InodeDirWrite {
                    path: dirname(path),
                });
            }
            EventKind::SyncFileRange { offset, len, .. } => {
                byte_range = Some((*offset, *len));
            }
            _ => {}
        }

        event.micro_events = micro;
        if let Some((offset, size)) = byte_range {
            event.block_ids = Some(block_ids(offset, size));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{OpenFlags, SyscallIo};

    fn io(fd: i32, path: &str, offset: u64, size: u64) -> SyscallIo {
        SyscallIo {
            fd,
            path: path.into(),
            offset,
            size,
            buffer: vec![0; size as usize],
        }
    }

    #[test]
    fn open_create_emits_inode_and_dir_write() {
        let mut events = vec![Event::new(
            0,
            1,
            EventKind::Open {
                fd: 3,
                path: "/a/b".into(),
                flags: OpenFlags {
                    creat: true,
                    excl: false,
                    trunc: false,
                },
            },
            vec![],
        )];
        derive_micro_events(&mut events);
        assert_eq!(
            events[0].micro_events,
            vec![
                MicroEvent::AddFileInode { path: "/a/b".into() },
                MicroEvent::InodeDirWrite { path: "/a".into() },
            ]
        );
    }

    #[test]
    fn write_extending_file_sets_attr() {
        let mut events = vec![
            Event::new(
                0,
                1,
                EventKind::Open {
                    fd: 3,
                    path: "/f".into(),
                    flags: OpenFlags::default(),
                },
                vec![],
            ),
            Event::new(1, 1, EventKind::Write(io(3, "/f", 0, 4)), vec![]),
        ];
        derive_micro_events(&mut events);
        assert_eq!(
            events[1].micro_events,
            vec![
                MicroEvent::DataWrite {
                    path: "/f".into(),
                    offset: 0,
                    len: 4
                },
                MicroEvent::SetAttr { path: "/f".into() },
            ]
        );
    }

    #[test]
    fn second_write_within_file_size_does_not_set_attr() {
        let mut events = vec![
            Event::new(
                0,
                1,
                EventKind::Open {
                    fd: 3,
                    path: "/f".into(),
                    flags: OpenFlags::default(),
                },
                vec![],
            ),
            Event::new(1, 1, EventKind::Write(io(3, "/f", 0, 8)), vec![]),
            Event::new(2, 1, EventKind::Pwrite(io(3, "/f", 2, 2)), vec![]),
        ];
        derive_micro_events(&mut events);
        assert_eq!(
            events[2].micro_events,
            vec![MicroEvent::DataWrite {
                path: "/f".into(),
                offset: 2,
                len: 2
            }]
        );
    }

    #[test]
    fn ftruncate_shrink_emits_data_write_and_set_attr() {
        let mut events = vec![
            Event::new(
                0,
                1,
                EventKind::Open {
                    fd: 3,
                    path: "/f".into(),
                    flags: OpenFlags::default(),
                },
                vec![],
            ),
            Event::new(1, 1, EventKind::Write(io(3, "/f", 0, 100)), vec![]),
            Event::new(
                2,
                1,
                EventKind::Ftruncate {
                    fd: 3,
                    path: "/f".into(),
                    new_len: 40,
                },
                vec![],
            ),
        ];
        derive_micro_events(&mut events);
        assert_eq!(
            events[2].micro_events,
            vec![
                MicroEvent::DataWrite {
                    path: "/f".into(),
                    offset: 40,
                    len: 60
                },
                MicroEvent::SetAttr { path: "/f".into() },
            ]
        );
    }

    #[test]
    fn rename_emits_inode_dir_write_for_both_parents() {
        let mut events = vec![Event::new(
            0,
            1,
            EventKind::Rename {
                old_path: "/a/x".into(),
                new_path: "/b/y".into(),
            },
            vec![],
        )];
        derive_micro_events(&mut events);
        assert_eq!(
            events[0].micro_events,
            vec![
                MicroEvent::InodeDirWrite { path: "/a".into() },
                MicroEvent::InodeDirWrite { path: "/b".into() },
            ]
        );
    }

    #[test]
    fn sync_file_range_gets_block_ids() {
        let mut events = vec![Event::new(
            0,
            1,
            EventKind::SyncFileRange {
                fd: 3,
                path: "/f".into(),
                offset: 4090,
                len: 20,
                flags: Default::default(),
            },
            vec![],
        )];
        derive_micro_events(&mut events);
        assert_eq!(events[0].block_ids, Some((0, 1)));
    }

    #[test]
    fn fsync_gets_no_block_ids() {
        let mut events = vec![Event::new(
            0,
            1,
            EventKind::Fsync {
                fd: 3,
                path: "/f".into(),
            },
            vec![],
        )];
        derive_micro_events(&mut events);
        assert_eq!(events[0].block_ids, None);
    }
}
