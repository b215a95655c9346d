// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Per-syscall sub-records derived from POSIX events (spec §3, §4.1), used
/// to compute fine-grained happens-before dependencies in C3 without
/// special-casing every syscall kind at the graph layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicroEvent {
    DataWrite { path: String, offset: u64, len: u64 },
    SetAttr { path: String },
    InodeDirWrite { path: String },
    AddFileInode { path: String },
    AddDirInode { path: String },
}

impl MicroEvent {
    pub fn path(&self) -> &str {
        match self {
            MicroEvent::DataWrite { path, .. }
            | MicroEvent::SetAttr { path }
            | MicroEvent::InodeDirWrite { path }
            | MicroEvent::AddFileInode { path }
            | MicroEvent::AddDirInode { path } => path,
        }
    }
}
