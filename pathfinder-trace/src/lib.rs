// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod backtrace;
mod event;
mod ingest;
mod micro_event;
mod range;
mod trace;

pub use backtrace::{common_prefix_depth, resolved_prefix, Backtrace, StackFrame};
pub use event::{Event, EventKind, OpenFlags, SyncFileRangeFlags, SyscallIo, Whence};
pub use ingest::{pm, posix, IngestError};
pub use micro_event::MicroEvent;
pub use range::{block_ids, block_range, cacheline_range, ByteRange, BLOCK_SIZE, CACHELINE_SIZE};
pub use trace::Trace;
