// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Crash-State Materializer (C7), spec §4.7: replays a trace prefix into a
//! scratch directory and mapped PM regions, then applies and restores one
//! ordering at a time.

mod checkpoint;
mod materializer;
mod replay;
mod scratch;
mod sim_fs;
mod translation;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use materializer::{Materializer, Mode};
pub use replay::{apply_event, read_translated, ReplayState};
pub use scratch::ScratchDir;
pub use sim_fs::SimFs;
pub use translation::{MappedRegion, TranslationTable};
