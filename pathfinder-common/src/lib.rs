// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Shared scaffolding used by every Pathfinder crate: the error taxonomy
//! (spec §7), the core-affecting configuration surface (spec §6), and a
//! cooperative cancellation flag (spec §4.4, §5).

mod cancel;
mod config;
mod error;

pub use cancel::CancellationFlag;
pub use config::{
    PathfinderConfig, MAX_PERMS, POSIX_REPRESENTATIVE_MARGIN, UM_CHUNK_GAP, UM_CHUNK_SIZE,
};
pub use error::{PathfinderError, Result};
