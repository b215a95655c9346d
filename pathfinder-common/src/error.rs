// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use thiserror::Error;

/// The five error kinds a Pathfinder test run can produce (design §7).
///
/// Malformed input and resource failures are fatal for the test that hit
/// them; subprocess timeouts and cancellation are not errors in the Rust
/// sense (they're folded into a verdict or a partial result) but are
/// represented here too so every exit path from a test can be described by
/// one enum.
#[derive(Debug, Error)]
pub enum PathfinderError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("resource failure during {operation}: {source}")]
    ResourceFailure {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("checker exceeded its {timeout:?} deadline")]
    SubprocessTimeout { timeout: Duration },

    #[error("cancelled after producing {partial_count} partial result(s)")]
    Cancelled { partial_count: usize },

    #[error("enumeration truncated at {produced} orderings (limit {limit})")]
    EnumerationTruncated { produced: usize, limit: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PathfinderError>;
