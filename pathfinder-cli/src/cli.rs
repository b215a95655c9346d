// SPDX-License-Identifier: Apache-2.0

//! Command-line surface wiring the whole pipeline together (spec §6
//! "External Interfaces").

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum TraceMode {
    Pm,
    Posix,
}

/// Runs one trace end-to-end: ingest, graph construction, update-mechanism
/// extraction and grouping, and per-representative crash-state testing.
#[derive(Debug, Clone, Parser)]
#[command(name = "pathfinder", version, about)]
pub struct Cli {
    /// Path to the trace file.
    pub trace: PathBuf,

    /// Trace format.
    #[arg(long, value_enum)]
    pub mode: TraceMode,

    /// Core configuration (TOML); built-in defaults are used if omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of representative tests running concurrently;
    /// overrides the value from `--config` when given.
    #[arg(long)]
    pub max_nproc: Option<usize>,

    /// PM type-layout table (TOML); required in `pm` mode.
    #[arg(long)]
    pub types: Option<PathBuf>,

    /// A directory whose contents seed every test's scratch directory.
    #[arg(long)]
    pub backup: PathBuf,

    /// Checker argv, run once per ordering.
    #[arg(long, num_args = 1.., allow_hyphen_values = true, required = true)]
    pub checker: Vec<String>,

    /// Optional daemon argv, spawned before the checker on every test.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    pub daemon: Option<Vec<String>>,

    /// Whether a representative's NoBugs verdict still triggers testing of
    /// the rest of its group (spec §8 scenario 5: covering does not elide
    /// testing).
    #[arg(long, default_value_t = true)]
    pub test_group_members: bool,

    /// Where to append result rows.
    #[arg(long)]
    pub output: PathBuf,
}
