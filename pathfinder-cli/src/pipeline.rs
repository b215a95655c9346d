// SPDX-License-Identifier: Apache-2.0

//! Wires the full pipeline together: ingest -> persistence graph ->
//! Update-Mechanism extraction and grouping -> for each representative,
//! subgraph extraction, order enumeration, and per-ordering crash-state
//! testing (spec §2 "System Overview", §4).

use crate::cli::{Cli, TraceMode};
use crate::csv_writer;
use crate::types_config;
use anyhow::{anyhow, Context, Result};
use pathfinder_common::{CancellationFlag, PathfinderConfig, MAX_PERMS, POSIX_REPRESENTATIVE_MARGIN};
use pathfinder_driver::{roll_up, CheckerConfig, GroupVerdict, TestResult};
use pathfinder_extract::{equivalent_in_function, equivalent_in_type, extend_representative, extract_pm, extract_posix, group_update_mechanisms, split_by_clustering, RelationKind, UpdateMechanismGroup, VertexId};
use pathfinder_graph::{contract_sync_family, enumerate_downsets, extract as extract_subgraph, pm as pm_graph, posix as posix_graph, PersistenceGraph, Subgraph};
use pathfinder_materialize::Materializer;
use pathfinder_trace::{pm as pm_ingest, posix as posix_ingest, Trace};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub async fn run(cli: &Cli) -> Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            PathfinderConfig::from_toml_str(&raw)?
        }
        None => PathfinderConfig::new()?,
    };
    if let Some(max_nproc) = cli.max_nproc {
        cfg.max_nproc = max_nproc;
    }

    let raw_trace = std::fs::read_to_string(&cli.trace).with_context(|| format!("reading trace {}", cli.trace.display()))?;
    let trace = match cli.mode {
        TraceMode::Pm => pm_ingest::parse(&raw_trace, cfg.decompose_syscall)?,
        TraceMode::Posix => posix_ingest::parse(&raw_trace, cfg.decompose_syscall)?,
    };

    let pg = match cli.mode {
        TraceMode::Pm => pm_graph::build(&trace),
        TraceMode::Posix => posix_graph::build(&trace),
    };

    let relation = if cfg.use_induced_subgraph { RelationKind::InducedSubgraph } else { RelationKind::Covers };

    let groups: Vec<(String, Vec<UpdateMechanismGroup>)> = match cli.mode {
        TraceMode::Pm => {
            let types_path = cli.types.as_ref().ok_or_else(|| anyhow!("--types is required in pm mode"))?;
            let oracle = types_config::load(types_path)?;
            let bags = extract_pm(&pg, &trace, &oracle);
            bags.into_iter()
                .map(|(key, ums)| {
                    let grouped = group_update_mechanisms(&pg.graph, ums, |s, l| equivalent_in_type(&trace, &pg, &oracle, s, l), relation);
                    (key, grouped)
                })
                .collect()
        }
        TraceMode::Posix => {
            let mut extraction = extract_posix(&trace, cfg.max_um_size);
            // spec §4.5 "Compaction": drop stack-tree nodes with no attached
            // UMs before bagging by function, or empty-function bags would
            // still surface in grouping.
            extraction.tree.compact();
            let bags = extraction.tree.gather_by_function();
            bags.into_iter()
                .map(|(func, ums)| {
                    // spec §4.6 "Grouping per function": re-form near-
                    // contiguous UMs via DBSCAN(eps=10, min_pts=1) on
                    // event-id before grouping by the induced-subgraph relation.
                    let clustered = split_by_clustering(&ums, &extraction.vertex_ts);
                    let grouped = group_update_mechanisms(&pg.graph, clustered, |s, l| {
                        equivalent_in_function(&trace.events[pg.event_ts(s) as usize], &trace.events[pg.event_ts(l) as usize], &func)
                    }, RelationKind::InducedSubgraph);
                    (func, grouped)
                })
                .collect()
        }
    };

    // Every representative (and, on a NoBugs verdict, every other member of
    // its group) is its own isolated test instance: a dedicated scratch
    // directory and mapped-region set, independent of every other test (spec
    // §5 "Ordering guarantees"). Dispatch is bounded to `max_nproc`
    // concurrent instances, generalizing the semaphore-bounded pattern
    // `pathfinder_driver::dispatch_bounded` uses for individual checker runs
    // to this coarser per-representative granularity.
    let cli = Arc::new(cli.clone());
    let cfg = Arc::new(cfg);
    let trace = Arc::new(trace);
    let pg = Arc::new(pg);

    let mut jobs = Vec::new();
    for (key, group_list) in groups {
        for group in group_list {
            let cli = cli.clone();
            let cfg = cfg.clone();
            let trace = trace.clone();
            let pg = pg.clone();
            let key = key.clone();
            jobs.push(async move { test_one_group(&cli, &cfg, &trace, &pg, &key, &group).await });
        }
    }

    let max_nproc = cfg.max_nproc;
    for result in dispatch_group_tests(max_nproc, jobs).await {
        if let Err(err) = result {
            warn!(error = %err, "representative test failed");
        }
    }

    Ok(())
}

async fn test_one_group(cli: &Cli, cfg: &PathfinderConfig, trace: &Trace, pg: &PersistenceGraph, key: &str, group: &UpdateMechanismGroup) -> Result<()> {
    info!(type_or_function = %key, size = group.representative().len(), "testing representative");
    let verdict = test_group_member(cli, cfg, trace, pg, group.representative()).await?;

    if verdict == GroupVerdict::NoBugs && cli.test_group_members {
        for member in group.members().iter().skip(1) {
            let _ = test_group_member(cli, cfg, trace, pg, member).await?;
        }
    }
    if verdict == GroupVerdict::AllInconsistent {
        warn!(type_or_function = %key, "group marked AllInconsistent, follow-up testing suppressed");
    }
    Ok(())
}

/// Runs every job with at most `max_nproc` concurrently outstanding. Same
/// semaphore-bounded shape as `pathfinder_driver::dispatch_bounded`, but
/// generalized to jobs that roll up many checker invocations into one
/// `GroupVerdict` rather than producing a single `TestResult`.
async fn dispatch_group_tests<F>(max_nproc: usize, jobs: Vec<F>) -> Vec<Result<()>>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_nproc.max(1)));
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| anyhow!(e))?;
            job.await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow!(join_err)),
        });
    }
    results
}

async fn test_group_member(cli: &Cli, cfg: &PathfinderConfig, trace: &Trace, pg: &PersistenceGraph, um: &[VertexId]) -> Result<GroupVerdict> {
    let extended = match cli.mode {
        TraceMode::Pm => um.to_vec(),
        TraceMode::Posix => {
            let vertex_ts: Vec<u64> = (0..pg.num_vertices()).map(|v| pg.event_ts(v)).collect();
            extend_representative(&um.to_vec(), &vertex_ts, trace, POSIX_REPRESENTATIVE_MARGIN)
        }
    };

    if extended.len() > cfg.max_um_size && cli.mode == TraceMode::Posix {
        // linear (prefix-only) strategy instead of full enumeration (spec §8
        // boundary behavior)
        let mut sorted = extended.clone();
        sorted.sort_unstable();
        return run_orders(cli, cfg, trace, pg, &extended, vec![sorted]).await;
    }

    let mut sub: Subgraph = extract_subgraph(pg, &extended);
    if cli.mode == TraceMode::Posix {
        contract_sync_family(&mut sub, |v| trace.events[pg.event_ts(v) as usize].kind.is_sync_family());
    }

    let cancel = CancellationFlag::new();
    let outcome = enumerate_downsets(&sub, &cancel, MAX_PERMS);
    if outcome.over_budget {
        warn!(produced = outcome.orders.len(), limit = MAX_PERMS, "enumeration truncated at MAX_PERMS");
    }
    if outcome.cancelled {
        warn!("enumeration cancelled before completion");
    }

    run_orders(cli, cfg, trace, pg, &extended, outcome.orders).await
}

async fn run_orders(cli: &Cli, cfg: &PathfinderConfig, trace: &Trace, pg: &PersistenceGraph, vertex_set: &[usize], orders: Vec<Vec<usize>>) -> Result<GroupVerdict> {
    let setup_until = vertex_set.iter().map(|&v| pg.event_ts(v) as usize).min().unwrap_or(0);
    let mode = match cli.mode {
        TraceMode::Pm => pathfinder_materialize::Mode::Pm,
        TraceMode::Posix => pathfinder_materialize::Mode::Posix,
    };
    let pruning = cli.mode == TraceMode::Pm;
    let mut materializer = Materializer::setup(mode, trace, setup_until, &cli.backup, pruning).map_err(|e| anyhow!(e))?;

    let checker_cfg = CheckerConfig {
        daemon_argv: cli.daemon.clone(),
        checker_argv: cli.checker.clone(),
        daemon_startup_delay: Duration::from_millis(200),
        test_timeout: cfg.test_timeout,
    };

    let mut results: Vec<TestResult> = Vec::with_capacity(orders.len());
    for order in orders {
        let event_ids: Vec<usize> = order.iter().map(|&v| pg.event_ts(v) as usize).collect();
        if materializer.already_tested(&event_ids) {
            continue;
        }
        materializer.apply_ordering(trace, &event_ids).map_err(|e| anyhow!(e))?;
        let result = pathfinder_driver::run_test(&checker_cfg, materializer.scratch_path()).await.map_err(|e| anyhow!(e))?;

        let ret_code = result.exit_code.unwrap_or(-1);
        let message = String::from_utf8_lossy(&result.stdout_stderr).into_owned();
        let note = result.note.clone().unwrap_or_default();
        csv_writer::append_row(&cli.output, &event_ids, ret_code, &message, &note, event_ids.last().copied().unwrap_or(0) as u64)?;

        materializer.restore(trace).map_err(|e| anyhow!(e))?;
        results.push(result);
    }

    Ok(roll_up(&results))
}
