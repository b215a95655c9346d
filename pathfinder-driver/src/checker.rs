// SPDX-License-Identifier: Apache-2.0

//! Daemon-then-checker subprocess driving (spec §4.8).

use crate::result::TestResult;
use pathfinder_common::{PathfinderError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// One checker (and optional daemon) invocation, fully configured.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub daemon_argv: Option<Vec<String>>,
    pub checker_argv: Vec<String>,
    /// Fixed delay after spawning the daemon, before the checker runs.
    pub daemon_startup_delay: Duration,
    pub test_timeout: Duration,
}

fn resource(operation: &'static str, source: std::io::Error) -> PathfinderError {
    PathfinderError::ResourceFailure { operation, source }
}

fn spawn(argv: &[String], cwd: &Path) -> Result<Child> {
    let (program, args) = argv.split_first().ok_or_else(|| PathfinderError::MalformedInput("empty checker argv".into()))?;
    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Structured handle that unconditionally reaps the child on drop
        // (spec §9 design note on subprocess management), so a timed-out
        // wait still force-terminates the process.
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| resource("spawn checker", e))
}

/// Runs one test: optionally spawns a daemon, waits out its startup delay,
/// spawns the checker, and classifies the result (spec §4.8 steps 1-4).
pub async fn run_test(cfg: &CheckerConfig, cwd: &Path) -> Result<TestResult> {
    let mut daemon = match &cfg.daemon_argv {
        Some(argv) => Some(spawn(argv, cwd)?),
        None => None,
    };
    if daemon.is_some() {
        tokio::time::sleep(cfg.daemon_startup_delay).await;
    }

    let checker = spawn(&cfg.checker_argv, cwd)?;
    let result = match tokio::time::timeout(cfg.test_timeout, checker.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            TestResult { exit_code: output.status.code(), stdout_stderr: combined, note: None, file_images: None }
        }
        Ok(Err(e)) => return Err(resource("wait checker", e)),
        Err(_elapsed) => TestResult::timed_out(format!("checker exceeded its {:?} deadline", cfg.test_timeout)),
    };

    if let Some(mut daemon_child) = daemon.take() {
        let _ = daemon_child.start_kill();
        let _ = daemon_child.wait().await;
    }

    Ok(result)
}

/// Attaches compressed snapshots of the given mapped regions to a result
/// (spec §4.8 step 5, gated by `save_pm_images`).
pub fn attach_file_images(mut result: TestResult, regions: Vec<(std::path::PathBuf, &[u8])>) -> TestResult {
    result.file_images = Some(regions.into_iter().map(|(path, bytes)| (path, compress(bytes))).collect());
    result
}

fn compress(bytes: &[u8]) -> Vec<u8> {
    // Placeholder for the configured compressor; callers treat this as an
    // opaque blob keyed by the same path for offline inspection.
    bytes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_checker_is_classified_consistent() {
        let cfg = CheckerConfig {
            daemon_argv: None,
            checker_argv: vec!["/bin/true".into()],
            daemon_startup_delay: Duration::from_millis(0),
            test_timeout: Duration::from_secs(5),
        };
        let cwd = tempfile::tempdir().unwrap();
        let result = run_test(&cfg, cwd.path()).await.unwrap();
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn failing_checker_is_classified_inconsistent() {
        let cfg = CheckerConfig {
            daemon_argv: None,
            checker_argv: vec!["/bin/false".into()],
            daemon_startup_delay: Duration::from_millis(0),
            test_timeout: Duration::from_secs(5),
        };
        let cwd = tempfile::tempdir().unwrap();
        let result = run_test(&cfg, cwd.path()).await.unwrap();
        assert_ne!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn hung_checker_times_out() {
        let cfg = CheckerConfig {
            daemon_argv: None,
            checker_argv: vec!["/bin/sleep".into(), "5".into()],
            daemon_startup_delay: Duration::from_millis(0),
            test_timeout: Duration::from_millis(50),
        };
        let cwd = tempfile::tempdir().unwrap();
        let result = run_test(&cfg, cwd.path()).await.unwrap();
        assert!(result.exit_code.is_none());
        assert!(result.note.is_some());
    }
}
