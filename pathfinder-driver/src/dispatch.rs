// SPDX-License-Identifier: Apache-2.0

//! Bounded-parallel test dispatch: at most `max_nproc` outstanding tests,
//! completed futures drained by polling at a fixed interval (spec §4.8,
//! §5 "Scheduling model").

use crate::result::TestResult;
use pathfinder_common::{PathfinderError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs every job with at most `max_nproc` concurrently outstanding,
/// draining completed ones every `poll_interval`. Each worker owns exactly
/// one test instance, matching the one-thread-per-test scheduling model.
pub async fn dispatch_bounded<F>(max_nproc: usize, poll_interval: Duration, jobs: Vec<F>) -> Vec<Result<TestResult>>
where
    F: Future<Output = Result<TestResult>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_nproc.max(1)));
    let mut handles: Vec<JoinHandle<Result<TestResult>>> = Vec::with_capacity(jobs.len());

    for job in jobs {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(anyhow::Error::from)?;
            job.await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    let mut remaining = handles;
    let mut interval = tokio::time::interval(poll_interval);
    while !remaining.is_empty() {
        interval.tick().await;
        let mut still_running = Vec::new();
        for handle in remaining {
            if handle.is_finished() {
                match handle.await {
                    Ok(result) => results.push(result),
                    Err(join_err) => results.push(Err(PathfinderError::Other(anyhow::anyhow!(join_err)))),
                }
            } else {
                still_running.push(handle);
            }
        }
        remaining = still_running;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_all_jobs_and_collects_results() {
        let jobs: Vec<_> = (0..5)
            .map(|i| async move {
                Ok(TestResult { exit_code: Some(i % 2), stdout_stderr: vec![], note: None, file_images: None })
            })
            .collect();
        let results = dispatch_bounded(2, Duration::from_millis(5), jobs).await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn never_exceeds_max_nproc_concurrent_jobs() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..8)
            .map(|_| {
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(TestResult { exit_code: Some(0), stdout_stderr: vec![], note: None, file_images: None })
                }
            })
            .collect();
        dispatch_bounded(3, Duration::from_millis(5), jobs).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
