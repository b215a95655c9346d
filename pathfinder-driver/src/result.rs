// SPDX-License-Identifier: Apache-2.0

//! Per-test and per-group verdicts (spec §4.8).

use std::path::PathBuf;

/// The outcome of one checker invocation.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// `None` when the checker was force-terminated for exceeding its
    /// deadline rather than exiting on its own.
    pub exit_code: Option<i32>,
    pub stdout_stderr: Vec<u8>,
    pub note: Option<String>,
    /// Compressed snapshots of every mapped region, present only when
    /// `save_pm_images` is enabled (spec §6).
    pub file_images: Option<Vec<(PathBuf, Vec<u8>)>>,
}

impl TestResult {
    pub fn timed_out(note: impl Into<String>) -> Self {
        Self { exit_code: None, stdout_stderr: Vec::new(), note: Some(note.into()), file_images: None }
    }

    /// `exit_code == 0` means consistent; anything else, including a forced
    /// termination, means inconsistent (spec §4.8 step 3).
    pub fn verdict(&self) -> Verdict {
        match self.exit_code {
            Some(0) => Verdict::Consistent,
            _ => Verdict::Inconsistent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    Inconsistent,
}

/// The roll-up of every ordering tested for one representative (spec
/// §4.8 "Verdict roll-up").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupVerdict {
    NoBugs,
    HasBugs,
    /// Every tested ordering was inconsistent; suppresses follow-up testing
    /// for the whole group.
    AllInconsistent,
}

/// Rolls up individual `TestResult`s into one group verdict. Commutative:
/// order of `results` does not affect the outcome (spec §5 "Ordering
/// guarantees").
pub fn roll_up(results: &[TestResult]) -> GroupVerdict {
    if results.is_empty() {
        return GroupVerdict::NoBugs;
    }
    let inconsistent = results.iter().filter(|r| r.verdict() == Verdict::Inconsistent).count();
    if inconsistent == 0 {
        GroupVerdict::NoBugs
    } else if inconsistent == results.len() {
        GroupVerdict::AllInconsistent
    } else {
        GroupVerdict::HasBugs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consistent() -> TestResult {
        TestResult { exit_code: Some(0), stdout_stderr: vec![], note: None, file_images: None }
    }

    fn inconsistent() -> TestResult {
        TestResult { exit_code: Some(1), stdout_stderr: vec![], note: None, file_images: None }
    }

    #[test]
    fn empty_results_is_no_bugs() {
        assert_eq!(roll_up(&[]), GroupVerdict::NoBugs);
    }

    #[test]
    fn all_consistent_is_no_bugs() {
        assert_eq!(roll_up(&[consistent(), consistent()]), GroupVerdict::NoBugs);
    }

    #[test]
    fn mixed_is_has_bugs() {
        assert_eq!(roll_up(&[consistent(), inconsistent()]), GroupVerdict::HasBugs);
    }

    #[test]
    fn all_inconsistent_is_all_inconsistent() {
        assert_eq!(roll_up(&[inconsistent(), inconsistent()]), GroupVerdict::AllInconsistent);
    }

    #[test]
    fn timed_out_result_classifies_as_inconsistent_with_note() {
        let r = TestResult::timed_out("checker exceeded deadline");
        assert_eq!(r.verdict(), Verdict::Inconsistent);
        assert!(r.note.is_some());
    }
}
