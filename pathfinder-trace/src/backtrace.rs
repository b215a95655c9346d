// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// One stack frame of a captured backtrace.
///
/// Frames are stored top-of-call-first (the innermost, most-recently-called
/// frame first; the outer/caller frames last) per spec §3. A frame whose
/// source file could not be resolved is kept rather than dropped, with
/// `file` set to `None` — callers that need to tell "known" from "unknown"
/// frames (the POSIX stack-tree's "resolved prefix", spec §4.5) check this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub binary_address: u64,
}

impl StackFrame {
    pub fn new(
        function: Option<String>,
        file: Option<String>,
        line: Option<u32>,
        binary_address: u64,
    ) -> Self {
        Self {
            function,
            file,
            line,
            binary_address,
        }
    }

    pub fn unresolved(binary_address: u64) -> Self {
        Self {
            function: None,
            file: None,
            line: None,
            binary_address,
        }
    }

    /// True if this frame's source location is known. Used to compute the
    /// "resolved prefix" of a backtrace when building the POSIX stack tree.
    pub fn is_resolved(&self) -> bool {
        self.file.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// An ordered backtrace, top-of-call-first.
pub type Backtrace = Vec<StackFrame>;

/// The prefix of `bt` whose frames are all resolved, read from the outer
/// (last) frame inward, stopping at the first unresolved or mismatched
/// frame. Used by the POSIX extractor's stack tree (spec §4.5).
pub fn resolved_prefix(bt: &[StackFrame]) -> Vec<&StackFrame> {
    bt.iter().rev().take_while(|f| f.is_resolved()).collect()
}

/// Longest common prefix length of two resolved-prefix sequences (compared
/// outer-frame-first), by function identity (function name + file + line).
pub fn common_prefix_depth(a: &[&StackFrame], b: &[&StackFrame]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.function == y.function && x.file == y.file && x.line == y.line)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, file: &str, line: u32) -> StackFrame {
        StackFrame::new(Some(function.into()), Some(file.into()), Some(line), 0)
    }

    #[test]
    fn unresolved_frame_is_kept_but_flagged() {
        let f = StackFrame::unresolved(0x1234);
        assert!(!f.is_resolved());
        assert_eq!(f.binary_address, 0x1234);
    }

    #[test]
    fn common_prefix_depth_stops_at_first_divergence() {
        let a = vec![frame("main", "a.c", 1), frame("helper", "a.c", 2)];
        let b = vec![frame("main", "a.c", 1), frame("other", "a.c", 3)];
        let ra: Vec<&StackFrame> = a.iter().rev().collect();
        let rb: Vec<&StackFrame> = b.iter().rev().collect();
        assert_eq!(common_prefix_depth(&ra, &rb), 1);
    }
}
