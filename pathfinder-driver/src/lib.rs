// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Checker Driver (C8), spec §4.8: daemon-then-checker subprocess spawning,
//! verdict classification and roll-up, and bounded-parallel dispatch.

mod checker;
mod dispatch;
mod result;

pub use checker::{attach_file_images, run_test, CheckerConfig};
pub use dispatch::dispatch_bounded;
pub use result::{roll_up, GroupVerdict, TestResult, Verdict};
