// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Happens-before persistence-graph construction and partial-order
//! enumeration (spec §4).

mod enumerate;
mod graph;
mod persistence_graph;
pub mod pm;
pub mod posix;
mod subgraph;

pub use enumerate::{enumerate_downsets, EnumerationOutcome};
pub use graph::Graph;
pub use persistence_graph::PersistenceGraph;
pub use subgraph::{contract_sync_family, extract, Subgraph};
