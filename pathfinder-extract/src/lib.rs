// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Update-Mechanism Extractor (C5) and Representative Relations (C6), spec
//! §4.5-4.6: PM epoch/field splitting, POSIX stack-tree extraction, and the
//! induced-subgraph/covers relations used to group Update Mechanisms.

mod pm_extract;
mod posix_extract;
mod relations;
mod stack_tree;
mod type_layout;
mod um;

pub use pm_extract::extract_pm;
pub use posix_extract::{extend_representative, extract_posix, PosixExtraction};
pub use relations::{build_sigma, equivalent_in_function, equivalent_in_type, group_update_mechanisms, split_by_clustering, um_relates, RelationKind};
pub use stack_tree::StackTree;
pub use type_layout::{FieldLayout, MapTypeOracle, TypeLayout, TypeOracle};
pub use um::{UpdateMechanism, UpdateMechanismGroup, VertexId};
