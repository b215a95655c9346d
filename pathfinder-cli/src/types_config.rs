// SPDX-License-Identifier: Apache-2.0

//! Loads the PM type-layout table the `TypeOracle` needs for field-level
//! equivalence (spec §4.6, §9 "PM field math"). The wire format has no
//! analogue upstream; this is new bookkeeping for the `pm` CLI mode.

use anyhow::{Context, Result};
use pathfinder_extract::{FieldLayout, MapTypeOracle, TypeLayout};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FieldEntry {
    name: String,
    offset: u64,
    size: u64,
    #[serde(default)]
    is_array: bool,
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    name: String,
    base_address: u64,
    size: u64,
    #[serde(default)]
    fields: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
struct TypesFile {
    #[serde(rename = "type", default)]
    types: Vec<TypeEntry>,
}

pub fn load(path: &Path) -> Result<MapTypeOracle> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading type table {}", path.display()))?;
    let parsed: TypesFile = toml::from_str(&raw).with_context(|| format!("parsing type table {}", path.display()))?;

    let mut oracle = MapTypeOracle::new();
    for entry in parsed.types {
        let layout = if entry.fields.is_empty() {
            TypeLayout::Scalar { size: entry.size }
        } else {
            TypeLayout::Struct {
                name: entry.name,
                size: entry.size,
                fields: entry
                    .fields
                    .into_iter()
                    .map(|f| FieldLayout { name: f.name, offset: f.offset, size: f.size, is_array: f.is_array })
                    .collect(),
            }
        };
        oracle.register(entry.base_address, layout);
    }
    Ok(oracle)
}
