// SPDX-License-Identifier: Apache-2.0

//! Append-only result CSV (spec §6 "Persistent state layout"): one row per
//! tested ordering, columns `event_id_1, …, event_id_N, ret_code, message,
//! note, timestamp`.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub fn append_row(path: &Path, event_ids: &[usize], ret_code: i32, message: &str, note: &str, timestamp: u64) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).with_context(|| format!("opening result CSV {}", path.display()))?;

    let ids = event_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
    writeln!(file, "{ids},{ret_code},{},{},{timestamp}", csv_escape(message), csv_escape(note)).context("writing result row")?;
    Ok(())
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_rows_with_escaped_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        append_row(&path, &[1, 2, 3], 0, "ok", "", 42).unwrap();
        append_row(&path, &[4], 1, "bad, value", "timeout", 43).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "1,2,3,0,ok,,42");
        assert_eq!(lines[1], "4,1,\"bad, value\",timeout,43");
    }
}
