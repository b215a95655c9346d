// SPDX-License-Identifier: Apache-2.0

//! Parser for the PM-workload trace format: a `START||...||STOP`-framed
//! stream of `;`-delimited records, one per traced PM operation (spec §3,
//! §6). Hex-encoded addresses/sizes/values; backtraces are a comma-separated
//! list of `0xADDR: function (file:line)` frames, innermost frame first.

use super::{IngestError, TraceBuilder};
use crate::backtrace::{Backtrace, StackFrame};
use crate::event::{EventKind, SyscallIo};
use crate::trace::Trace;

const RECORD_SEP: &str = "||";
const START_TOKEN: &str = "START";
const STOP_TOKEN: &str = "STOP";

/// Parses a full PM trace and decomposes it into a [`Trace`]. `max_um_size`'s
/// companion `decompose_syscall` toggle governs whether syscall-derived
/// micro-events are populated (the PM format has no syscalls of its own, so
/// this only affects the rare workload that mixes PM stores with POSIX
/// metadata calls over the same file).
pub fn parse(input: &str, decompose_syscall: bool) -> Result<Trace, IngestError> {
    let trimmed = input.trim();
    let mut records = trimmed.split(RECORD_SEP).map(str::trim).filter(|s| !s.is_empty());

    match records.next() {
        Some(tok) if tok == START_TOKEN => {}
        Some(other) => return Err(IngestError::Malformed(format!("expected START, got {other:?}"))),
        None => return Err(IngestError::Malformed("empty trace".into())),
    }

    let mut builder = TraceBuilder::default();
    let mut saw_stop = false;

    for record in records {
        if record == STOP_TOKEN {
            saw_stop = true;
            break;
        }
        let (tid, kind, backtrace) = parse_record(record)?;
        builder.push(tid, kind, backtrace);
    }

    if !saw_stop {
        return Err(IngestError::Malformed("trace missing STOP marker".into()));
    }

    Ok(builder.finish(decompose_syscall))
}

fn parse_record(record: &str) -> Result<(u64, EventKind, Backtrace), IngestError> {
    let fields: Vec<&str> = record.split(';').collect();
    let kind_tag = *fields.first().ok_or_else(|| IngestError::Malformed("empty record".into()))?;
    let tid = field(&fields, 1, record)?.parse::<u64>().map_err(|e| bad(record, e))?;

    let (kind, backtrace) = match kind_tag {
        "STORE" => {
            let address = parse_hex(field(&fields, 2, record)?)?;
            let size = parse_hex(field(&fields, 3, record)?)? as u32;
            let value = hex_to_bytes(field(&fields, 4, record)?)?;
            let bt = parse_backtrace(field(&fields, 5, record)?)?;
            (EventKind::Store { address, size, value }, bt)
        }
        "FLUSH" => {
            let address = parse_hex(field(&fields, 2, record)?)?;
            let size = parse_hex(field(&fields, 3, record)?)? as u32;
            let bt = parse_backtrace(field(&fields, 4, record)?)?;
            (EventKind::Flush { address, size }, bt)
        }
        "FENCE" => {
            let bt = parse_backtrace(field(&fields, 2, record)?)?;
            (EventKind::Fence, bt)
        }
        "MSYNC" => {
            let address = parse_hex(field(&fields, 2, record)?)?;
            let size = parse_hex(field(&fields, 3, record)?)? as u32;
            let bt = parse_backtrace(field(&fields, 4, record)?)?;
            (EventKind::MSync { address, size }, bt)
        }
        "REGISTER_FILE" => {
            let path = field(&fields, 2, record)?.to_string();
            let address = parse_hex(field(&fields, 3, record)?)?;
            let size = parse_hex(field(&fields, 4, record)?)?;
            let bt = parse_backtrace(field(&fields, 5, record)?)?;
            (EventKind::RegisterFile { path, address, size }, bt)
        }
        "UNREGISTER_FILE" => {
            let address = parse_hex(field(&fields, 2, record)?)?;
            let size = parse_hex(field(&fields, 3, record)?)?;
            let bt = parse_backtrace(field(&fields, 4, record)?)?;
            (EventKind::UnregisterFile { address, size }, bt)
        }
        "WRITE" | "PWRITEV" => {
            let fd = field(&fields, 2, record)?.parse::<i32>().map_err(|e| bad(record, e))?;
            let path = field(&fields, 3, record)?.to_string();
            let offset = field(&fields, 4, record)?.parse::<u64>().map_err(|e| bad(record, e))?;
            let size = field(&fields, 5, record)?.parse::<u64>().map_err(|e| bad(record, e))?;
            let buffer = decode_buffer(field(&fields, 6, record)?);
            let bt = parse_backtrace(field(&fields, 7, record)?)?;
            let io = SyscallIo { fd, path, offset, size, buffer };
            let kind = if kind_tag == "WRITE" { EventKind::Write(io) } else { EventKind::Pwritev(io) };
            (kind, bt)
        }
        "FTRUNCATE" => {
            let fd = field(&fields, 2, record)?.parse::<i32>().map_err(|e| bad(record, e))?;
            let path = field(&fields, 3, record)?.to_string();
            let new_len = field(&fields, 4, record)?.parse::<u64>().map_err(|e| bad(record, e))?;
            let bt = parse_backtrace(field(&fields, 5, record)?)?;
            (EventKind::Ftruncate { fd, path, new_len }, bt)
        }
        "FALLOCATE" => {
            let fd = field(&fields, 2, record)?.parse::<i32>().map_err(|e| bad(record, e))?;
            let path = field(&fields, 3, record)?.to_string();
            let offset = field(&fields, 4, record)?.parse::<u64>().map_err(|e| bad(record, e))?;
            let len = field(&fields, 5, record)?.parse::<u64>().map_err(|e| bad(record, e))?;
            let bt = parse_backtrace(field(&fields, 6, record)?)?;
            (EventKind::Fallocate { fd, path, offset, len }, bt)
        }
        "PATHFINDER_BEGIN" => (EventKind::MarkerBegin, Vec::new()),
        "PATHFINDER_END" => (EventKind::MarkerEnd, Vec::new()),
        other => return Err(IngestError::UnrecognizedKind(other.to_string())),
    };

    Ok((tid, kind, backtrace))
}

fn field<'a>(fields: &[&'a str], idx: usize, record: &str) -> Result<&'a str, IngestError> {
    fields
        .get(idx)
        .copied()
        .ok_or_else(|| IngestError::Malformed(format!("record {record:?} missing field {idx}")))
}

fn bad(record: &str, err: impl std::fmt::Display) -> IngestError {
    IngestError::Malformed(format!("record {record:?}: {err}"))
}

fn parse_hex(s: &str) -> Result<u64, IngestError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| IngestError::Malformed(format!("bad hex {s:?}: {e}")))
}

fn hex_to_bytes(s: &str) -> Result<Vec<u8>, IngestError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(IngestError::Malformed(format!("odd-length hex value {s:?}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| IngestError::Malformed(format!("bad hex byte: {e}"))))
        .collect()
}

/// Buffers embed `NEWLINE`/`SEMICOMMA` tokens in place of literal bytes that
/// would otherwise collide with the record/field delimiters.
fn decode_buffer(s: &str) -> Vec<u8> {
    s.replace("NEWLINE", "\n").replace("SEMICOMMA", ";").into_bytes()
}

/// Frames are `addr: function (file:line)`, comma-separated, innermost
/// first; `addr: ??` marks an unresolved frame.
fn parse_backtrace(s: &str) -> Result<Backtrace, IngestError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(str::trim).filter(|f| !f.is_empty()).map(parse_frame).collect()
}

fn parse_frame(frame: &str) -> Result<StackFrame, IngestError> {
    let (addr_part, rest) = frame
        .split_once(':')
        .ok_or_else(|| IngestError::Malformed(format!("malformed frame {frame:?}")))?;
    let binary_address = parse_hex(addr_part.trim())?;
    let rest = rest.trim();
    if rest == "??" {
        return Ok(StackFrame::unresolved(binary_address));
    }
    let (function, loc) = match rest.split_once('(') {
        Some((f, loc)) => (f.trim(), loc.trim_end_matches(')')),
        None => (rest, ""),
    };
    let (file, line) = match loc.rsplit_once(':') {
        Some((file, line)) => (Some(file.to_string()), line.parse::<u32>().ok()),
        None => (None, None),
    };
    Ok(StackFrame::new(Some(function.to_string()), file, line, binary_address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_flush_fence_sequence() {
        let input = "START||STORE;1;0x1000;8;00000000deadbeef;0x400100: main (a.c:10)||FLUSH;1;0x1000;8;0x400100: main (a.c:10)||FENCE;1;||STOP";
        let trace = parse(input, false).unwrap();
        assert_eq!(trace.events.len(), 3);
        assert!(matches!(trace.events[0].kind, EventKind::Store { .. }));
        assert_eq!(trace.events[0].store_id, Some(0));
        assert!(matches!(trace.events[1].kind, EventKind::Flush { .. }));
        assert!(matches!(trace.events[2].kind, EventKind::Fence));
    }

    #[test]
    fn unresolved_frame_is_kept() {
        let input = "START||FENCE;1;0x1: ??||STOP";
        let trace = parse(input, false).unwrap();
        assert_eq!(trace.events[0].backtrace.len(), 1);
        assert!(!trace.events[0].backtrace[0].is_resolved());
    }

    #[test]
    fn markers_produce_testing_range() {
        let input = "START||PATHFINDER_BEGIN;1||FENCE;1;||PATHFINDER_END;1||STOP";
        let trace = parse(input, false).unwrap();
        assert_eq!(trace.testing_ranges, vec![(0, 2)]);
    }

    #[test]
    fn missing_stop_is_malformed() {
        let input = "START||FENCE;1;";
        assert!(parse(input, false).is_err());
    }

    #[test]
    fn register_file_parses_path_and_extent() {
        let input = "START||REGISTER_FILE;1;/mnt/pmem/f;0x7f0000000000;0x100000;||STOP";
        let trace = parse(input, false).unwrap();
        match &trace.events[0].kind {
            EventKind::RegisterFile { path, address, size } => {
                assert_eq!(path, "/mnt/pmem/f");
                assert_eq!(*address, 0x7f0000000000);
                assert_eq!(*size, 0x100000);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
