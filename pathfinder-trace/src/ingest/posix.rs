// SPDX-License-Identifier: Apache-2.0

//! Parser for the POSIX-workload trace format: one record per line,
//! `timestamp, tid, KIND, field, field, ...; frame; frame; ...` where each
//! frame is `function,file,line,hexaddr` and an empty `file` marks an
//! unresolved frame. Write/read buffers are base64-encoded (spec §3, §6).

use super::{IngestError, TraceBuilder};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::backtrace::{Backtrace, StackFrame};
use crate::event::{EventKind, OpenFlags, SyncFileRangeFlags, SyscallIo, Whence};
use crate::trace::Trace;

pub fn parse(input: &str, decompose_syscall: bool) -> Result<Trace, IngestError> {
    let mut builder = TraceBuilder::default();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (tid, kind, backtrace) = parse_record(line)?;
        builder.push(tid, kind, backtrace);
    }

    Ok(builder.finish(decompose_syscall))
}

fn parse_record(line: &str) -> Result<(u64, EventKind, Backtrace), IngestError> {
    let mut parts = line.splitn(2, ';');
    let head = parts.next().unwrap_or_default();
    let frames = parts.next().unwrap_or_default();

    let fields: Vec<&str> = head.split(',').map(str::trim).collect();
    // fields[0] = original timestamp (unused: TraceBuilder assigns its own
    // dense index), fields[1] = tid, fields[2] = KIND.
    if fields.len() < 3 {
        return Err(IngestError::Malformed(format!("record {line:?} missing KIND")));
    }
    let tid = fields[1].parse::<u64>().map_err(|e| bad(line, e))?;
    let kind_tag = fields[2];

    let kind = match kind_tag {
        "OPEN" => EventKind::Open {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
            flags: OpenFlags {
                creat: bool_field(&fields, 5, line)?,
                excl: bool_field(&fields, 6, line)?,
                trunc: bool_field(&fields, 7, line)?,
            },
        },
        "CREAT" => EventKind::Creat {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
        },
        "CLOSE" => EventKind::Close { fd: int(&fields, 3, line)? },
        "WRITE" | "PWRITE" | "WRITEV" | "PWRITEV" | "READ" | "PREAD" => {
            let io = SyscallIo {
                fd: int(&fields, 3, line)?,
                path: str_field(&fields, 4, line)?.to_string(),
                offset: uint(&fields, 5, line)?,
                size: uint(&fields, 6, line)?,
                buffer: decode_buffer(str_field(&fields, 7, line)?)?,
            };
            match kind_tag {
                "WRITE" => EventKind::Write(io),
                "PWRITE" => EventKind::Pwrite(io),
                "WRITEV" => EventKind::Writev(io),
                "PWRITEV" => EventKind::Pwritev(io),
                "READ" => EventKind::Read(io),
                _ => EventKind::Pread(io),
            }
        }
        "LSEEK" => EventKind::Lseek {
            fd: int(&fields, 3, line)?,
            offset: str_field(&fields, 4, line)?.parse::<i64>().map_err(|e| bad(line, e))?,
            whence: match str_field(&fields, 5, line)? {
                "SET" => Whence::Set,
                "CUR" => Whence::Cur,
                "END" => Whence::End,
                other => return Err(IngestError::Malformed(format!("bad whence {other:?} in {line:?}"))),
            },
        },
        "FTRUNCATE" => EventKind::Ftruncate {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
            new_len: uint(&fields, 5, line)?,
        },
        "FALLOCATE" => EventKind::Fallocate {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
            offset: uint(&fields, 5, line)?,
            len: uint(&fields, 6, line)?,
        },
        "RENAME" => EventKind::Rename {
            old_path: str_field(&fields, 3, line)?.to_string(),
            new_path: str_field(&fields, 4, line)?.to_string(),
        },
        "UNLINK" => EventKind::Unlink { path: str_field(&fields, 3, line)?.to_string() },
        "FSYNC" => EventKind::Fsync {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
        },
        "FDATASYNC" => EventKind::Fdatasync {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
        },
        "SYNC" => EventKind::Sync,
        "SYNCFS" => EventKind::Syncfs {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
        },
        "SYNC_FILE_RANGE" => EventKind::SyncFileRange {
            fd: int(&fields, 3, line)?,
            path: str_field(&fields, 4, line)?.to_string(),
            offset: uint(&fields, 5, line)?,
            len: uint(&fields, 6, line)?,
            flags: SyncFileRangeFlags {
                wait_before: bool_field(&fields, 7, line)?,
                write: bool_field(&fields, 8, line)?,
                wait_after: bool_field(&fields, 9, line)?,
            },
        },
        "MKDIR" => EventKind::Mkdir { path: str_field(&fields, 3, line)?.to_string() },
        "RMDIR" => EventKind::Rmdir { path: str_field(&fields, 3, line)?.to_string() },
        "PATHFINDER_BEGIN" => EventKind::MarkerBegin,
        "PATHFINDER_END" => EventKind::MarkerEnd,
        "PATHFINDER_OP_BEGIN" => EventKind::OpBegin {
            workload_tid: uint(&fields, 3, line)?,
            op_id: uint(&fields, 4, line)?,
        },
        "PATHFINDER_OP_END" => EventKind::OpEnd {
            workload_tid: uint(&fields, 3, line)?,
            op_id: uint(&fields, 4, line)?,
        },
        other => return Err(IngestError::UnrecognizedKind(other.to_string())),
    };

    Ok((tid, kind, parse_backtrace(frames)?))
}

fn str_field<'a>(fields: &[&'a str], idx: usize, line: &str) -> Result<&'a str, IngestError> {
    fields.get(idx).copied().ok_or_else(|| IngestError::Malformed(format!("record {line:?} missing field {idx}")))
}

fn int(fields: &[&str], idx: usize, line: &str) -> Result<i32, IngestError> {
    str_field(fields, idx, line)?.parse::<i32>().map_err(|e| bad(line, e))
}

fn uint(fields: &[&str], idx: usize, line: &str) -> Result<u64, IngestError> {
    str_field(fields, idx, line)?.parse::<u64>().map_err(|e| bad(line, e))
}

fn bool_field(fields: &[&str], idx: usize, line: &str) -> Result<bool, IngestError> {
    match str_field(fields, idx, line)? {
        "1" | "true" | "TRUE" => Ok(true),
        "0" | "false" | "FALSE" => Ok(false),
        other => Err(IngestError::Malformed(format!("bad bool {other:?} in {line:?}"))),
    }
}

fn bad(line: &str, err: impl std::fmt::Display) -> IngestError {
    IngestError::Malformed(format!("record {line:?}: {err}"))
}

fn decode_buffer(s: &str) -> Result<Vec<u8>, IngestError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    BASE64.decode(s).map_err(|e| IngestError::Malformed(format!("bad base64 buffer: {e}")))
}

/// `frames` is `;`-separated; each frame is `function,file,line,hexaddr`
/// with an empty `file` meaning the frame couldn't be resolved.
fn parse_backtrace(frames: &str) -> Result<Backtrace, IngestError> {
    frames
        .split(';')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(parse_frame)
        .collect()
}

fn parse_frame(frame: &str) -> Result<StackFrame, IngestError> {
    let parts: Vec<&str> = frame.split(',').collect();
    if parts.len() != 4 {
        return Err(IngestError::Malformed(format!("malformed stack frame {frame:?}")));
    }
    let addr = parts[3].trim();
    let addr = addr.strip_prefix("0x").unwrap_or(addr);
    let binary_address =
        u64::from_str_radix(addr, 16).map_err(|e| IngestError::Malformed(format!("bad frame address {addr:?}: {e}")))?;
    if parts[1].trim().is_empty() {
        return Ok(StackFrame::unresolved(binary_address));
    }
    let function = if parts[0].trim().is_empty() { None } else { Some(parts[0].trim().to_string()) };
    let line = parts[2].trim().parse::<u32>().ok();
    Ok(StackFrame::new(function, Some(parts[1].trim().to_string()), line, binary_address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_write_close_sequence() {
        let input = "0,1,OPEN,3,/f,1,0,0;main,a.c,10,0x400100\n\
                      1,1,WRITE,3,/f,0,4,AQIDBA==;main,a.c,11,0x400110\n\
                      2,1,CLOSE,3;main,a.c,12,0x400120\n";
        let trace = parse(input, false).unwrap();
        assert_eq!(trace.events.len(), 3);
        match &trace.events[1].kind {
            EventKind::Write(io) => assert_eq!(io.buffer, vec![1, 2, 3, 4]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unresolved_frame_has_empty_file() {
        let input = "0,1,SYNC;,,,0x1\n";
        let trace = parse(input, false).unwrap();
        assert!(!trace.events[0].backtrace[0].is_resolved());
    }

    #[test]
    fn op_markers_carry_workload_tid_and_id() {
        let input = "0,1,PATHFINDER_OP_BEGIN,7,42;\n1,1,SYNC;\n2,1,PATHFINDER_OP_END,7,42;\n";
        let trace = parse(input, false).unwrap();
        assert!(matches!(trace.events[0].kind, EventKind::OpBegin { workload_tid: 7, op_id: 42 }));
        assert!(matches!(trace.events[2].kind, EventKind::OpEnd { workload_tid: 7, op_id: 42 }));
    }

    #[test]
    fn rejects_unknown_kind() {
        let input = "0,1,BOGUS;\n";
        assert!(parse(input, false).is_err());
    }
}
