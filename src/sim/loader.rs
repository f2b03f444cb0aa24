//! Access Trace Loader.
//!
//! A trace is a text file with one access per line:
//!
//! ```text
//! # tile op address size [value]
//! 0 W 0x1000 8 0xdeadbeef
//! 1 R 0x1000 8
//! 2 I 0x4000 4
//! ```
//!
//! `op` is `R` (read), `X` (read exclusive), `W` (write) or `I` (instruction
//! fetch). Addresses and values accept decimal or `0x` hex. Writes store the
//! value little-endian over `size` bytes. `#` starts a comment.

use crate::common::{AccessType, Address, MemComponent, TileId};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read trace '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {detail}")]
    Parse { line: usize, detail: String },
}

/// One access of a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceOp {
    pub tile: TileId,
    pub component: MemComponent,
    pub access: AccessType,
    pub address: Address,
    pub size: usize,
    /// Bytes stored by a write.
    pub data: Option<Vec<u8>>,
}

/// Reads and parses the trace at `path`.
pub fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TraceOp>, TraceError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_trace(&content)
}

/// Parses a trace held in memory.
pub fn parse_trace(content: &str) -> Result<Vec<TraceOp>, TraceError> {
    let mut ops = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        ops.push(parse_op(text).map_err(|detail| TraceError::Parse { line, detail })?);
    }
    Ok(ops)
}

fn parse_op(text: &str) -> Result<TraceOp, String> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(format!("expected 'tile op address size [value]', got '{}'", text));
    }

    let tile = parse_num(fields[0])? as TileId;
    let (component, access) = match fields[1] {
        "R" | "r" => (MemComponent::L1DCache, AccessType::Read),
        "X" | "x" => (MemComponent::L1DCache, AccessType::ReadEx),
        "W" | "w" => (MemComponent::L1DCache, AccessType::Write),
        "I" | "i" => (MemComponent::L1ICache, AccessType::Read),
        op => return Err(format!("unknown op '{}'", op)),
    };
    let address = parse_num(fields[2])?;
    let size = parse_num(fields[3])? as usize;
    if size == 0 || size > 8 {
        return Err(format!("size must be between 1 and 8 bytes, got {}", size));
    }

    let data = match (access, fields.get(4)) {
        (AccessType::Write, Some(value)) => {
            let value = parse_num(value)?;
            Some(value.to_le_bytes()[..size].to_vec())
        }
        (AccessType::Write, None) => return Err("write without a value".into()),
        (_, Some(_)) => return Err(format!("{} does not take a value", fields[1])),
        (_, None) => None,
    };
    if fields.len() > 5 {
        return Err(format!("trailing fields in '{}'", text));
    }

    Ok(TraceOp {
        tile,
        component,
        access,
        address,
        size,
        data,
    })
}

fn parse_num(field: &str) -> Result<u64, String> {
    let parsed = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse(),
    };
    parsed.map_err(|_| format!("invalid number '{}'", field))
}
