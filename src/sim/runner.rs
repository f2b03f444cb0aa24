//! Trace Runner.
//!
//! Replays a trace against a [`System`]. Each tile's accesses run in trace
//! order on their own issuing thread; accesses of different tiles interleave
//! freely.

use super::loader::TraceOp;
use crate::common::{AccessType, SimError, TileId};
use crate::soc::System;
use log::debug;
use serde::Serialize;
use std::thread;

/// Outcome of replaying a trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub accesses: u64,
    pub l1_hits: u64,
}

/// Replays `ops` and waits for the system to quiesce.
pub fn run_trace(system: &System, ops: &[TraceOp]) -> Result<RunSummary, SimError> {
    let mut streams: Vec<Vec<&TraceOp>> = vec![Vec::new(); system.num_tiles()];
    for op in ops {
        let stream = streams.get_mut(op.tile).ok_or_else(|| {
            SimError::InvalidAccess(format!("trace names tile {} but the system has {}", op.tile, system.num_tiles()))
        })?;
        stream.push(op);
    }

    let results: Vec<Result<RunSummary, SimError>> = thread::scope(|scope| {
        let handles: Vec<_> = streams
            .iter()
            .enumerate()
            .filter(|(_, stream)| !stream.is_empty())
            .map(|(tile, stream)| scope.spawn(move || run_stream(system, tile, stream)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(Err(SimError::Aborted)))
            .collect()
    });

    let mut summary = RunSummary::default();
    for result in results {
        let part = result?;
        summary.accesses += part.accesses;
        summary.l1_hits += part.l1_hits;
    }
    system.quiesce()?;
    Ok(summary)
}

fn run_stream(system: &System, tile: TileId, stream: &[&TraceOp]) -> Result<RunSummary, SimError> {
    let mut summary = RunSummary::default();
    for op in stream {
        let mut buf = match &op.data {
            Some(data) => data.clone(),
            None => vec![0; op.size],
        };
        let hit = system.access(tile, op.component, op.access, op.address, &mut buf)?;
        if op.access != AccessType::Write {
            let mut value = [0u8; 8];
            value[..buf.len()].copy_from_slice(&buf);
            debug!(
                "tile {} {} {:#x} -> {:#x}{}",
                tile,
                op.component,
                op.address,
                u64::from_le_bytes(value),
                if hit { " (hit)" } else { "" }
            );
        }
        summary.accesses += 1;
        summary.l1_hits += u64::from(hit);
    }
    Ok(summary)
}
