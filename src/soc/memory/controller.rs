//! DRAM Controller.
//!
//! A sparse, line-granular store. Lines that were never written read as
//! zeros. The controller keeps read and write counts for the statistics
//! report; it does not model timing.

use crate::common::{Address, TileId};
use crate::soc::traits::BackingStore;
use log::trace;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Access counts of a DRAM controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DramCounters {
    pub reads: u64,
    pub writes: u64,
}

/// Line store attached to one home tile.
pub struct DramCntlr {
    line_bytes: usize,
    lines: Mutex<HashMap<Address, Vec<u8>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl DramCntlr {
    /// Creates an empty (all-zero) store.
    pub fn new(line_bytes: usize) -> Self {
        Self {
            line_bytes,
            lines: Mutex::new(HashMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Writes `data` at `address` without going through the protocol.
    ///
    /// Only meaningful before any tile caches the line.
    pub fn preload(&self, address: Address, data: &[u8]) {
        let mut line = vec![0; self.line_bytes];
        let n = data.len().min(self.line_bytes);
        line[..n].copy_from_slice(&data[..n]);
        self.lines.lock().insert(address, line);
    }

    /// Reads the line at `address` without counting the access.
    pub fn peek(&self, address: Address) -> Vec<u8> {
        self.lines
            .lock()
            .get(&address)
            .cloned()
            .unwrap_or_else(|| vec![0; self.line_bytes])
    }

    pub fn counters(&self) -> DramCounters {
        DramCounters {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

impl BackingStore for DramCntlr {
    fn get_data(&self, address: Address, requester: TileId) -> Vec<u8> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        trace!("dram read {:#x} for tile {}", address, requester);
        self.peek(address)
    }

    fn put_data(&self, address: Address, requester: TileId, data: &[u8]) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!("dram write {:#x} from tile {}", address, requester);
        self.preload(address, data);
    }
}
