//! System Builder.
//!
//! [`System`] wires the tiles, the interconnect and the address-home lookup
//! together from a [`Config`] and runs one message-delivery thread per tile.
//! The first fatal protocol error stops every delivery thread and fails all
//! outstanding misses.

use super::home::AddressHomeLookup;
use super::interconnect::{Delivery, Interconnect};
use super::traits::Network;
use crate::common::addr::line_address;
use crate::common::{AccessType, Address, MemComponent, ProtocolError, SimError, TileId};
use crate::config::{Config, ConfigError};
use crate::core::units::cache::line::CacheState;
use crate::core::Tile;
use crate::directory::{DirectoryEntry, DirectoryState};
use crate::stats::{SimStats, TileStats};
use crossbeam_channel::Receiver;
use crossbeam_utils::Backoff;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A running multi-tile memory system.
pub struct System {
    tiles: Vec<Arc<Tile>>,
    interconnect: Arc<Interconnect>,
    home_lookup: Arc<AddressHomeLookup>,
    workers: Vec<JoinHandle<()>>,
    fatal: Arc<Mutex<Option<ProtocolError>>>,
    line_bytes: usize,
    started: Instant,
}

impl System {
    /// Validates `config`, builds every tile and starts the delivery threads.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_tiles = config.general.num_tiles;
        let line_bytes = config.general.line_bytes;

        let (interconnect, receivers) = Interconnect::new(num_tiles);
        let interconnect = Arc::new(interconnect);
        let network: Arc<dyn Network> = interconnect.clone();
        let home_lookup = Arc::new(AddressHomeLookup::new(line_bytes, config.home_tiles()));

        let tiles: Vec<Arc<Tile>> = (0..num_tiles)
            .map(|id| Arc::new(Tile::new(id, config, home_lookup.clone(), network.clone())))
            .collect();

        let fatal = Arc::new(Mutex::new(None));
        let workers = tiles
            .iter()
            .zip(receivers)
            .map(|(tile, rx)| {
                let tile = tile.clone();
                let interconnect = interconnect.clone();
                let fatal = fatal.clone();
                thread::spawn(move || delivery_loop(tile, rx, interconnect, fatal))
            })
            .collect();

        info!(
            "system up: {} tiles, {} byte lines, homes {:?}",
            num_tiles,
            line_bytes,
            home_lookup.homes()
        );

        Ok(Self {
            tiles,
            interconnect,
            home_lookup,
            workers,
            fatal,
            line_bytes,
            started: Instant::now(),
        })
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    /// Returns tile `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn tile(&self, id: TileId) -> &Tile {
        &self.tiles[id]
    }

    pub fn home_of(&self, address: Address) -> TileId {
        self.home_lookup.home_of(address)
    }

    /// Performs a memory access on behalf of tile `tile`.
    ///
    /// # Returns
    ///
    /// `true` if the access hit in L1.
    pub fn access(
        &self,
        tile: TileId,
        component: MemComponent,
        access: AccessType,
        address: Address,
        buf: &mut [u8],
    ) -> Result<bool, SimError> {
        if let Some(err) = self.fatal_error() {
            return Err(err.into());
        }
        let tile = self
            .tiles
            .get(tile)
            .ok_or_else(|| SimError::InvalidAccess(format!("tile {} does not exist", tile)))?;
        tile.access(component, access, address, buf)
    }

    pub fn read(&self, tile: TileId, address: Address, buf: &mut [u8]) -> Result<bool, SimError> {
        self.access(tile, MemComponent::L1DCache, AccessType::Read, address, buf)
    }

    /// Reads with exclusive permission, as a core does ahead of a store.
    pub fn read_exclusive(&self, tile: TileId, address: Address, buf: &mut [u8]) -> Result<bool, SimError> {
        self.access(tile, MemComponent::L1DCache, AccessType::ReadEx, address, buf)
    }

    pub fn write(&self, tile: TileId, address: Address, bytes: &[u8]) -> Result<bool, SimError> {
        let mut buf = bytes.to_vec();
        self.access(tile, MemComponent::L1DCache, AccessType::Write, address, &mut buf)
    }

    /// Instruction fetch through L1-I.
    pub fn fetch(&self, tile: TileId, address: Address, buf: &mut [u8]) -> Result<bool, SimError> {
        self.access(tile, MemComponent::L1ICache, AccessType::Read, address, buf)
    }

    /// Blocks until no message is in flight.
    ///
    /// Returns the fatal error instead if one stopped the system.
    pub fn quiesce(&self) -> Result<(), SimError> {
        let backoff = Backoff::new();
        loop {
            if let Some(err) = self.fatal_error() {
                return Err(err.into());
            }
            if self.interconnect.in_flight() == 0 {
                return Ok(());
            }
            if backoff.is_completed() {
                thread::sleep(Duration::from_micros(50));
            } else {
                backoff.snooze();
            }
        }
    }

    /// First fatal protocol error raised by a delivery thread, if any.
    pub fn fatal_error(&self) -> Option<ProtocolError> {
        self.fatal.lock().clone()
    }

    /// Snapshot of the directory entry tracking `address`.
    pub fn directory_entry(&self, address: Address) -> Option<DirectoryEntry> {
        let address = line_address(address, self.line_bytes);
        let home = self.tiles.get(self.home_of(address))?;
        let directory = home.directory()?;
        directory.entry(address).cloned()
    }

    /// Contents of `address`'s line in its home DRAM.
    pub fn dram_line(&self, address: Address) -> Option<Vec<u8>> {
        let address = line_address(address, self.line_bytes);
        let home = self.tiles.get(self.home_of(address))?;
        home.dram().map(|dram| dram.peek(address))
    }

    /// Checks the global coherence invariants of a quiescent system.
    ///
    /// * At most one L2 holds a line MODIFIED, and then no other L2 holds it.
    /// * Every valid L2 line is tracked by its home directory in a matching
    ///   state: MODIFIED lines by their owner, SHARED lines as a sharer.
    /// * Every directory entry satisfies its own invariants.
    pub fn check_coherence(&self) -> Result<(), ProtocolError> {
        let mut holders: HashMap<Address, Vec<(TileId, CacheState)>> = HashMap::new();
        for tile in &self.tiles {
            for (address, state) in tile.l2_lines() {
                holders.entry(address).or_default().push((tile.id(), state));
            }
            if let Some(directory) = tile.directory() {
                directory.check_invariants()?;
            }
        }

        for (address, copies) in holders {
            let modified = copies
                .iter()
                .filter(|(_, state)| *state == CacheState::Modified)
                .count();
            if modified > 0 && copies.len() > 1 {
                return Err(ProtocolError::SharerInvariant {
                    address,
                    detail: format!("MODIFIED line also held elsewhere: {:?}", copies),
                });
            }

            let entry = self.directory_entry(address).ok_or_else(|| {
                ProtocolError::SharerInvariant {
                    address,
                    detail: format!("cached by {:?} but untracked by the directory", copies),
                }
            })?;
            for (tile, state) in copies {
                let tracked = match state {
                    CacheState::Modified => {
                        entry.state() == DirectoryState::Modified && entry.owner() == Some(tile)
                    }
                    CacheState::Shared => {
                        entry.state() == DirectoryState::Shared
                            && (entry.has_sharer(tile) || entry.sharers().is_global())
                    }
                    CacheState::Invalid => true,
                };
                if !tracked {
                    return Err(ProtocolError::SharerInvariant {
                        address,
                        detail: format!(
                            "tile {} holds {:?} but the directory is {:?} (owner {:?})",
                            tile,
                            state,
                            entry.state(),
                            entry.owner()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Collects the counters of every tile.
    pub fn stats(&self) -> SimStats {
        let tiles = self
            .tiles
            .iter()
            .map(|tile| {
                let (l1_i, l1_d, l2) = tile.cache_counters();
                TileStats {
                    tile: tile.id(),
                    l1_i,
                    l1_d,
                    l2,
                    directory: tile.directory().map(|d| d.counters()),
                    dram: tile.dram().map(|d| d.counters()),
                }
            })
            .collect();
        SimStats {
            host_seconds: self.started.elapsed().as_secs_f64(),
            messages_sent: self.interconnect.messages_sent(),
            tiles,
        }
    }

    /// Stops the delivery threads and waits for them to exit.
    pub fn shutdown(&mut self) {
        self.interconnect.shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delivery_loop(
    tile: Arc<Tile>,
    rx: Receiver<Delivery>,
    interconnect: Arc<Interconnect>,
    fatal: Arc<Mutex<Option<ProtocolError>>>,
) {
    while let Ok(delivery) = rx.recv() {
        let (sender, msg, time) = match delivery {
            Delivery::Message { sender, msg, time } => (sender, msg, time),
            Delivery::Shutdown => break,
        };
        let result = tile.handle_msg(sender, msg, time);
        interconnect.mark_handled();
        if let Err(err) = result {
            error!("tile {}: fatal protocol error: {}", tile.id(), err);
            fatal.lock().get_or_insert(err);
            interconnect.shutdown();
            break;
        }
    }
    debug!("tile {}: delivery thread exiting", tile.id());
    tile.abort_pending();
}
