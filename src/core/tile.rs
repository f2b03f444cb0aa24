//! Tile Memory Manager.
//!
//! A tile bundles the private L1/L2 controllers of one core with the
//! directory slice and DRAM controller it hosts, if it is a home tile.
//! Two contexts drive it: the issuing context calls [`Tile::access`], and
//! the tile's delivery thread calls [`Tile::handle_msg`] for every message
//! the interconnect delivers.

use super::l1::L1CacheCntlr;
use super::l2::{Completion, L2CacheCntlr};
use super::units::cache::line::CacheState;
use super::units::cache::CacheCounters;
use crate::common::addr::{line_address, line_offset};
use crate::common::{AccessType, Address, MemComponent, ProtocolError, SimError, TileId};
use crate::config::Config;
use crate::directory::DramDirectoryCntlr;
use crate::protocol::{MsgKind, ShmemMsg};
use crate::soc::home::AddressHomeLookup;
use crate::soc::memory::DramCntlr;
use crate::soc::traits::Network;
use crossbeam_channel::bounded;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// One core's memory subsystem.
pub struct Tile {
    id: TileId,
    line_bytes: usize,
    l1: L1CacheCntlr,
    l2: L2CacheCntlr,
    directory: Option<Mutex<DramDirectoryCntlr>>,
    dram: Option<Arc<DramCntlr>>,
    issue_lock: Mutex<()>,
}

impl Tile {
    /// Builds tile `id`. A directory slice and DRAM controller are attached
    /// when `home_lookup` names the tile as a home.
    pub fn new(
        id: TileId,
        config: &Config,
        home_lookup: Arc<AddressHomeLookup>,
        network: Arc<dyn Network>,
    ) -> Self {
        let line_bytes = config.general.line_bytes;
        let (directory, dram) = if home_lookup.is_home(id) {
            let dram = Arc::new(DramCntlr::new(line_bytes));
            let directory = DramDirectoryCntlr::new(
                id,
                &config.directory,
                line_bytes,
                config.general.seed,
                dram.clone(),
                network.clone(),
            );
            (Some(Mutex::new(directory)), Some(dram))
        } else {
            (None, None)
        };

        Self {
            id,
            line_bytes,
            l1: L1CacheCntlr::new(id, config),
            l2: L2CacheCntlr::new(id, config, home_lookup, network),
            directory,
            dram,
            issue_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    /// Performs a memory access issued by this tile's core.
    ///
    /// The access must not cross a line boundary. Instruction fetches go to
    /// L1-I and may only read. Concurrent callers on the same tile are
    /// serialized.
    ///
    /// # Returns
    ///
    /// `true` if the access hit in L1.
    pub fn access(
        &self,
        component: MemComponent,
        access: AccessType,
        address: Address,
        buf: &mut [u8],
    ) -> Result<bool, SimError> {
        let offset = line_offset(address, self.line_bytes);
        if buf.is_empty() || offset + buf.len() > self.line_bytes {
            return Err(SimError::InvalidAccess(format!(
                "{} byte access at {:#x} crosses a {} byte line",
                buf.len(),
                address,
                self.line_bytes
            )));
        }
        if !component.is_l1() || (component == MemComponent::L1ICache && access != AccessType::Read) {
            return Err(SimError::InvalidAccess(format!(
                "{:?} through {} is not supported",
                access, component
            )));
        }

        let _issue = self.issue_lock.lock();
        self.l1.process_access(
            &self.l2,
            component,
            access,
            line_address(address, self.line_bytes),
            offset,
            buf,
        )
    }

    /// Handles one message delivered to this tile.
    ///
    /// Grants wake the waiting issuing context and block until it has
    /// finished its access.
    pub fn handle_msg(&self, sender: TileId, msg: ShmemMsg, time: u64) -> Result<(), ProtocolError> {
        match msg.receiver_component {
            MemComponent::DramDirectory if msg.sender_component == MemComponent::L2Cache => {
                let directory = self.directory.as_ref().ok_or(ProtocolError::NotAHome {
                    tile: self.id,
                    kind: msg.kind,
                    address: msg.address,
                })?;
                directory.lock().handle_msg_from_l2(sender, msg, time)
            }
            MemComponent::L2Cache if msg.kind.is_grant() => {
                let completion = {
                    let mut guards = self.l1.lock_all();
                    self.l2.process_grant(&mut guards, msg)?
                };
                let (resume_tx, resume_rx) = bounded(1);
                if completion.send(Completion::new(resume_tx)).is_ok() {
                    let _ = resume_rx.recv();
                }
                Ok(())
            }
            MemComponent::L2Cache => self.handle_command(sender, msg),
            component => Err(ProtocolError::UnexpectedMessage {
                kind: msg.kind,
                address: msg.address,
                component,
            }),
        }
    }

    /// Runs a directory command against the L1 copies and the L2 line.
    ///
    /// The L1 locks needed are learned from the line's location bitmap with
    /// the L2 lock released, then re-checked once every lock is held.
    fn handle_command(&self, sender: TileId, msg: ShmemMsg) -> Result<(), ProtocolError> {
        if !matches!(msg.kind, MsgKind::InvReq | MsgKind::FlushReq | MsgKind::WbReq) {
            return Err(ProtocolError::UnexpectedMessage {
                kind: msg.kind,
                address: msg.address,
                component: MemComponent::L2Cache,
            });
        }
        loop {
            let locations = self.l2.peek_locations(msg.address);
            let mut guards = self.l1.lock_for(locations);
            let mut l2 = self.l2.lock();
            let current = l2
                .cache
                .peek(msg.address)
                .map(|line| line.locations)
                .unwrap_or_default();
            if guards.covers(current) {
                return self.l2.process_command(&mut guards, &mut l2, sender, &msg);
            }
        }
    }

    /// Fails every outstanding miss and refuses new ones.
    pub fn abort_pending(&self) {
        self.l2.close();
    }

    /// Locks and returns the directory slice, if this is a home tile.
    pub fn directory(&self) -> Option<MutexGuard<'_, DramDirectoryCntlr>> {
        self.directory.as_ref().map(|d| d.lock())
    }

    pub fn dram(&self) -> Option<&Arc<DramCntlr>> {
        self.dram.as_ref()
    }

    /// Coherence state of `address` in the given cache of this tile.
    pub fn cache_state(&self, component: MemComponent, address: Address) -> CacheState {
        let address = line_address(address, self.line_bytes);
        match component {
            MemComponent::L2Cache => self.l2.lock().cache.state_of(address),
            MemComponent::L1ICache | MemComponent::L1DCache => {
                self.l1.cache(component).lock().state_of(address)
            }
            MemComponent::DramDirectory => CacheState::Invalid,
        }
    }

    /// Valid L2 lines of this tile with their states.
    pub fn l2_lines(&self) -> Vec<(Address, CacheState)> {
        self.l2
            .lock()
            .cache
            .valid_lines()
            .map(|(address, line)| (address, line.state))
            .collect()
    }

    /// Counters of the L1-I, L1-D and L2 caches.
    pub fn cache_counters(&self) -> (CacheCounters, CacheCounters, CacheCounters) {
        let icache = self.l1.cache(MemComponent::L1ICache).lock().counters;
        let dcache = self.l1.cache(MemComponent::L1DCache).lock().counters;
        let l2 = self.l2.lock().cache.counters;
        (icache, dcache, l2)
    }

    /// Number of misses waiting for a grant.
    pub fn outstanding_misses(&self) -> usize {
        self.l2.outstanding_misses()
    }
}
