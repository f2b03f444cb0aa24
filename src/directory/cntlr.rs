//! Home Directory Controller.
//!
//! The controller owns the directory cache, the per-address request queue and
//! the connection to the backing store for every line homed on its tile.
//! Requests from L2 caches are serialized per address: only the head of an
//! address's queue is acted on, and [`DramDirectoryCntlr::advance`] dispatches
//! the next request once the head completes.
//!
//! Transitions, by entry state and head request:
//!
//! | State    | `ExReq`                          | `ShReq`                             |
//! |----------|----------------------------------|-------------------------------------|
//! | Uncached | grant, owner = requester         | grant, add sharer                   |
//! | Shared   | invalidate every sharer, wait    | add sharer and grant, or invalidate |
//! |          |                                  | one sharer and wait                 |
//! | Modified | `FlushReq` to owner, wait        | `WbReq` to owner, wait              |
//!
//! Acknowledgements update the entry and restart the head request. When a
//! new address finds its set full, the idle entry with the fewest sharers is
//! nullified: a `NullifyReq` is queued on the victim address and driven like
//! any other request, and the request that needed the slot waits until the
//! nullification has completed.

use super::cache::DirectoryCache;
use super::entry::{DirectoryEntry, DirectoryState};
use super::sharers::SharersList;
use crate::common::{Address, MemComponent, ProtocolError, TileId};
use crate::config::DirectoryConfig;
use crate::protocol::{MsgKind, RequestQueue, ShmemMsg, ShmemReq};
use crate::soc::traits::{BackingStore, Network};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Activity counters of a directory slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryCounters {
    pub ex_requests: u64,
    pub sh_requests: u64,
    pub nullify_requests: u64,
    pub invalidations_sent: u64,
    pub broadcasts_sent: u64,
    pub flushes_sent: u64,
    pub writebacks_sent: u64,
    pub entry_evictions: u64,
}

/// Directory slice of one home tile.
pub struct DramDirectoryCntlr {
    tile_id: TileId,
    directory: DirectoryCache,
    queue: RequestQueue,
    dram: Arc<dyn BackingStore>,
    network: Arc<dyn Network>,
    /// Victim address to the address whose head request waits for its slot.
    awaiting_slot: HashMap<Address, Address>,
    rng: StdRng,
    counters: DirectoryCounters,
}

impl DramDirectoryCntlr {
    /// Creates the directory slice of `tile_id`.
    ///
    /// # Arguments
    ///
    /// * `config` - Directory cache shape and sharer policy.
    /// * `line_bytes` - Line size of the hierarchy.
    /// * `seed` - Seed of the generator used to pick sharers to invalidate.
    /// * `dram` - Backing store for lines homed here.
    /// * `network` - Transport to the L2 caches.
    pub fn new(
        tile_id: TileId,
        config: &DirectoryConfig,
        line_bytes: usize,
        seed: u64,
        dram: Arc<dyn BackingStore>,
        network: Arc<dyn Network>,
    ) -> Self {
        let directory = DirectoryCache::new(
            config.total_entries,
            config.associativity,
            line_bytes,
            config.sharer_policy,
            config.max_hw_sharers,
            network.total_tiles(),
        );
        Self {
            tile_id,
            directory,
            queue: RequestQueue::new(),
            dram,
            network,
            awaiting_slot: HashMap::new(),
            rng: StdRng::seed_from_u64(seed ^ tile_id as u64),
            counters: DirectoryCounters::default(),
        }
    }

    pub fn tile_id(&self) -> TileId {
        self.tile_id
    }

    pub fn counters(&self) -> DirectoryCounters {
        self.counters
    }

    /// Returns the entry tracking `address`, if any.
    pub fn entry(&self, address: Address) -> Option<&DirectoryEntry> {
        self.directory.entry(address)
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.directory
    }

    /// Number of requests queued for `address`, the active one included.
    pub fn queued_requests(&self, address: Address) -> usize {
        self.queue.size(address)
    }

    /// Returns `true` when no transaction is in progress.
    pub fn is_idle(&self) -> bool {
        self.queue.busy_addresses() == 0 && self.awaiting_slot.is_empty()
    }

    /// Checks the invariants of every entry.
    pub fn check_invariants(&self) -> Result<(), ProtocolError> {
        self.directory
            .entries()
            .try_for_each(|entry| entry.check_invariants())
    }

    /// Entry point for every message addressed to this directory.
    ///
    /// # Arguments
    ///
    /// * `sender` - Tile the message came from.
    /// * `msg` - The message.
    /// * `time` - Arrival timestamp, recorded on queued requests.
    pub fn handle_msg_from_l2(&mut self, sender: TileId, msg: ShmemMsg, time: u64) -> Result<(), ProtocolError> {
        trace!(
            "dir {}: {:?} for {:#x} from tile {} (requester {})",
            self.tile_id,
            msg.kind,
            msg.address,
            sender,
            msg.requester
        );
        match msg.kind {
            MsgKind::ExReq | MsgKind::ShReq => {
                if msg.kind == MsgKind::ExReq {
                    self.counters.ex_requests += 1;
                } else {
                    self.counters.sh_requests += 1;
                }
                let address = msg.address;
                self.handle_request(address, ShmemReq::new(msg, time))
            }
            MsgKind::InvRep => self.process_inv_rep(sender, &msg),
            MsgKind::FlushRep => self.process_flush_rep(sender, msg),
            MsgKind::WbRep => self.process_wb_rep(sender, msg),
            kind => Err(ProtocolError::UnexpectedMessage {
                kind,
                address: msg.address,
                component: MemComponent::DramDirectory,
            }),
        }
    }

    /// Queues `req`, processing it at once if `address` was idle.
    pub fn handle_request(&mut self, address: Address, req: ShmemReq) -> Result<(), ProtocolError> {
        let idle = self.queue.is_empty(address);
        self.queue.enqueue(address, req);
        if idle {
            self.process_head(address, None)
        } else {
            trace!(
                "dir {}: {:#x} busy, {} queued",
                self.tile_id,
                address,
                self.queue.size(address)
            );
            Ok(())
        }
    }

    /// Retires the head request of `address` and dispatches the next one.
    pub fn advance(&mut self, address: Address) -> Result<(), ProtocolError> {
        self.queue.dequeue(address);
        self.process_head(address, None)
    }

    fn process_head(&mut self, address: Address, cached: Option<Vec<u8>>) -> Result<(), ProtocolError> {
        let req = match self.queue.front(address) {
            Some(req) => req.clone(),
            None => return Ok(()),
        };
        match req.kind() {
            MsgKind::ExReq => self.process_ex_req(&req, cached),
            MsgKind::ShReq => self.process_sh_req(&req, cached),
            MsgKind::NullifyReq => self.process_nullify_req(&req),
            kind => Err(ProtocolError::UnexpectedMessage {
                kind,
                address,
                component: MemComponent::DramDirectory,
            }),
        }
    }

    fn process_ex_req(&mut self, req: &ShmemReq, cached: Option<Vec<u8>>) -> Result<(), ProtocolError> {
        let address = req.msg.address;
        let requester = req.requester();
        if !self.ensure_entry(req)? {
            return Ok(());
        }

        let entry = self.entry_mut(MsgKind::ExReq, address)?;
        match entry.state() {
            DirectoryState::Modified => {
                let owner = Self::owner_of(entry, MsgKind::ExReq)?;
                self.counters.flushes_sent += 1;
                self.send(owner, MsgKind::FlushReq, requester, address);
                Ok(())
            }
            DirectoryState::Shared => {
                let sharers = entry.sharers_list();
                self.invalidate_sharers(address, requester, sharers)
            }
            DirectoryState::Uncached => {
                if !entry.add_sharer(requester) {
                    return Err(ProtocolError::SharerInvariant {
                        address,
                        detail: format!("cannot add sharer {} to an uncached entry", requester),
                    });
                }
                entry.set_owner(requester)?;
                entry.set_state(DirectoryState::Modified);
                entry.check_invariants()?;

                let data = cached.unwrap_or_else(|| self.dram.get_data(address, requester));
                debug!(
                    "dir {}: {:#x} Uncached -> Modified, owner {}",
                    self.tile_id, address, requester
                );
                self.send_with_data(requester, MsgKind::ExRep, requester, address, data);
                self.advance(address)
            }
        }
    }

    fn process_sh_req(&mut self, req: &ShmemReq, cached: Option<Vec<u8>>) -> Result<(), ProtocolError> {
        let address = req.msg.address;
        let requester = req.requester();
        if !self.ensure_entry(req)? {
            return Ok(());
        }

        let entry = self
            .directory
            .get_entry(address)
            .ok_or(ProtocolError::MissingEntry {
                kind: MsgKind::ShReq,
                address,
            })?;
        match entry.state() {
            DirectoryState::Modified => {
                let owner = Self::owner_of(entry, MsgKind::ShReq)?;
                self.counters.writebacks_sent += 1;
                self.send(owner, MsgKind::WbReq, requester, address);
                Ok(())
            }
            DirectoryState::Shared | DirectoryState::Uncached => {
                if !entry.add_sharer(requester) {
                    let victim = entry.one_sharer(&mut self.rng).ok_or_else(|| {
                        ProtocolError::SharerInvariant {
                            address,
                            detail: "full sharer set has no tracked sharer".to_string(),
                        }
                    })?;
                    debug!(
                        "dir {}: sharers of {:#x} full, invalidating tile {}",
                        self.tile_id, address, victim
                    );
                    self.counters.invalidations_sent += 1;
                    self.send(victim, MsgKind::InvReq, requester, address);
                    return Ok(());
                }
                entry.set_state(DirectoryState::Shared);
                entry.check_invariants()?;

                let data = cached.unwrap_or_else(|| self.dram.get_data(address, requester));
                self.send_with_data(requester, MsgKind::ShRep, requester, address, data);
                self.advance(address)
            }
        }
    }

    fn process_nullify_req(&mut self, req: &ShmemReq) -> Result<(), ProtocolError> {
        let address = req.msg.address;
        let requester = req.requester();
        let entry = self.entry_mut(MsgKind::NullifyReq, address)?;
        match entry.state() {
            DirectoryState::Modified => {
                let owner = Self::owner_of(entry, MsgKind::NullifyReq)?;
                self.counters.flushes_sent += 1;
                self.send(owner, MsgKind::FlushReq, requester, address);
                Ok(())
            }
            DirectoryState::Shared => {
                let sharers = entry.sharers_list();
                self.invalidate_sharers(address, requester, sharers)
            }
            DirectoryState::Uncached => self.complete_nullify(address),
        }
    }

    /// Makes sure the head request `req` has a directory entry.
    ///
    /// Returns `false` if the request has to wait for a victim entry to be
    /// nullified; it is dispatched again when the nullification completes.
    fn ensure_entry(&mut self, req: &ShmemReq) -> Result<bool, ProtocolError> {
        let address = req.msg.address;
        if self.directory.get_entry(address).is_some() || self.directory.allocate(address).is_some() {
            return Ok(true);
        }

        let victim = self.select_victim(address)?;
        self.directory.replace(victim, address)?;
        self.counters.entry_evictions += 1;
        self.counters.nullify_requests += 1;
        debug!(
            "dir {}: evicting entry {:#x} for {:#x}",
            self.tile_id, victim, address
        );

        let nullify = ShmemMsg::new(
            MsgKind::NullifyReq,
            MemComponent::DramDirectory,
            MemComponent::DramDirectory,
            req.requester(),
            victim,
        );
        self.queue.enqueue(victim, ShmemReq::new(nullify, req.arrival_time));
        self.process_head(victim, None)?;

        if self.directory.is_replaced(victim) {
            self.awaiting_slot.insert(victim, address);
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Picks the idle entry with the fewest sharers in the set of `address`.
    fn select_victim(&self, address: Address) -> Result<Address, ProtocolError> {
        self.directory
            .replacement_candidates(address)
            .into_iter()
            .filter(|entry| self.queue.is_empty(entry.address()))
            .min_by_key(|entry| entry.sharer_count())
            .map(|entry| entry.address())
            .ok_or(ProtocolError::NoReplacementCandidate {
                address,
                set: self.directory.set_index(address),
            })
    }

    fn complete_nullify(&mut self, victim: Address) -> Result<(), ProtocolError> {
        self.directory.finish_nullify(victim);
        self.queue.dequeue(victim);
        trace!("dir {}: entry {:#x} nullified", self.tile_id, victim);
        if let Some(waiting) = self.awaiting_slot.remove(&victim) {
            self.process_head(waiting, None)?;
        }
        self.process_head(victim, None)
    }

    fn invalidate_sharers(
        &mut self,
        address: Address,
        requester: TileId,
        sharers: SharersList,
    ) -> Result<(), ProtocolError> {
        match sharers {
            SharersList::All => {
                self.counters.broadcasts_sent += 1;
                let msg = self
                    .message(MsgKind::InvReq, requester, address)
                    .with_reply_expected(true);
                self.network.broadcast(self.tile_id, msg);
                Ok(())
            }
            SharersList::Tracked(list) if list.is_empty() => Err(ProtocolError::SharerInvariant {
                address,
                detail: "shared entry without sharers".to_string(),
            }),
            SharersList::Tracked(list) => {
                for sharer in list {
                    self.counters.invalidations_sent += 1;
                    self.send(sharer, MsgKind::InvReq, requester, address);
                }
                Ok(())
            }
        }
    }

    fn process_inv_rep(&mut self, sender: TileId, msg: &ShmemMsg) -> Result<(), ProtocolError> {
        let address = msg.address;
        let entry = self.entry_mut(MsgKind::InvRep, address)?;
        Self::expect_state(entry, MsgKind::InvRep, DirectoryState::Shared)?;

        entry.remove_sharer(sender, msg.reply_expected)?;
        if entry.sharer_count() == 0 {
            entry.set_state(DirectoryState::Uncached);
        }
        let state = entry.state();

        let head = self.queue.front(address).map(|req| req.kind());
        match head {
            Some(MsgKind::ShReq) => self.process_head(address, None),
            Some(MsgKind::ExReq) | Some(MsgKind::NullifyReq) if state == DirectoryState::Uncached => {
                self.process_head(address, None)
            }
            _ => Ok(()),
        }
    }

    fn process_flush_rep(&mut self, sender: TileId, msg: ShmemMsg) -> Result<(), ProtocolError> {
        let address = msg.address;
        let entry = self.entry_mut(MsgKind::FlushRep, address)?;
        Self::expect_state(entry, MsgKind::FlushRep, DirectoryState::Modified)?;
        Self::expect_owner(entry, MsgKind::FlushRep, sender)?;

        entry.remove_sharer(sender, false)?;
        entry.clear_owner();
        entry.set_state(DirectoryState::Uncached);

        let data = msg.data.ok_or(ProtocolError::MissingData {
            kind: MsgKind::FlushRep,
            address,
        })?;
        self.dram.put_data(address, sender, &data);

        match self.queue.front(address).map(|req| req.kind()) {
            Some(MsgKind::NullifyReq) => self.process_head(address, None),
            Some(_) => self.process_head(address, Some(data)),
            None => Ok(()),
        }
    }

    fn process_wb_rep(&mut self, sender: TileId, msg: ShmemMsg) -> Result<(), ProtocolError> {
        let address = msg.address;
        let entry = self.entry_mut(MsgKind::WbRep, address)?;
        Self::expect_state(entry, MsgKind::WbRep, DirectoryState::Modified)?;
        Self::expect_owner(entry, MsgKind::WbRep, sender)?;

        entry.clear_owner();
        entry.set_state(DirectoryState::Shared);

        let data = msg.data.ok_or(ProtocolError::MissingData {
            kind: MsgKind::WbRep,
            address,
        })?;
        self.dram.put_data(address, sender, &data);

        match self.queue.front(address).map(|req| req.kind()) {
            Some(MsgKind::ShReq) => self.process_head(address, Some(data)),
            _ => Err(ProtocolError::UnexpectedMessage {
                kind: MsgKind::WbRep,
                address,
                component: MemComponent::DramDirectory,
            }),
        }
    }

    fn entry_mut(&mut self, kind: MsgKind, address: Address) -> Result<&mut DirectoryEntry, ProtocolError> {
        self.directory
            .get_entry(address)
            .ok_or(ProtocolError::MissingEntry { kind, address })
    }

    fn owner_of(entry: &DirectoryEntry, kind: MsgKind) -> Result<TileId, ProtocolError> {
        entry.owner().ok_or_else(|| ProtocolError::SharerInvariant {
            address: entry.address(),
            detail: format!("modified entry without owner on {:?}", kind),
        })
    }

    fn expect_state(entry: &DirectoryEntry, kind: MsgKind, expected: DirectoryState) -> Result<(), ProtocolError> {
        if entry.state() == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedDirectoryState {
                kind,
                address: entry.address(),
                expected,
                actual: entry.state(),
            })
        }
    }

    fn expect_owner(entry: &DirectoryEntry, kind: MsgKind, sender: TileId) -> Result<(), ProtocolError> {
        if entry.owner() == Some(sender) {
            Ok(())
        } else {
            Err(ProtocolError::NotOwner {
                kind,
                address: entry.address(),
                sender,
                owner: entry.owner(),
            })
        }
    }

    fn message(&self, kind: MsgKind, requester: TileId, address: Address) -> ShmemMsg {
        ShmemMsg::new(
            kind,
            MemComponent::DramDirectory,
            MemComponent::L2Cache,
            requester,
            address,
        )
    }

    fn send(&self, receiver: TileId, kind: MsgKind, requester: TileId, address: Address) {
        let msg = self.message(kind, requester, address);
        self.network.send(self.tile_id, receiver, msg);
    }

    fn send_with_data(&self, receiver: TileId, kind: MsgKind, requester: TileId, address: Address, data: Vec<u8>) {
        let msg = self.message(kind, requester, address).with_data(data);
        self.network.send(self.tile_id, receiver, msg);
    }
}
