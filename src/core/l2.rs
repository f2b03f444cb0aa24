//! Private L2 Cache Controller.
//!
//! The L2 is the tile's protocol endpoint. It serves L1 misses when its own
//! line has sufficient permission, otherwise it sends `ExReq`/`ShReq` to the
//! home directory and hands the issuing context a completion receiver to
//! wait on. On the delivery side it installs grants, notifies the directory
//! of lines displaced by those grants, and executes invalidation, flush and
//! writeback commands.
//!
//! L1 copies are tracked by the location bitmap of each L2 line. Every method
//! that touches an L1 takes the L1 guards as a parameter; they must have been
//! acquired before the L2 lock, which is taken inside.

use super::l1::L1Guards;
use super::units::cache::line::{CacheState, CachedLocations};
use super::units::cache::{Cache, EvictedLine};
use crate::common::{AccessType, Address, MemComponent, ProtocolError, TileId};
use crate::config::Config;
use crate::protocol::{MsgKind, ShmemMsg};
use crate::soc::home::AddressHomeLookup;
use crate::soc::traits::Network;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Signal from the delivery context that a miss has been filled.
///
/// The delivery context stays parked until the issuing context calls
/// [`Completion::resume`], so the granted line cannot be taken away before
/// the access that caused the miss has completed.
pub struct Completion {
    resume: Sender<()>,
}

impl Completion {
    pub fn new(resume: Sender<()>) -> Self {
        Self { resume }
    }

    /// Releases the delivery context.
    pub fn resume(self) {
        let _ = self.resume.send(());
    }
}

/// Outcome of [`L2CacheCntlr::process_request_from_l1`].
pub enum L2Response {
    /// Served from L2; the line is now in the requesting L1.
    Hit,
    /// Sent to the directory; the receiver yields once the line is installed.
    Miss(Receiver<Completion>),
    /// The tile has shut down.
    Closed,
}

struct PendingMiss {
    component: MemComponent,
    access: AccessType,
    completion: Sender<Completion>,
}

/// State guarded by the L2 lock.
pub struct L2State {
    pub cache: Cache,
    pending: HashMap<Address, PendingMiss>,
    closed: bool,
}

/// L2 cache controller of one tile.
pub struct L2CacheCntlr {
    tile_id: TileId,
    state: Mutex<L2State>,
    home_lookup: Arc<AddressHomeLookup>,
    network: Arc<dyn Network>,
}

impl L2CacheCntlr {
    pub fn new(
        tile_id: TileId,
        config: &Config,
        home_lookup: Arc<AddressHomeLookup>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            tile_id,
            state: Mutex::new(L2State {
                cache: Cache::new("L2", &config.cache.l2, config.general.line_bytes),
                pending: HashMap::new(),
                closed: false,
            }),
            home_lookup,
            network,
        }
    }

    /// Takes the L2 lock. Callers must not hold it while acquiring an L1 lock.
    pub fn lock(&self) -> MutexGuard<'_, L2State> {
        self.state.lock()
    }

    /// Serves an L1 miss for `component`.
    ///
    /// The requesting L1's copy (if any) is dropped first. When the L2 line
    /// already grants the permission `access` needs, the line is installed
    /// into the L1 and [`L2Response::Hit`] is returned. Otherwise a request
    /// goes to the home directory; for an upgrade from `Shared` the L2 copy
    /// is invalidated and an `InvRep` sent ahead of the `ExReq`.
    pub fn process_request_from_l1(
        &self,
        l1: &mut L1Guards<'_>,
        component: MemComponent,
        access: AccessType,
        address: Address,
    ) -> Result<L2Response, ProtocolError> {
        let mut l2 = self.state.lock();
        if l2.closed {
            return Ok(L2Response::Closed);
        }
        let state = &mut *l2;

        Self::drop_l1_copy(l1, &mut state.cache, component, address)?;

        let line_state = state.cache.state_of(address);
        let permitted = if access.needs_exclusive() {
            line_state.writable()
        } else {
            line_state.readable()
        };

        if permitted {
            state.cache.counters.hits += 1;
            if let Some(handle) = state.cache.find(address) {
                state.cache.touch(handle);
            }
            Self::insert_in_l1(l1, &mut state.cache, component, access, address)?;
            return Ok(L2Response::Hit);
        }
        state.cache.counters.misses += 1;

        if access.needs_exclusive() && line_state == CacheState::Shared {
            debug!("tile {}: upgrading {:#x}", self.tile_id, address);
            Self::invalidate_line(l1, &mut state.cache, address)?;
            self.send_to_home(MsgKind::InvRep, address, None, false);
        }

        let (tx, rx) = bounded(1);
        state.pending.insert(
            address,
            PendingMiss {
                component,
                access,
                completion: tx,
            },
        );
        let kind = if access.needs_exclusive() {
            MsgKind::ExReq
        } else {
            MsgKind::ShReq
        };
        self.send_to_home(kind, address, None, false);
        Ok(L2Response::Miss(rx))
    }

    /// Copies a store that hit in L1-D into the L2 line.
    pub fn write_through(&self, address: Address, offset: usize, bytes: &[u8]) -> Result<(), ProtocolError> {
        let mut l2 = self.state.lock();
        let handle = l2.cache.find(address).ok_or(ProtocolError::InclusionViolated {
            address,
            component: MemComponent::L1DCache,
        })?;
        let line = l2.cache.line_mut(handle);
        if line.state != CacheState::Modified {
            return Err(ProtocolError::UnexpectedLineState {
                kind: MsgKind::ExRep,
                address,
                expected: CacheState::Modified,
                actual: line.state,
            });
        }
        line.dirty = true;
        l2.cache.write(handle, offset, bytes);
        Ok(())
    }

    /// Returns the L1 locations recorded for `address` (empty if absent).
    pub fn peek_locations(&self, address: Address) -> CachedLocations {
        self.state
            .lock()
            .cache
            .peek(address)
            .map(|line| line.locations)
            .unwrap_or_default()
    }

    /// Installs an `ExRep`/`ShRep` grant.
    ///
    /// A valid line displaced by the fill is dropped from the L1s and
    /// reported to its home before the requester is woken. Returns the
    /// completion channel of the outstanding miss.
    pub fn process_grant(
        &self,
        l1: &mut L1Guards<'_>,
        msg: ShmemMsg,
    ) -> Result<Sender<Completion>, ProtocolError> {
        let address = msg.address;
        let mut l2 = self.state.lock();
        let state = &mut *l2;

        let pending = state
            .pending
            .remove(&address)
            .ok_or(ProtocolError::NoPendingMiss {
                kind: msg.kind,
                address,
            })?;
        let data = msg.data.ok_or(ProtocolError::MissingData {
            kind: msg.kind,
            address,
        })?;
        let granted = if msg.kind == MsgKind::ExRep {
            CacheState::Modified
        } else {
            CacheState::Shared
        };

        let (_, evicted) = state.cache.insert(address, granted, &data);
        if let Some(evicted) = evicted {
            self.notify_eviction(l1, evicted)?;
        }
        Self::insert_in_l1(l1, &mut state.cache, pending.component, pending.access, address)?;

        trace!(
            "tile {}: {:?} installed {:#x} as {:?}",
            self.tile_id,
            msg.kind,
            address,
            granted
        );
        Ok(pending.completion)
    }

    /// Executes an `InvReq`, `FlushReq` or `WbReq` from the home directory.
    ///
    /// `l1` must hold the locks of every L1 recorded in the line's location
    /// bitmap. A command for a line that is already invalid is a race with a
    /// local eviction and is answered only when `reply_expected` is set.
    pub fn process_command(
        &self,
        l1: &mut L1Guards<'_>,
        l2: &mut L2State,
        sender: TileId,
        msg: &ShmemMsg,
    ) -> Result<(), ProtocolError> {
        let address = msg.address;
        let line_state = l2.cache.state_of(address);

        if line_state == CacheState::Invalid {
            debug!(
                "tile {}: {:?} for {:#x} crossed a local eviction",
                self.tile_id, msg.kind, address
            );
            if msg.reply_expected {
                self.send(sender, MsgKind::InvRep, msg.requester, address, None, true);
            }
            return Ok(());
        }

        let expected = match msg.kind {
            MsgKind::InvReq => CacheState::Shared,
            MsgKind::FlushReq | MsgKind::WbReq => CacheState::Modified,
            kind => {
                return Err(ProtocolError::UnexpectedMessage {
                    kind,
                    address,
                    component: MemComponent::L2Cache,
                })
            }
        };
        if line_state != expected {
            return Err(ProtocolError::UnexpectedLineState {
                kind: msg.kind,
                address,
                expected,
                actual: line_state,
            });
        }

        match msg.kind {
            MsgKind::InvReq => {
                Self::invalidate_line(l1, &mut l2.cache, address)?;
                self.send(sender, MsgKind::InvRep, msg.requester, address, None, msg.reply_expected);
            }
            MsgKind::FlushReq => {
                let data = Self::invalidate_line(l1, &mut l2.cache, address)?;
                self.send(sender, MsgKind::FlushRep, msg.requester, address, data, false);
            }
            _ => {
                let data = Self::downgrade_line(l1, &mut l2.cache, address)?;
                self.send(sender, MsgKind::WbRep, msg.requester, address, Some(data), false);
            }
        }
        Ok(())
    }

    /// Drops every pending miss and refuses new ones.
    ///
    /// Issuing contexts waiting on a completion observe a disconnected
    /// channel.
    pub fn close(&self) {
        let mut l2 = self.state.lock();
        l2.closed = true;
        l2.pending.clear();
    }

    /// Number of misses waiting for a grant.
    pub fn outstanding_misses(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn drop_l1_copy(
        l1: &mut L1Guards<'_>,
        cache: &mut Cache,
        component: MemComponent,
        address: Address,
    ) -> Result<(), ProtocolError> {
        let l1_cache = l1.get(component).ok_or(ProtocolError::InclusionViolated {
            address,
            component,
        })?;
        if l1_cache.invalidate(address) {
            if let Some(handle) = cache.find(address) {
                cache.line_mut(handle).locations.release(component);
            }
        }
        Ok(())
    }

    /// Installs the L2 line of `address` into `component`.
    ///
    /// At most one L1 may hold a writable copy: an exclusive fill drops the
    /// other L1's copy, a shared fill downgrades it.
    fn insert_in_l1(
        l1: &mut L1Guards<'_>,
        cache: &mut Cache,
        component: MemComponent,
        access: AccessType,
        address: Address,
    ) -> Result<(), ProtocolError> {
        let handle = cache.find(address).ok_or(ProtocolError::InclusionViolated {
            address,
            component,
        })?;
        let other = match component {
            MemComponent::L1ICache => MemComponent::L1DCache,
            _ => MemComponent::L1ICache,
        };

        let mut fill_state = cache.line(handle).state;
        if cache.line(handle).locations.contains(other) {
            let other_cache = l1.get(other).ok_or(ProtocolError::InclusionViolated {
                address,
                component: other,
            })?;
            if access.needs_exclusive() {
                other_cache.invalidate(address);
                cache.line_mut(handle).locations.release(other);
            } else {
                if let Some(h) = other_cache.find(address) {
                    other_cache.line_mut(h).state = CacheState::Shared;
                }
                fill_state = CacheState::Shared;
            }
        }

        let data = cache.line_data(handle).to_vec();
        let l1_cache = l1.get(component).ok_or(ProtocolError::InclusionViolated {
            address,
            component,
        })?;
        let (_, evicted) = l1_cache.insert(address, fill_state, &data);
        cache.line_mut(handle).locations.claim(address, component)?;

        if let Some(evicted) = evicted {
            let h = cache
                .find(evicted.address)
                .ok_or(ProtocolError::InclusionViolated {
                    address: evicted.address,
                    component,
                })?;
            cache.line_mut(h).locations.release(component);
        }
        Ok(())
    }

    /// Invalidates the L1 copies and the L2 line of `address`.
    ///
    /// Returns the line data when the line was valid.
    fn invalidate_line(
        l1: &mut L1Guards<'_>,
        cache: &mut Cache,
        address: Address,
    ) -> Result<Option<Vec<u8>>, ProtocolError> {
        let handle = match cache.find(address) {
            Some(handle) => handle,
            None => return Ok(None),
        };
        for component in cache.line(handle).locations.iter() {
            let l1_cache = l1.get(component).ok_or(ProtocolError::InclusionViolated {
                address,
                component,
            })?;
            l1_cache.invalidate(address);
        }
        let data = cache.line_data(handle).to_vec();
        cache.invalidate(address);
        Ok(Some(data))
    }

    /// Downgrades the L1 copies and the L2 line of `address` to `Shared`.
    fn downgrade_line(
        l1: &mut L1Guards<'_>,
        cache: &mut Cache,
        address: Address,
    ) -> Result<Vec<u8>, ProtocolError> {
        let handle = cache.find(address).ok_or(ProtocolError::UnexpectedLineState {
            kind: MsgKind::WbReq,
            address,
            expected: CacheState::Modified,
            actual: CacheState::Invalid,
        })?;
        for component in cache.line(handle).locations.iter() {
            let l1_cache = l1.get(component).ok_or(ProtocolError::InclusionViolated {
                address,
                component,
            })?;
            if let Some(h) = l1_cache.find(address) {
                l1_cache.line_mut(h).state = CacheState::Shared;
            }
        }
        let line = cache.line_mut(handle);
        line.state = CacheState::Shared;
        line.dirty = false;
        Ok(cache.line_data(handle).to_vec())
    }

    /// Drops the L1 copies of a line displaced from L2 and tells its home.
    fn notify_eviction(&self, l1: &mut L1Guards<'_>, evicted: EvictedLine) -> Result<(), ProtocolError> {
        for component in evicted.locations.iter() {
            let l1_cache = l1.get(component).ok_or(ProtocolError::InclusionViolated {
                address: evicted.address,
                component,
            })?;
            l1_cache.invalidate(evicted.address);
        }
        debug!(
            "tile {}: evicting {:#x} ({:?})",
            self.tile_id, evicted.address, evicted.state
        );
        match evicted.state {
            CacheState::Modified => {
                self.send_to_home(MsgKind::FlushRep, evicted.address, Some(evicted.data), false)
            }
            CacheState::Shared => self.send_to_home(MsgKind::InvRep, evicted.address, None, false),
            CacheState::Invalid => {}
        }
        Ok(())
    }

    fn send_to_home(&self, kind: MsgKind, address: Address, data: Option<Vec<u8>>, reply_expected: bool) {
        let home = self.home_lookup.home_of(address);
        self.send(home, kind, self.tile_id, address, data, reply_expected);
    }

    fn send(
        &self,
        receiver: TileId,
        kind: MsgKind,
        requester: TileId,
        address: Address,
        data: Option<Vec<u8>>,
        reply_expected: bool,
    ) {
        let mut msg = ShmemMsg::new(
            kind,
            MemComponent::L2Cache,
            MemComponent::DramDirectory,
            requester,
            address,
        )
        .with_reply_expected(reply_expected);
        msg.data = data;
        self.network.send(self.tile_id, receiver, msg);
    }
}
