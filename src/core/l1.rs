//! Private L1 Cache Controller.
//!
//! The L1-I and L1-D caches each sit behind their own lock. L1-D is
//! write-through: a store that hits also updates the L2 line. An access
//! that lacks permission drops the local copy and defers to the L2, waiting
//! on a completion channel if the L2 has to go to the directory.
//!
//! # Lock order
//!
//! The three cache locks of a tile form a total order: L1-I, then L1-D, then
//! L2. Both contexts follow it. The issuing context keeps its L1 guard while
//! a store hit writes through to L2, and keeps every L1 guard while L2
//! serves a miss. The delivery context locks the L1s a grant or command
//! needs before the L2. The L2 lock is never held while an L1 lock is
//! acquired, so no cycle can form. No guard is held while waiting for the
//! directory.

use super::l2::{L2CacheCntlr, L2Response};
use super::units::cache::line::CachedLocations;
use super::units::cache::Cache;
use crate::common::{AccessType, Address, MemComponent, ProtocolError, SimError, TileId};
use crate::config::Config;
use log::trace;
use parking_lot::{Mutex, MutexGuard};

/// Locks held on the L1 caches of a tile.
///
/// Always acquired through [`L1CacheCntlr::lock_all`] or
/// [`L1CacheCntlr::lock_for`], which respect the lock order.
pub struct L1Guards<'a> {
    icache: Option<MutexGuard<'a, Cache>>,
    dcache: Option<MutexGuard<'a, Cache>>,
}

impl<'a> L1Guards<'a> {
    /// Returns the locked cache of `component`, if its lock is held.
    pub fn get(&mut self, component: MemComponent) -> Option<&mut Cache> {
        match component {
            MemComponent::L1ICache => self.icache.as_deref_mut(),
            MemComponent::L1DCache => self.dcache.as_deref_mut(),
            _ => None,
        }
    }

    /// Returns `true` if the guards cover every location in `locations`.
    pub fn covers(&self, locations: CachedLocations) -> bool {
        locations.iter().all(|component| match component {
            MemComponent::L1ICache => self.icache.is_some(),
            MemComponent::L1DCache => self.dcache.is_some(),
            _ => false,
        })
    }
}

/// L1 instruction and data caches of one tile.
pub struct L1CacheCntlr {
    tile_id: TileId,
    icache: Mutex<Cache>,
    dcache: Mutex<Cache>,
}

impl L1CacheCntlr {
    pub fn new(tile_id: TileId, config: &Config) -> Self {
        let line_bytes = config.general.line_bytes;
        Self {
            tile_id,
            icache: Mutex::new(Cache::new("L1-I", &config.cache.l1_i, line_bytes)),
            dcache: Mutex::new(Cache::new("L1-D", &config.cache.l1_d, line_bytes)),
        }
    }

    /// Returns the lock of the L1 cache named by `component`.
    ///
    /// Anything other than `L1ICache` maps to the data cache.
    pub fn cache(&self, component: MemComponent) -> &Mutex<Cache> {
        match component {
            MemComponent::L1ICache => &self.icache,
            _ => &self.dcache,
        }
    }

    /// Locks both L1 caches in order.
    pub fn lock_all(&self) -> L1Guards<'_> {
        let icache = self.icache.lock();
        let dcache = self.dcache.lock();
        L1Guards {
            icache: Some(icache),
            dcache: Some(dcache),
        }
    }

    /// Locks the L1 caches named in `locations`, in order.
    pub fn lock_for(&self, locations: CachedLocations) -> L1Guards<'_> {
        let icache = locations
            .contains(MemComponent::L1ICache)
            .then(|| self.icache.lock());
        let dcache = locations
            .contains(MemComponent::L1DCache)
            .then(|| self.dcache.lock());
        L1Guards { icache, dcache }
    }

    /// Performs an access from the core.
    ///
    /// # Arguments
    ///
    /// * `l2` - The tile's L2 controller.
    /// * `component` - L1 cache the access targets.
    /// * `access` - Permission the access needs.
    /// * `address` - Line-aligned address.
    /// * `offset` - Byte offset within the line.
    /// * `buf` - Destination of loads, source of stores.
    ///
    /// # Returns
    ///
    /// `true` if the access hit in L1 on the first attempt.
    pub fn process_access(
        &self,
        l2: &L2CacheCntlr,
        component: MemComponent,
        access: AccessType,
        address: Address,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<bool, SimError> {
        {
            let mut cache = self.cache(component).lock();
            if Self::access_cache(&mut cache, l2, access, address, offset, buf)? {
                cache.counters.hits += 1;
                return Ok(true);
            }
            cache.counters.misses += 1;
            trace!(
                "tile {}: {} miss on {:#x} ({:?})",
                self.tile_id,
                cache.name(),
                address,
                access
            );
        }

        let mut guards = self.lock_all();
        match l2.process_request_from_l1(&mut guards, component, access, address)? {
            L2Response::Hit => {
                let cache = guards.get(component).ok_or(ProtocolError::AccessNotGranted {
                    address,
                    component,
                })?;
                Self::complete(cache, l2, component, access, address, offset, buf)
            }
            L2Response::Miss(completion) => {
                drop(guards);
                let completion = completion.recv().map_err(|_| SimError::Aborted)?;
                let result = {
                    let mut cache = self.cache(component).lock();
                    Self::complete(&mut cache, l2, component, access, address, offset, buf)
                };
                completion.resume();
                result
            }
            L2Response::Closed => Err(SimError::Aborted),
        }
    }

    fn complete(
        cache: &mut Cache,
        l2: &L2CacheCntlr,
        component: MemComponent,
        access: AccessType,
        address: Address,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<bool, SimError> {
        if Self::access_cache(cache, l2, access, address, offset, buf)? {
            Ok(false)
        } else {
            Err(ProtocolError::AccessNotGranted { address, component }.into())
        }
    }

    /// Checks whether the line of `address` grants `access`.
    pub fn operation_permissible(cache: &Cache, address: Address, access: AccessType) -> bool {
        let state = cache.state_of(address);
        if access.needs_exclusive() {
            state.writable()
        } else {
            state.readable()
        }
    }

    /// Performs the access if permitted. Returns `false` otherwise.
    fn access_cache(
        cache: &mut Cache,
        l2: &L2CacheCntlr,
        access: AccessType,
        address: Address,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<bool, ProtocolError> {
        if !Self::operation_permissible(cache, address, access) {
            return Ok(false);
        }
        let handle = match cache.find(address) {
            Some(handle) => handle,
            None => return Ok(false),
        };
        match access {
            AccessType::Read | AccessType::ReadEx => cache.read(handle, offset, buf),
            AccessType::Write => {
                cache.write(handle, offset, buf);
                l2.write_through(address, offset, buf)?;
            }
        }
        Ok(true)
    }
}
