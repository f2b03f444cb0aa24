//! Directory Cache.
//!
//! Directory entries live in an associative structure with the same address
//! geometry as the data caches. Slots form a flat arena indexed by
//! `set * ways + way`. When a set is full, the controller picks a victim and
//! calls [`DirectoryCache::replace`]: the new entry takes the slot at once
//! while the victim moves to the replaced list, where it stays reachable by
//! address until its forced invalidation completes.

use super::entry::DirectoryEntry;
use crate::common::Address;
use crate::config::SharerPolicy;
use crate::core::units::cache::CacheGeometry;
use crate::common::ProtocolError;

/// Associative store of directory entries.
pub struct DirectoryCache {
    geometry: CacheGeometry,
    slots: Vec<Option<DirectoryEntry>>,
    replaced: Vec<DirectoryEntry>,
    policy: SharerPolicy,
    max_hw_sharers: usize,
    total_tiles: usize,
}

impl DirectoryCache {
    /// Creates an empty directory cache.
    ///
    /// # Arguments
    ///
    /// * `total_entries` - Number of slots.
    /// * `associativity` - Slots per set.
    /// * `line_bytes` - Line size used to derive the set index.
    /// * `policy`, `max_hw_sharers`, `total_tiles` - Sharer tracking of new entries.
    pub fn new(
        total_entries: usize,
        associativity: usize,
        line_bytes: usize,
        policy: SharerPolicy,
        max_hw_sharers: usize,
        total_tiles: usize,
    ) -> Self {
        let geometry = CacheGeometry::from_sets(total_entries / associativity, associativity, line_bytes);
        Self {
            slots: vec![None; geometry.num_sets * geometry.ways],
            replaced: Vec::new(),
            geometry,
            policy,
            max_hw_sharers,
            total_tiles,
        }
    }

    pub fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }

    pub fn set_index(&self, addr: Address) -> usize {
        self.geometry.set_index(addr)
    }

    fn set_range(&self, addr: Address) -> std::ops::Range<usize> {
        let start = self.set_index(addr) * self.geometry.ways;
        start..start + self.geometry.ways
    }

    fn slot_of(&self, addr: Address) -> Option<usize> {
        self.set_range(addr).find(|i| {
            self.slots[*i]
                .as_ref()
                .map_or(false, |e| e.address() == addr)
        })
    }

    fn new_entry(&self, addr: Address) -> DirectoryEntry {
        DirectoryEntry::new(addr, self.policy, self.max_hw_sharers, self.total_tiles)
    }

    /// Returns the entry for `addr`, including one awaiting nullification.
    pub fn get_entry(&mut self, addr: Address) -> Option<&mut DirectoryEntry> {
        match self.slot_of(addr) {
            Some(i) => self.slots[i].as_mut(),
            None => self.replaced.iter_mut().find(|e| e.address() == addr),
        }
    }

    /// Read-only variant of [`DirectoryCache::get_entry`].
    pub fn entry(&self, addr: Address) -> Option<&DirectoryEntry> {
        match self.slot_of(addr) {
            Some(i) => self.slots[i].as_ref(),
            None => self.replaced.iter().find(|e| e.address() == addr),
        }
    }

    /// Installs a fresh entry for `addr` in a free slot of its set.
    ///
    /// Returns `None` when the set is full.
    pub fn allocate(&mut self, addr: Address) -> Option<&mut DirectoryEntry> {
        let free = self.set_range(addr).find(|i| self.slots[*i].is_none())?;
        let entry = self.new_entry(addr);
        self.slots[free] = Some(entry);
        self.slots[free].as_mut()
    }

    /// Returns every entry of the set `addr` maps to.
    pub fn replacement_candidates(&self, addr: Address) -> Vec<&DirectoryEntry> {
        self.set_range(addr)
            .filter_map(|i| self.slots[i].as_ref())
            .collect()
    }

    /// Moves the entry of `victim` to the replaced list and installs a fresh
    /// entry for `new_addr` in its slot.
    pub fn replace(&mut self, victim: Address, new_addr: Address) -> Result<&mut DirectoryEntry, ProtocolError> {
        let set = self.set_index(new_addr);
        let slot = self
            .slot_of(victim)
            .filter(|_| self.set_index(victim) == set)
            .ok_or(ProtocolError::NoReplacementCandidate {
                address: new_addr,
                set,
            })?;
        let entry = self.new_entry(new_addr);
        if let Some(old) = self.slots[slot].replace(entry) {
            self.replaced.push(old);
        }
        self.slots[slot]
            .as_mut()
            .ok_or(ProtocolError::NoReplacementCandidate {
                address: new_addr,
                set,
            })
    }

    /// Drops the replaced entry of `addr` once its nullification completed.
    ///
    /// Returns `false` if no such entry was pending.
    pub fn finish_nullify(&mut self, addr: Address) -> bool {
        match self.replaced.iter().position(|e| e.address() == addr) {
            Some(pos) => {
                self.replaced.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns `true` while the entry of `addr` awaits nullification.
    pub fn is_replaced(&self, addr: Address) -> bool {
        self.replaced.iter().any(|e| e.address() == addr)
    }

    /// Iterates over all live entries, replaced ones included.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> + '_ {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .chain(self.replaced.iter())
    }
}
