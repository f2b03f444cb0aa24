//! Directory Entry.
//!
//! The home directory keeps one entry per tracked line: the aggregate state
//! across all tiles, the owner of a modified copy, and the sharer set.

use super::sharers::{SharerSet, SharersList};
use crate::common::{Address, ProtocolError, TileId};
use crate::config::SharerPolicy;
use rand::Rng;
use serde::Serialize;

/// Aggregate state of a line across all private caches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum DirectoryState {
    /// No tile holds a copy.
    #[default]
    Uncached,
    /// One or more tiles hold read-only copies.
    Shared,
    /// Exactly one tile holds a writable copy.
    Modified,
}

/// Directory bookkeeping for a single line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    address: Address,
    state: DirectoryState,
    owner: Option<TileId>,
    sharers: SharerSet,
}

impl DirectoryEntry {
    /// Creates an `Uncached` entry for `address`.
    pub fn new(address: Address, policy: SharerPolicy, max_hw_sharers: usize, total_tiles: usize) -> Self {
        Self {
            address,
            state: DirectoryState::Uncached,
            owner: None,
            sharers: SharerSet::new(policy, max_hw_sharers, total_tiles),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> DirectoryState {
        self.state
    }

    pub fn set_state(&mut self, state: DirectoryState) {
        self.state = state;
    }

    pub fn owner(&self) -> Option<TileId> {
        self.owner
    }

    /// Makes `id` the owner. It must already be a sharer.
    pub fn set_owner(&mut self, id: TileId) -> Result<(), ProtocolError> {
        if !self.sharers.has_sharer(id) {
            return Err(ProtocolError::SharerInvariant {
                address: self.address,
                detail: format!("owner {} is not a sharer", id),
            });
        }
        self.owner = Some(id);
        Ok(())
    }

    pub fn clear_owner(&mut self) {
        self.owner = None;
    }

    pub fn has_sharer(&self, id: TileId) -> bool {
        self.sharers.has_sharer(id)
    }

    /// See [`SharerSet::add_sharer`].
    pub fn add_sharer(&mut self, id: TileId) -> bool {
        self.sharers.add_sharer(id)
    }

    /// Removes `id`, failing if the set cannot account for it.
    pub fn remove_sharer(&mut self, id: TileId, reply_expected: bool) -> Result<(), ProtocolError> {
        if self.sharers.remove_sharer(id, reply_expected) {
            Ok(())
        } else {
            Err(ProtocolError::SharerInvariant {
                address: self.address,
                detail: format!("cannot remove sharer {} (reply_expected={})", id, reply_expected),
            })
        }
    }

    pub fn sharer_count(&self) -> usize {
        self.sharers.sharer_count()
    }

    pub fn one_sharer<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<TileId> {
        self.sharers.one_sharer(rng)
    }

    pub fn sharers_list(&self) -> SharersList {
        self.sharers.sharers_list()
    }

    pub fn sharers(&self) -> &SharerSet {
        &self.sharers
    }

    /// Checks the owner/state and sharer-bound invariants.
    pub fn check_invariants(&self) -> Result<(), ProtocolError> {
        let violation = |detail: String| ProtocolError::SharerInvariant {
            address: self.address,
            detail,
        };
        if self.owner.is_some() != (self.state == DirectoryState::Modified) {
            return Err(violation(format!(
                "owner {:?} in state {:?}",
                self.owner, self.state
            )));
        }
        if self.state == DirectoryState::Modified && self.sharer_count() != 1 {
            return Err(violation(format!(
                "modified with {} sharers",
                self.sharer_count()
            )));
        }
        if self.state == DirectoryState::Uncached && self.sharer_count() != 0 {
            return Err(violation(format!(
                "uncached with {} sharers",
                self.sharer_count()
            )));
        }
        if !self.sharers.within_bound() {
            return Err(violation("sharer set exceeds its capacity".to_string()));
        }
        Ok(())
    }
}
