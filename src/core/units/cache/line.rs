//! Cache Line State.
//!
//! Each line carries its tag, validity and dirtiness, its coherence state,
//! and (for L2 lines) the set of private L1 caches that hold a copy.

use crate::common::{Address, MemComponent, ProtocolError};
use serde::Serialize;

/// Coherence state of a cached line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CacheState {
    /// No copy; neither readable nor writable.
    #[default]
    Invalid,
    /// Read-only copy, possibly held by other tiles as well.
    Shared,
    /// The only copy in the system; readable, writable, possibly dirty.
    Modified,
}

impl CacheState {
    /// Returns `true` if a load may complete against this state.
    pub fn readable(self) -> bool {
        matches!(self, CacheState::Shared | CacheState::Modified)
    }

    /// Returns `true` if a store may complete against this state.
    pub fn writable(self) -> bool {
        matches!(self, CacheState::Modified)
    }
}

/// Which private L1 caches hold a copy of an L2 line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CachedLocations {
    bits: u8,
}

impl CachedLocations {
    const ALL: [MemComponent; 2] = [MemComponent::L1ICache, MemComponent::L1DCache];

    fn bit(component: MemComponent) -> u8 {
        match component {
            MemComponent::L1ICache => 0b01,
            MemComponent::L1DCache => 0b10,
            _ => 0,
        }
    }

    /// Records that `component` now holds a copy of the line at `address`.
    ///
    /// A location may only be claimed while clear.
    pub fn claim(&mut self, address: Address, component: MemComponent) -> Result<(), ProtocolError> {
        let bit = Self::bit(component);
        if bit == 0 || self.bits & bit != 0 {
            return Err(ProtocolError::DoubleClaim { address, component });
        }
        self.bits |= bit;
        Ok(())
    }

    /// Clears the location of `component`. Returns `false` if it was not set.
    pub fn release(&mut self, component: MemComponent) -> bool {
        let bit = Self::bit(component);
        let was_set = self.bits & bit != 0;
        self.bits &= !bit;
        was_set
    }

    pub fn contains(&self, component: MemComponent) -> bool {
        self.bits & Self::bit(component) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterates over the L1 caches recorded as holding the line.
    pub fn iter(&self) -> impl Iterator<Item = MemComponent> {
        let locations = *self;
        Self::ALL.into_iter().filter(move |c| locations.contains(*c))
    }
}

/// A single line within a cache set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheLine {
    /// Tag bits of the line address.
    pub tag: u64,
    /// Whether the line holds data.
    pub valid: bool,
    /// Whether the data differs from the next level. Implies `valid`.
    pub dirty: bool,
    /// Coherence state.
    pub state: CacheState,
    /// L1 copies (meaningful for L2 lines only).
    pub locations: CachedLocations,
}

impl CacheLine {
    /// Resets the line to the invalid state.
    pub fn clear(&mut self) {
        *self = CacheLine::default();
    }
}
