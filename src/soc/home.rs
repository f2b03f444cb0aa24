//! Address-to-Home Lookup.
//!
//! Every line has exactly one home directory. Line numbers are interleaved
//! over the tiles that host a directory slice, so consecutive lines land on
//! consecutive homes.

use crate::common::{Address, TileId};

/// Deterministic mapping from a line address to its home tile.
#[derive(Clone, Debug)]
pub struct AddressHomeLookup {
    line_bits: u32,
    homes: Vec<TileId>,
}

impl AddressHomeLookup {
    /// Creates a lookup over `homes`.
    ///
    /// # Arguments
    ///
    /// * `line_bytes` - Interleaving granularity; a power of two.
    /// * `homes` - Tiles hosting a directory slice, in interleaving order.
    pub fn new(line_bytes: usize, homes: Vec<TileId>) -> Self {
        Self {
            line_bits: line_bytes.trailing_zeros(),
            homes,
        }
    }

    /// Returns the home tile of `address`.
    pub fn home_of(&self, address: Address) -> TileId {
        let line = address >> self.line_bits;
        self.homes[(line % self.homes.len() as u64) as usize]
    }

    /// Returns `true` if `tile` hosts a directory slice.
    pub fn is_home(&self, tile: TileId) -> bool {
        self.homes.contains(&tile)
    }

    pub fn homes(&self) -> &[TileId] {
        &self.homes
    }
}
