//! System-on-Chip Traits.
//!
//! The coherence controllers talk to the rest of the system through two
//! narrow interfaces: a message transport between tiles and the backing
//! store behind each home directory. Both are shared across threads.

use crate::common::{Address, TileId};
use crate::protocol::ShmemMsg;

/// Message transport between tiles.
///
/// Two messages sent by the same sender to the same receiver are delivered
/// in order; there is no ordering across different senders.
pub trait Network: Send + Sync {
    /// Delivers `msg` to the message-delivery context of `receiver`.
    fn send(&self, sender: TileId, receiver: TileId, msg: ShmemMsg);

    /// Delivers a copy of `msg` to every tile, the sender included.
    fn broadcast(&self, sender: TileId, msg: ShmemMsg);

    /// Number of tiles reachable through this transport.
    fn total_tiles(&self) -> usize;
}

/// Line-granular data store behind a home directory.
///
/// Accesses are synchronous; no timing is modelled.
pub trait BackingStore: Send + Sync {
    /// Returns the contents of the line at `address`.
    fn get_data(&self, address: Address, requester: TileId) -> Vec<u8>;

    /// Replaces the contents of the line at `address`.
    fn put_data(&self, address: Address, requester: TileId, data: &[u8]);
}
