//! Home directory.
//!
//! Every line has one home tile whose directory slice tracks which tiles
//! cache it and in what aggregate state. The slice is a bounded associative
//! cache of entries; making room for a new line forces the eviction
//! ("nullification") of an idle entry through the regular protocol.

/// Associative store of directory entries.
pub mod cache;

/// The directory state machine.
pub mod cntlr;

/// Per-line directory state.
pub mod entry;

/// Sharer set policies.
pub mod sharers;

pub use cache::DirectoryCache;
pub use cntlr::{DirectoryCounters, DramDirectoryCntlr};
pub use entry::{DirectoryEntry, DirectoryState};
pub use sharers::{SharerSet, SharersList};
