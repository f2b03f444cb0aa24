//! Per-tile memory subsystem.
//!
//! Each tile owns a private L1 instruction cache, a private L1 data cache
//! and a private L2, driven by the controllers in this module, plus the
//! generic cache structures in [`units`].

/// L1 instruction/data cache controller.
pub mod l1;

/// L2 cache controller and protocol endpoint.
pub mod l2;

/// Tile memory manager tying the controllers together.
pub mod tile;

/// Generic hardware structures.
pub mod units;

pub use l1::L1CacheCntlr;
pub use l2::{L2CacheCntlr, L2Response};
pub use tile::Tile;
