//! System-level wiring.
//!
//! Contains the collaborators the tiles rely on (transport, backing store,
//! address-home lookup) and the [`System`] that assembles them.

/// System construction and the per-tile delivery threads.
pub mod builder;

/// Mapping of line addresses to home tiles.
pub mod home;

/// Message transports between tiles.
pub mod interconnect;

/// DRAM behind the home directories.
pub mod memory;

/// Contracts for the transport and the backing store.
pub mod traits;

pub use builder::System;
pub use home::AddressHomeLookup;
pub use interconnect::{Interconnect, MessageLog, SentMsg};
pub use traits::{BackingStore, Network};
