//! Common types shared by every part of the coherence engine.
//!
//! This module provides the address and tile identifiers, the classification
//! of memory accesses and memory components, and the error taxonomy used by
//! the cache controllers and the home directory.

/// Address and tile identifier definitions.
pub mod addr;

/// Memory access and memory component definitions.
pub mod data;

/// Protocol and simulation error types.
pub mod error;

pub use addr::{Address, TileId};
pub use data::{AccessType, MemComponent};
pub use error::{ProtocolError, SimError};
