//! Memory Access Types.
//!
//! This module defines the classification of memory accesses issued by a
//! core and the memory components that take part in the coherence protocol.

use serde::Serialize;
use std::fmt;

/// Type of memory access operation.
///
/// Determines which permission the L1 line must hold before the access can
/// complete locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessType {
    /// Plain load. Requires a readable line.
    Read,

    /// Load with intent to write (e.g. the first half of an atomic).
    /// Requires a writable line but does not modify it.
    ReadEx,

    /// Store. Requires a writable line.
    Write,
}

impl AccessType {
    /// Returns `true` if the access needs exclusive (writable) permission.
    pub fn needs_exclusive(self) -> bool {
        matches!(self, AccessType::ReadEx | AccessType::Write)
    }
}

/// A participant in the memory hierarchy.
///
/// Protocol messages name their sending and receiving component so the
/// delivery context of a tile can route them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MemComponent {
    /// Private L1 instruction cache.
    L1ICache,
    /// Private L1 data cache.
    L1DCache,
    /// Private unified L2 cache.
    L2Cache,
    /// Home directory slice.
    DramDirectory,
}

impl MemComponent {
    /// Returns `true` for the two private L1 caches.
    pub fn is_l1(self) -> bool {
        matches!(self, MemComponent::L1ICache | MemComponent::L1DCache)
    }
}

impl fmt::Display for MemComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemComponent::L1ICache => "L1-I",
            MemComponent::L1DCache => "L1-D",
            MemComponent::L2Cache => "L2",
            MemComponent::DramDirectory => "DIR",
        };
        f.write_str(name)
    }
}
