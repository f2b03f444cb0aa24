//! Address Types.
//!
//! Addresses are flat physical byte addresses. Coherence is tracked at line
//! granularity, so most of the engine works with line-aligned addresses
//! produced by [`line_address`].

/// A physical byte address.
pub type Address = u64;

/// Identifier of a tile (one core with its private L1/L2 and, optionally, a
/// slice of the home directory).
pub type TileId = usize;

/// Aligns `addr` down to the start of its cache line.
///
/// `line_bytes` must be a power of two.
#[inline]
pub fn line_address(addr: Address, line_bytes: usize) -> Address {
    addr & !(line_bytes as Address - 1)
}

/// Returns the byte offset of `addr` within its cache line.
#[inline]
pub fn line_offset(addr: Address, line_bytes: usize) -> usize {
    (addr & (line_bytes as Address - 1)) as usize
}
