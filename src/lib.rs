//! Tile Coherence Engine Library.
//!
//! This crate models the memory subsystem of a tiled multicore: every tile
//! has private L1 instruction and data caches and a private L2, and a set of
//! home tiles host slices of a distributed directory that keeps the L2s
//! coherent with an MSI protocol.
//!
//! # Architecture
//!
//! * **Tiles**: L1-I/L1-D/L2 controllers with per-level locks, an issuing
//!   context per core and a message-delivery thread per tile.
//! * **Directory**: set-associative directory cache with limited sharer
//!   tracking, per-address request queues and forced entry eviction.
//! * **System**: channel-based interconnect, sparse DRAM behind each home and
//!   line-interleaved address-to-home mapping.
//!
//! # Modules
//!
//! * `common`: Shared identifiers, access kinds and error types.
//! * `config`: Configuration loading and validation.
//! * `core`: Per-tile cache controllers and cache structures.
//! * `directory`: Home directory state and controller.
//! * `protocol`: Coherence messages and request queues.
//! * `sim`: Trace loading and replay.
//! * `soc`: Interconnect, DRAM, home lookup and system assembly.
//! * `stats`: Statistics collection and reporting.

/// Shared identifiers, access kinds and error types.
pub mod common;

/// Configuration system for tiles, caches and the directory.
///
/// Loads TOML configuration files and validates cache geometry and
/// directory placement.
pub mod config;

/// Per-tile memory subsystem: L1/L2 controllers and cache structures.
pub mod core;

/// Home directory: entries, sharer tracking, directory cache and controller.
pub mod directory;

/// Coherence message vocabulary and per-address request queues.
pub mod protocol;

/// Trace loading and multi-threaded replay.
pub mod sim;

/// System assembly, interconnect, DRAM and home lookup.
pub mod soc;

/// Statistics collection and reporting.
pub mod stats;
