//! Backing memory behind the home directories.

/// DRAM controller serving line reads and writes.
pub mod controller;

pub use controller::DramCntlr;
