//! Trace-driven simulation harness.

/// Trace file parsing.
pub mod loader;

/// Multi-threaded trace replay.
pub mod runner;

pub use loader::{load_trace, parse_trace, TraceError, TraceOp};
pub use runner::{run_trace, RunSummary};
