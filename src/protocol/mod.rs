//! Coherence protocol vocabulary.
//!
//! Defines the messages exchanged between the private caches and the home
//! directory, and the per-address queue that serializes directory
//! transactions.

/// Message kinds and the message envelope.
pub mod msg;

/// Per-address request serialization.
pub mod queue;

pub use msg::{MsgKind, ShmemMsg, ShmemReq};
pub use queue::RequestQueue;
