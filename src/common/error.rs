//! Error Types.
//!
//! Protocol violations are fatal: they indicate a broken coherence invariant
//! and are reported with the address, message kind, and the expected and
//! observed states. Benign races (a command arriving for a line that was
//! already evicted) are not errors and never produce these values.

use crate::common::{Address, MemComponent, TileId};
use crate::core::units::cache::line::CacheState;
use crate::directory::entry::DirectoryState;
use crate::protocol::msg::MsgKind;
use thiserror::Error;

/// A fatal violation of the coherence protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// An acknowledgement arrived for an address the directory does not track.
    #[error("{kind:?} for {address:#x} has no directory entry")]
    MissingEntry { kind: MsgKind, address: Address },

    /// A directory message arrived while the entry was in the wrong state.
    #[error("{kind:?} for {address:#x} in directory state {actual:?}, expected {expected:?}")]
    UnexpectedDirectoryState {
        kind: MsgKind,
        address: Address,
        expected: DirectoryState,
        actual: DirectoryState,
    },

    /// A directory command found the L2 line in a state it cannot act on.
    #[error("{kind:?} for {address:#x} found L2 line {actual:?}, expected {expected:?}")]
    UnexpectedLineState {
        kind: MsgKind,
        address: Address,
        expected: CacheState,
        actual: CacheState,
    },

    /// An acknowledgement came from a tile that does not own the line.
    #[error("{kind:?} for {address:#x} from tile {sender}, owner is {owner:?}")]
    NotOwner {
        kind: MsgKind,
        address: Address,
        sender: TileId,
        owner: Option<TileId>,
    },

    /// The sharer set of an entry no longer satisfies its invariants.
    #[error("sharer invariant broken for {address:#x}: {detail}")]
    SharerInvariant { address: Address, detail: String },

    /// An L1 location bit was set twice for the same L2 line.
    #[error("{component} already recorded as holding {address:#x}")]
    DoubleClaim {
        address: Address,
        component: MemComponent,
    },

    /// Every entry of a full directory set has queued requests.
    #[error("no idle replacement candidate in directory set {set} for {address:#x}")]
    NoReplacementCandidate { address: Address, set: usize },

    /// A message kind that the receiving component never handles.
    #[error("unexpected {kind:?} for {address:#x} at {component}")]
    UnexpectedMessage {
        kind: MsgKind,
        address: Address,
        component: MemComponent,
    },

    /// A grant or data acknowledgement arrived without its line.
    #[error("{kind:?} for {address:#x} carries no data")]
    MissingData { kind: MsgKind, address: Address },

    /// A grant arrived for an address with no outstanding miss.
    #[error("{kind:?} for {address:#x} matches no outstanding miss")]
    NoPendingMiss { kind: MsgKind, address: Address },

    /// An L1 holds a line that its L2 does not.
    #[error("{address:#x} cached in {component} but absent from L2")]
    InclusionViolated {
        address: Address,
        component: MemComponent,
    },

    /// A directory message was routed to a tile without a directory slice.
    #[error("tile {tile} hosts no directory but received {kind:?} for {address:#x}")]
    NotAHome {
        tile: TileId,
        kind: MsgKind,
        address: Address,
    },

    /// The line lost its permission between the fill and the access.
    #[error("{component} access to {address:#x} not permitted after fill")]
    AccessNotGranted {
        address: Address,
        component: MemComponent,
    },
}

/// Errors surfaced to the code driving the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// The protocol detected a broken invariant.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The requested access cannot be expressed (bad tile, crosses a line...).
    #[error("invalid access: {0}")]
    InvalidAccess(String),

    /// The system shut down while the access was outstanding.
    #[error("simulation aborted")]
    Aborted,
}
