//! Shared-Memory Protocol Messages.
//!
//! Messages are transient: built for one protocol step, consumed by the
//! receiving controller, never persisted. Only grants and data-carrying
//! acknowledgements have a payload.

use crate::common::{Address, MemComponent, TileId};
use serde::Serialize;

/// Kind of a protocol message, grouped by direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MsgKind {
    // Cache to directory: requests.
    /// Request for a writable copy.
    ExReq,
    /// Request for a readable copy.
    ShReq,

    // Directory to cache: commands.
    /// Drop a clean copy.
    InvReq,
    /// Drop a modified copy and return its data.
    FlushReq,
    /// Downgrade a modified copy to shared and return its data.
    WbReq,
    /// Internal: evict a directory entry to free its slot.
    NullifyReq,

    // Cache to directory: acknowledgements.
    InvRep,
    /// Carries the flushed line.
    FlushRep,
    /// Carries the written-back line.
    WbRep,

    // Directory to cache: grants, always with data.
    ExRep,
    ShRep,
}

impl MsgKind {
    /// Requests that enter the directory request queue.
    pub fn is_request(self) -> bool {
        matches!(self, MsgKind::ExReq | MsgKind::ShReq | MsgKind::NullifyReq)
    }

    /// Grants that complete an outstanding miss.
    pub fn is_grant(self) -> bool {
        matches!(self, MsgKind::ExRep | MsgKind::ShRep)
    }
}

/// A coherence message addressed to one component of a tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShmemMsg {
    pub kind: MsgKind,
    pub sender_component: MemComponent,
    pub receiver_component: MemComponent,
    /// Tile whose request started the transaction this message belongs to.
    pub requester: TileId,
    /// Line-aligned address.
    pub address: Address,
    /// Set on invalidations sent by broadcast: every tile must answer,
    /// including tiles that hold no copy.
    pub reply_expected: bool,
    pub data: Option<Vec<u8>>,
}

impl ShmemMsg {
    /// Creates a message without payload.
    pub fn new(
        kind: MsgKind,
        sender_component: MemComponent,
        receiver_component: MemComponent,
        requester: TileId,
        address: Address,
    ) -> Self {
        Self {
            kind,
            sender_component,
            receiver_component,
            requester,
            address,
            reply_expected: false,
            data: None,
        }
    }

    /// Attaches a line of data.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_reply_expected(mut self, reply_expected: bool) -> Self {
        self.reply_expected = reply_expected;
        self
    }

    /// Payload bytes, if any.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }
}

/// A directory request together with the time it reached the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShmemReq {
    pub msg: ShmemMsg,
    pub arrival_time: u64,
}

impl ShmemReq {
    pub fn new(msg: ShmemMsg, arrival_time: u64) -> Self {
        Self { msg, arrival_time }
    }

    pub fn kind(&self) -> MsgKind {
        self.msg.kind
    }

    pub fn requester(&self) -> TileId {
        self.msg.requester
    }
}
