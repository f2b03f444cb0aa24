//! Tile Interconnect.
//!
//! Two [`Network`] implementations:
//!
//! * [`Interconnect`] gives every tile an unbounded FIFO channel drained by
//!   the tile's delivery thread. Each message is stamped with a logical send
//!   time. An in-flight counter covers a message from the moment it is sent
//!   until its handler returns, so a zero count means the system is
//!   quiescent.
//! * [`MessageLog`] records messages instead of delivering them, so a single
//!   controller can be driven step by step.

use super::traits::Network;
use crate::common::TileId;
use crate::protocol::ShmemMsg;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// An item in a tile's delivery queue.
#[derive(Debug)]
pub enum Delivery {
    Message {
        sender: TileId,
        msg: ShmemMsg,
        time: u64,
    },
    /// Stops the delivery thread.
    Shutdown,
}

/// Channel-based transport between tiles.
pub struct Interconnect {
    links: Vec<Sender<Delivery>>,
    clock: AtomicU64,
    in_flight: AtomicUsize,
    sent: AtomicU64,
}

impl Interconnect {
    /// Creates the transport and the receiving end of every tile's queue.
    pub fn new(num_tiles: usize) -> (Self, Vec<Receiver<Delivery>>) {
        let (links, receivers) = (0..num_tiles).map(|_| unbounded()).unzip();
        let interconnect = Self {
            links,
            clock: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            sent: AtomicU64::new(0),
        };
        (interconnect, receivers)
    }

    fn deliver(&self, sender: TileId, receiver: TileId, msg: ShmemMsg) {
        let time = self.clock.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!(
            "net t={} {} -> {}: {:?} {:#x}",
            time,
            sender,
            receiver,
            msg.kind,
            msg.address
        );
        let delivered = self
            .links
            .get(receiver)
            .map(|link| link.send(Delivery::Message { sender, msg, time }).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Marks one delivered message as fully handled.
    pub fn mark_handled(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Messages sent but not yet fully handled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Total messages sent so far.
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Asks every delivery thread to stop after its queued messages.
    pub fn shutdown(&self) {
        for link in &self.links {
            let _ = link.send(Delivery::Shutdown);
        }
    }
}

impl Network for Interconnect {
    fn send(&self, sender: TileId, receiver: TileId, msg: ShmemMsg) {
        self.deliver(sender, receiver, msg);
    }

    fn broadcast(&self, sender: TileId, msg: ShmemMsg) {
        for receiver in 0..self.links.len() {
            self.deliver(sender, receiver, msg.clone());
        }
    }

    fn total_tiles(&self) -> usize {
        self.links.len()
    }
}

/// A message captured by [`MessageLog`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMsg {
    pub sender: TileId,
    pub receiver: TileId,
    pub msg: ShmemMsg,
}

/// Transport that records every message it is given.
///
/// Broadcasts are recorded as one message per tile.
pub struct MessageLog {
    total_tiles: usize,
    sent: Mutex<Vec<SentMsg>>,
}

impl MessageLog {
    pub fn new(total_tiles: usize) -> Self {
        Self {
            total_tiles,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<SentMsg> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Network for MessageLog {
    fn send(&self, sender: TileId, receiver: TileId, msg: ShmemMsg) {
        self.sent.lock().push(SentMsg {
            sender,
            receiver,
            msg,
        });
    }

    fn broadcast(&self, sender: TileId, msg: ShmemMsg) {
        let mut sent = self.sent.lock();
        for receiver in 0..self.total_tiles {
            sent.push(SentMsg {
                sender,
                receiver,
                msg: msg.clone(),
            });
        }
    }

    fn total_tiles(&self) -> usize {
        self.total_tiles
    }
}
