//! Per-Address Request Queue.
//!
//! The home directory keeps one FIFO per address. Only the head of a queue
//! is ever acted on; a request for a busy address waits until every request
//! ahead of it has completed. Empty queues are removed so the map only holds
//! addresses with work outstanding.

use super::msg::ShmemReq;
use crate::common::Address;
use std::collections::{HashMap, VecDeque};

/// FIFO of pending directory requests, keyed by address.
#[derive(Default)]
pub struct RequestQueue {
    queues: HashMap<Address, VecDeque<ShmemReq>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `req` behind any request already queued for `addr`.
    pub fn enqueue(&mut self, addr: Address, req: ShmemReq) {
        self.queues.entry(addr).or_default().push_back(req);
    }

    /// Removes and returns the head of the queue for `addr`.
    pub fn dequeue(&mut self, addr: Address) -> Option<ShmemReq> {
        let queue = self.queues.get_mut(&addr)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&addr);
        }
        head
    }

    pub fn front(&self, addr: Address) -> Option<&ShmemReq> {
        self.queues.get(&addr).and_then(|q| q.front())
    }

    pub fn size(&self, addr: Address) -> usize {
        self.queues.get(&addr).map_or(0, |q| q.len())
    }

    pub fn is_empty(&self, addr: Address) -> bool {
        !self.queues.contains_key(&addr)
    }

    /// Number of addresses with at least one queued request.
    pub fn busy_addresses(&self) -> usize {
        self.queues.len()
    }
}
