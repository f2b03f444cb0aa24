//! Tests for protocol messages and the per-address request queue.

use tile_coherence::common::MemComponent;
use tile_coherence::protocol::{MsgKind, RequestQueue, ShmemMsg, ShmemReq};

/// Builds a request from `requester` for `address`.
fn request(kind: MsgKind, requester: usize, address: u64, time: u64) -> ShmemReq {
    let msg = ShmemMsg::new(
        kind,
        MemComponent::L2Cache,
        MemComponent::DramDirectory,
        requester,
        address,
    );
    ShmemReq::new(msg, time)
}

/// Tests message construction helpers.
#[test]
fn test_msg_builders() {
    let msg = ShmemMsg::new(
        MsgKind::InvReq,
        MemComponent::DramDirectory,
        MemComponent::L2Cache,
        2,
        0x80,
    );
    assert!(!msg.reply_expected);
    assert_eq!(msg.data(), None);

    let msg = msg.with_reply_expected(true).with_data(vec![1, 2]);
    assert!(msg.reply_expected);
    assert_eq!(msg.data(), Some(&[1u8, 2][..]));
}

/// Tests message kind classification.
#[test]
fn test_msg_kind_classes() {
    assert!(MsgKind::ExReq.is_request());
    assert!(MsgKind::NullifyReq.is_request());
    assert!(!MsgKind::InvRep.is_request());
    assert!(MsgKind::ShRep.is_grant());
    assert!(!MsgKind::WbReq.is_grant());
}

/// Tests first-in first-out order per address.
#[test]
fn test_queue_fifo() {
    let mut queue = RequestQueue::new();
    queue.enqueue(0x40, request(MsgKind::ExReq, 0, 0x40, 1));
    queue.enqueue(0x40, request(MsgKind::ShReq, 1, 0x40, 2));
    queue.enqueue(0x40, request(MsgKind::ExReq, 2, 0x40, 3));

    assert_eq!(queue.size(0x40), 3);
    let order: Vec<usize> = std::iter::from_fn(|| queue.dequeue(0x40))
        .map(|req| req.requester())
        .collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert!(queue.is_empty(0x40));
}

/// Tests that queues of different addresses are independent.
#[test]
fn test_queue_per_address() {
    let mut queue = RequestQueue::new();
    queue.enqueue(0x40, request(MsgKind::ExReq, 0, 0x40, 1));
    queue.enqueue(0x80, request(MsgKind::ShReq, 1, 0x80, 2));
    assert_eq!(queue.busy_addresses(), 2);

    assert_eq!(queue.front(0x80).map(|r| r.kind()), Some(MsgKind::ShReq));
    assert_eq!(queue.dequeue(0x40).map(|r| r.arrival_time), Some(1));
    assert_eq!(queue.busy_addresses(), 1);
    assert!(queue.dequeue(0x40).is_none());
    assert_eq!(queue.size(0x80), 1);
}
