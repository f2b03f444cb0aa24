//! Tests for the per-tile L1/L2 controllers, driven through a recording
//! network so every protocol step can be checked.

use std::sync::Arc;
use std::thread;
use tile_coherence::common::{AccessType, MemComponent, ProtocolError, SimError};
use tile_coherence::config::Config;
use tile_coherence::core::units::cache::line::CacheState;
use tile_coherence::core::Tile;
use tile_coherence::protocol::{MsgKind, ShmemMsg};
use tile_coherence::soc::{AddressHomeLookup, MessageLog, SentMsg};

const LINE: usize = 64;
const HOME: usize = 0;
const TILE: usize = 1;

fn create_tile() -> (Tile, Arc<MessageLog>) {
    let config = Config::default();
    let log = Arc::new(MessageLog::new(config.general.num_tiles));
    let homes = Arc::new(AddressHomeLookup::new(LINE, vec![HOME]));
    let tile = Tile::new(TILE, &config, homes, log.clone());
    (tile, log)
}

fn dir_msg(kind: MsgKind, address: u64) -> ShmemMsg {
    ShmemMsg::new(kind, MemComponent::DramDirectory, MemComponent::L2Cache, TILE, address)
}

/// Waits until the tile has sent `count` messages and returns them in order.
fn wait_sent(log: &MessageLog, count: usize) -> Vec<SentMsg> {
    let mut sent = Vec::new();
    while sent.len() < count {
        sent.extend(log.take());
        thread::yield_now();
    }
    assert_eq!(sent.len(), count, "unexpected messages: {:?}", sent);
    sent
}

/// Waits for the tile to send exactly one message and returns it.
fn next_sent(log: &MessageLog) -> SentMsg {
    wait_sent(log, 1).remove(0)
}

/// Issues an access that misses and answers it with `grant` carrying `data`.
fn fill(
    tile: &Tile,
    log: &MessageLog,
    component: MemComponent,
    access: AccessType,
    address: u64,
    grant: MsgKind,
    data: Vec<u8>,
) -> (SentMsg, Vec<u8>) {
    thread::scope(|s| {
        let issuer = s.spawn(|| {
            let mut buf = vec![0u8; 8];
            let hit = tile.access(component, access, address, &mut buf);
            (hit, buf)
        });
        let request = next_sent(log);
        tile.handle_msg(HOME, dir_msg(grant, address).with_data(data), 0)
            .unwrap();
        let (hit, buf) = issuer.join().unwrap();
        assert_eq!(hit, Ok(false));
        (request, buf)
    })
}

/// Tests that a read miss sends a shared request home and installs the grant.
#[test]
fn test_read_miss_round_trip() {
    let (tile, log) = create_tile();
    let (request, buf) = fill(
        &tile,
        &log,
        MemComponent::L1DCache,
        AccessType::Read,
        0x1008,
        MsgKind::ShRep,
        (0..LINE as u8).collect(),
    );

    assert_eq!(request.receiver, HOME);
    assert_eq!(request.msg.kind, MsgKind::ShReq);
    assert_eq!(request.msg.address, 0x1000);
    assert_eq!(request.msg.requester, TILE);
    assert_eq!(buf, (8..16).collect::<Vec<u8>>());

    assert_eq!(tile.cache_state(MemComponent::L2Cache, 0x1000), CacheState::Shared);
    assert_eq!(tile.cache_state(MemComponent::L1DCache, 0x1000), CacheState::Shared);
    assert_eq!(tile.outstanding_misses(), 0);

    let mut buf = [0u8; 4];
    assert_eq!(
        tile.access(MemComponent::L1DCache, AccessType::Read, 0x1010, &mut buf),
        Ok(true)
    );
    assert_eq!(buf, [16, 17, 18, 19]);
}

/// Tests that a write to a shared line gives up the copy before upgrading.
#[test]
fn test_upgrade_sends_inv_rep_then_ex_req() {
    let (tile, log) = create_tile();
    fill(
        &tile,
        &log,
        MemComponent::L1DCache,
        AccessType::Read,
        0x2000,
        MsgKind::ShRep,
        vec![0; LINE],
    );

    thread::scope(|s| {
        let issuer = s.spawn(|| {
            let mut buf = 0xdeadu64.to_le_bytes().to_vec();
            tile.access(MemComponent::L1DCache, AccessType::Write, 0x2000, &mut buf)
        });
        let sent = wait_sent(&log, 2);
        assert_eq!(sent[0].msg.kind, MsgKind::InvRep);
        assert!(!sent[0].msg.reply_expected);
        assert_eq!(sent[1].msg.kind, MsgKind::ExReq);
        assert_eq!(tile.cache_state(MemComponent::L2Cache, 0x2000), CacheState::Invalid);

        tile.handle_msg(HOME, dir_msg(MsgKind::ExRep, 0x2000).with_data(vec![0; LINE]), 1)
            .unwrap();
        assert_eq!(issuer.join().unwrap(), Ok(false));
    });
    assert_eq!(tile.cache_state(MemComponent::L2Cache, 0x2000), CacheState::Modified);

    let mut buf = [0u8; 8];
    assert_eq!(
        tile.access(MemComponent::L1DCache, AccessType::Read, 0x2000, &mut buf),
        Ok(true)
    );
    assert_eq!(u64::from_le_bytes(buf), 0xdead);
}

/// Tests that a flush returns the written-through data and drops every copy.
#[test]
fn test_flush_returns_written_data() {
    let (tile, log) = create_tile();
    fill(
        &tile,
        &log,
        MemComponent::L1DCache,
        AccessType::ReadEx,
        0x3000,
        MsgKind::ExRep,
        vec![0; LINE],
    );
    let mut buf = [0xee; 4];
    assert_eq!(
        tile.access(MemComponent::L1DCache, AccessType::Write, 0x3004, &mut buf),
        Ok(true)
    );

    tile.handle_msg(HOME, dir_msg(MsgKind::FlushReq, 0x3000), 2).unwrap();
    let reply = next_sent(&log);
    assert_eq!(reply.msg.kind, MsgKind::FlushRep);
    let data = reply.msg.data().expect("flush carries data");
    assert_eq!(&data[4..8], &[0xee; 4]);
    assert_eq!(tile.cache_state(MemComponent::L2Cache, 0x3000), CacheState::Invalid);
    assert_eq!(tile.cache_state(MemComponent::L1DCache, 0x3000), CacheState::Invalid);
}

/// Tests that a writeback downgrades the L2 and L1 copies to shared.
#[test]
fn test_writeback_downgrades() {
    let (tile, log) = create_tile();
    fill(
        &tile,
        &log,
        MemComponent::L1DCache,
        AccessType::ReadEx,
        0x3400,
        MsgKind::ExRep,
        vec![4; LINE],
    );

    tile.handle_msg(HOME, dir_msg(MsgKind::WbReq, 0x3400), 2).unwrap();
    let reply = next_sent(&log);
    assert_eq!(reply.msg.kind, MsgKind::WbRep);
    assert_eq!(reply.msg.data(), Some(&[4; LINE][..]));
    assert_eq!(tile.cache_state(MemComponent::L2Cache, 0x3400), CacheState::Shared);
    assert_eq!(tile.cache_state(MemComponent::L1DCache, 0x3400), CacheState::Shared);
}

/// Tests that commands for an absent line are benign.
#[test]
fn test_command_on_invalid_line_is_benign() {
    let (tile, log) = create_tile();

    tile.handle_msg(HOME, dir_msg(MsgKind::InvReq, 0x4000), 0).unwrap();
    tile.handle_msg(HOME, dir_msg(MsgKind::WbReq, 0x4000), 1).unwrap();
    assert!(log.is_empty());

    let broadcast = dir_msg(MsgKind::InvReq, 0x4000).with_reply_expected(true);
    tile.handle_msg(HOME, broadcast, 2).unwrap();
    let reply = next_sent(&log);
    assert_eq!(reply.msg.kind, MsgKind::InvRep);
    assert!(reply.msg.reply_expected);
}

/// Tests that a command contradicting the line state is fatal.
#[test]
fn test_command_state_mismatch_is_fatal() {
    let (tile, log) = create_tile();
    fill(
        &tile,
        &log,
        MemComponent::L1DCache,
        AccessType::Read,
        0x5000,
        MsgKind::ShRep,
        vec![0; LINE],
    );

    let err = tile
        .handle_msg(HOME, dir_msg(MsgKind::FlushReq, 0x5000), 3)
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::UnexpectedLineState {
            kind: MsgKind::FlushReq,
            address: 0x5000,
            expected: CacheState::Modified,
            actual: CacheState::Shared,
        }
    );
}

/// Tests that an unsolicited grant is fatal.
#[test]
fn test_grant_without_miss_is_fatal() {
    let (tile, _log) = create_tile();
    let grant = dir_msg(MsgKind::ShRep, 0x6000).with_data(vec![0; LINE]);
    assert!(matches!(
        tile.handle_msg(HOME, grant, 0),
        Err(ProtocolError::NoPendingMiss { .. })
    ));
}

/// Tests that a non-home tile rejects directory traffic.
#[test]
fn test_directory_message_to_non_home() {
    let (tile, _log) = create_tile();
    assert!(tile.directory().is_none());
    let msg = ShmemMsg::new(
        MsgKind::ShReq,
        MemComponent::L2Cache,
        MemComponent::DramDirectory,
        2,
        0x40,
    );
    assert!(matches!(
        tile.handle_msg(2, msg, 0),
        Err(ProtocolError::NotAHome { tile: TILE, .. })
    ));
}

/// Tests that the instruction and data caches never both hold a writable copy.
#[test]
fn test_l1_exclusivity() {
    let (tile, log) = create_tile();
    fill(
        &tile,
        &log,
        MemComponent::L1DCache,
        AccessType::ReadEx,
        0x7000,
        MsgKind::ExRep,
        vec![1; LINE],
    );
    assert_eq!(tile.cache_state(MemComponent::L1DCache, 0x7000), CacheState::Modified);

    let mut buf = [0u8; 4];
    assert_eq!(
        tile.access(MemComponent::L1ICache, AccessType::Read, 0x7000, &mut buf),
        Ok(false)
    );
    assert_eq!(buf, [1; 4]);
    assert_eq!(tile.cache_state(MemComponent::L1ICache, 0x7000), CacheState::Shared);
    assert_eq!(tile.cache_state(MemComponent::L1DCache, 0x7000), CacheState::Shared);

    let mut buf = [2u8; 4];
    assert_eq!(
        tile.access(MemComponent::L1DCache, AccessType::Write, 0x7000, &mut buf),
        Ok(false)
    );
    assert_eq!(tile.cache_state(MemComponent::L1ICache, 0x7000), CacheState::Invalid);
    assert_eq!(tile.cache_state(MemComponent::L1DCache, 0x7000), CacheState::Modified);
    assert!(log.is_empty());
}

/// Tests rejection of malformed accesses.
#[test]
fn test_invalid_accesses() {
    let (tile, _log) = create_tile();
    let mut buf = [0u8; 8];
    assert!(matches!(
        tile.access(MemComponent::L1DCache, AccessType::Read, 0x103c, &mut buf),
        Err(SimError::InvalidAccess(_))
    ));
    assert!(matches!(
        tile.access(MemComponent::L1ICache, AccessType::Write, 0x1000, &mut buf),
        Err(SimError::InvalidAccess(_))
    ));
    assert!(matches!(
        tile.access(MemComponent::L2Cache, AccessType::Read, 0x1000, &mut buf),
        Err(SimError::InvalidAccess(_))
    ));
    let mut empty: [u8; 0] = [];
    assert!(tile
        .access(MemComponent::L1DCache, AccessType::Read, 0x1000, &mut empty)
        .is_err());
}

/// Tests that an aborted tile fails outstanding and new misses.
#[test]
fn test_abort_pending() {
    let (tile, log) = create_tile();
    thread::scope(|s| {
        let issuer = s.spawn(|| {
            let mut buf = [0u8; 8];
            tile.access(MemComponent::L1DCache, AccessType::Read, 0x8000, &mut buf)
        });
        next_sent(&log);
        tile.abort_pending();
        assert_eq!(issuer.join().unwrap(), Err(SimError::Aborted));
    });

    let mut buf = [0u8; 8];
    assert_eq!(
        tile.access(MemComponent::L1DCache, AccessType::Read, 0x9000, &mut buf),
        Err(SimError::Aborted)
    );
}
