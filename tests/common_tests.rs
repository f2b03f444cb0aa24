//! Integration tests for common utilities module.

use tile_coherence::common::addr::{line_address, line_offset};
use tile_coherence::common::*;
use tile_coherence::core::units::cache::line::CacheState;
use tile_coherence::protocol::MsgKind;

/// Tests line alignment of addresses.
#[test]
fn test_line_address() {
    assert_eq!(line_address(0x1234, 64), 0x1200);
    assert_eq!(line_address(0x1240, 64), 0x1240);
    assert_eq!(line_address(0x7f, 32), 0x60);
    assert_eq!(line_address(0, 64), 0);
}

/// Tests byte offsets within a line.
#[test]
fn test_line_offset() {
    assert_eq!(line_offset(0x1234, 64), 0x34);
    assert_eq!(line_offset(0x1240, 64), 0);
    assert_eq!(line_offset(0x7f, 32), 0x1f);
}

/// Tests access type permission classes.
#[test]
fn test_access_type_needs_exclusive() {
    assert!(!AccessType::Read.needs_exclusive());
    assert!(AccessType::ReadEx.needs_exclusive());
    assert!(AccessType::Write.needs_exclusive());
}

/// Tests memory component names and classes.
#[test]
fn test_mem_component() {
    assert_eq!(MemComponent::L1ICache.to_string(), "L1-I");
    assert_eq!(MemComponent::L1DCache.to_string(), "L1-D");
    assert_eq!(MemComponent::L2Cache.to_string(), "L2");
    assert_eq!(MemComponent::DramDirectory.to_string(), "DIR");
    assert!(MemComponent::L1ICache.is_l1());
    assert!(MemComponent::L1DCache.is_l1());
    assert!(!MemComponent::L2Cache.is_l1());
}

/// Tests protocol error messages.
#[test]
fn test_protocol_error_display() {
    let err = ProtocolError::MissingEntry {
        kind: MsgKind::InvRep,
        address: 0x40,
    };
    assert_eq!(err.to_string(), "InvRep for 0x40 has no directory entry");

    let err = ProtocolError::UnexpectedLineState {
        kind: MsgKind::FlushReq,
        address: 0x80,
        expected: CacheState::Modified,
        actual: CacheState::Shared,
    };
    let text = err.to_string();
    assert!(text.contains("FlushReq"));
    assert!(text.contains("0x80"));
    assert!(text.contains("Shared"));
}

/// Tests conversion of protocol errors into simulation errors.
#[test]
fn test_sim_error_from_protocol() {
    let inner = ProtocolError::NoPendingMiss {
        kind: MsgKind::ShRep,
        address: 0xc0,
    };
    let err: SimError = inner.clone().into();
    assert_eq!(err, SimError::Protocol(inner.clone()));
    assert_eq!(err.to_string(), inner.to_string());
    assert_eq!(SimError::Aborted.to_string(), "simulation aborted");
    assert_eq!(
        SimError::InvalidAccess("tile 9".into()).to_string(),
        "invalid access: tile 9"
    );
}
