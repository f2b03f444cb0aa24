//! End-to-end tests of a running multi-tile system.

use tile_coherence::common::{AccessType, MemComponent, SimError};
use tile_coherence::config::{CacheConfig, Config, ReplacementPolicy, SharerPolicy};
use tile_coherence::core::units::cache::line::CacheState;
use tile_coherence::directory::DirectoryState;
use tile_coherence::sim::{parse_trace, run_trace};
use tile_coherence::soc::System;

/// Builds a system from the default configuration with `tiles` tiles.
fn create_system(tiles: usize) -> System {
    let mut config = Config::default();
    config.general.num_tiles = tiles;
    System::new(&config).expect("valid config")
}

fn read_u64(system: &System, tile: usize, address: u64) -> u64 {
    let mut buf = [0u8; 8];
    system.read(tile, address, &mut buf).expect("read");
    u64::from_le_bytes(buf)
}

/// Tests an exclusive request on an uncached line through the whole system.
#[test]
fn test_write_round_trip() {
    let system = create_system(4);
    let addr = 0x1000;

    assert_eq!(system.write(0, addr, &0xdead_beefu64.to_le_bytes()), Ok(false));
    system.quiesce().unwrap();

    let entry = system.directory_entry(addr).expect("tracked");
    assert_eq!(entry.state(), DirectoryState::Modified);
    assert_eq!(entry.owner(), Some(0));
    assert_eq!(
        system.tile(0).cache_state(MemComponent::L2Cache, addr),
        CacheState::Modified
    );

    let mut buf = [0u8; 8];
    assert_eq!(system.read(0, addr, &mut buf), Ok(true));
    assert_eq!(u64::from_le_bytes(buf), 0xdead_beef);
    system.check_coherence().unwrap();
}

/// Tests a read of a line another tile holds modified.
#[test]
fn test_read_after_remote_write() {
    let system = create_system(4);
    let addr = 0x2040;

    system.write(0, addr, &42u64.to_le_bytes()).unwrap();
    assert_eq!(read_u64(&system, 1, addr), 42);
    system.quiesce().unwrap();

    let entry = system.directory_entry(addr).unwrap();
    assert_eq!(entry.state(), DirectoryState::Shared);
    assert!(entry.has_sharer(0));
    assert!(entry.has_sharer(1));
    assert_eq!(entry.owner(), None);

    let mut buf = [0u8; 8];
    assert_eq!(system.read(0, addr, &mut buf), Ok(true));
    assert_eq!(u64::from_le_bytes(buf), 42);

    let dram = system.dram_line(addr).unwrap();
    assert_eq!(&dram[..8], &42u64.to_le_bytes());
    system.check_coherence().unwrap();
}

/// Tests that a write invalidates every other copy.
#[test]
fn test_write_invalidates_sharers() {
    let system = create_system(4);
    let addr = 0x3000;

    for tile in 0..3 {
        read_u64(&system, tile, addr);
    }
    system.write(3, addr, &7u64.to_le_bytes()).unwrap();
    system.quiesce().unwrap();

    for tile in 0..3 {
        assert_eq!(
            system.tile(tile).cache_state(MemComponent::L2Cache, addr),
            CacheState::Invalid
        );
    }
    let entry = system.directory_entry(addr).unwrap();
    assert_eq!(entry.state(), DirectoryState::Modified);
    assert_eq!(entry.owner(), Some(3));

    for tile in 0..3 {
        assert_eq!(read_u64(&system, tile, addr), 7);
    }
    system.quiesce().unwrap();
    system.check_coherence().unwrap();
}

/// Tests ping-pong writes between two tiles.
#[test]
fn test_write_ping_pong() {
    let system = create_system(2);
    let addr = 0x4000;
    for i in 0..50u64 {
        let tile = (i % 2) as usize;
        let prev = read_u64(&system, tile, addr);
        assert_eq!(prev, i);
        system.write(tile, addr, &(i + 1).to_le_bytes()).unwrap();
    }
    system.quiesce().unwrap();
    assert_eq!(read_u64(&system, 0, addr), 50);
    system.check_coherence().unwrap();
}

/// Tests that an L2 eviction of a modified line writes it back to DRAM.
#[test]
fn test_l2_eviction_flushes_to_dram() {
    let mut config = Config::default();
    config.general.num_tiles = 2;
    let tiny = CacheConfig {
        size_bytes: 128,
        ways: 1,
        policy: ReplacementPolicy::Lru,
    };
    config.cache.l1_i = tiny.clone();
    config.cache.l1_d = tiny.clone();
    config.cache.l2 = tiny;
    let system = System::new(&config).unwrap();

    system.write(0, 0x0, &0x55u64.to_le_bytes()).unwrap();
    system.write(0, 0x80, &0x66u64.to_le_bytes()).unwrap();
    system.quiesce().unwrap();

    assert_eq!(
        system.tile(0).cache_state(MemComponent::L2Cache, 0x0),
        CacheState::Invalid
    );
    assert_eq!(
        system.directory_entry(0x0).unwrap().state(),
        DirectoryState::Uncached
    );
    assert_eq!(&system.dram_line(0x0).unwrap()[..8], &0x55u64.to_le_bytes());

    assert_eq!(read_u64(&system, 1, 0x0), 0x55);
    assert_eq!(read_u64(&system, 1, 0x80), 0x66);
    system.quiesce().unwrap();
    system.check_coherence().unwrap();
}

/// Tests that an L2 hit serving an L1 miss refreshes the L2 LRU order.
#[test]
fn test_l2_hit_refreshes_lru() {
    let mut config = Config::default();
    config.general.num_tiles = 1;
    let l1 = CacheConfig {
        size_bytes: 64,
        ways: 1,
        policy: ReplacementPolicy::Lru,
    };
    config.cache.l1_i = l1.clone();
    config.cache.l1_d = l1;
    config.cache.l2 = CacheConfig {
        size_bytes: 128,
        ways: 2,
        policy: ReplacementPolicy::Lru,
    };
    let system = System::new(&config).unwrap();
    let (a, b, c) = (0x0, 0x40, 0x80);

    read_u64(&system, 0, a);
    read_u64(&system, 0, b);
    let mut buf = [0u8; 8];
    assert_eq!(system.read(0, a, &mut buf), Ok(false));
    assert_eq!(system.tile(0).cache_counters().2.hits, 1);
    read_u64(&system, 0, c);
    system.quiesce().unwrap();

    let tile = system.tile(0);
    assert_eq!(tile.cache_state(MemComponent::L2Cache, a), CacheState::Shared);
    assert_eq!(tile.cache_state(MemComponent::L2Cache, b), CacheState::Invalid);
    assert_eq!(tile.cache_state(MemComponent::L2Cache, c), CacheState::Shared);
    system.check_coherence().unwrap();
}

/// Tests forced directory evictions with a tiny directory.
#[test]
fn test_directory_eviction_keeps_data() {
    let mut config = Config::default();
    config.general.num_tiles = 2;
    config.directory.total_entries = 2;
    config.directory.associativity = 2;
    config.directory.home_tiles = Some(vec![0]);
    let system = System::new(&config).unwrap();

    for i in 0..6u64 {
        system.write(1, i * 0x40, &(i + 100).to_le_bytes()).unwrap();
    }
    system.quiesce().unwrap();

    let dir = system.tile(0).directory().unwrap().counters();
    assert!(dir.entry_evictions >= 4);
    for i in 0..6u64 {
        assert_eq!(read_u64(&system, 0, i * 0x40), i + 100);
    }
    system.quiesce().unwrap();
    system.check_coherence().unwrap();
}

/// Tests broadcast fallback with more readers than tracked sharers.
#[test]
fn test_broadcast_fallback_end_to_end() {
    let mut config = Config::default();
    config.general.num_tiles = 6;
    config.directory.max_hw_sharers = 2;
    config.directory.sharer_policy = SharerPolicy::LimitedBroadcast;
    let system = System::new(&config).unwrap();
    let addr = 0x5000;

    for tile in 0..5 {
        read_u64(&system, tile, addr);
    }
    system.quiesce().unwrap();
    assert!(system.directory_entry(addr).unwrap().sharers().is_global());

    system.write(5, addr, &9u64.to_le_bytes()).unwrap();
    system.quiesce().unwrap();
    let entry = system.directory_entry(addr).unwrap();
    assert_eq!(entry.owner(), Some(5));
    assert!(!entry.sharers().is_global());
    for tile in 0..5 {
        assert_eq!(read_u64(&system, tile, addr), 9);
    }
    system.quiesce().unwrap();
    system.check_coherence().unwrap();
}

/// Tests sharer eviction without broadcast.
#[test]
fn test_no_broadcast_end_to_end() {
    let mut config = Config::default();
    config.general.num_tiles = 4;
    config.directory.max_hw_sharers = 2;
    config.directory.sharer_policy = SharerPolicy::LimitedNoBroadcast;
    let system = System::new(&config).unwrap();
    let addr = 0x6000;

    for tile in 0..4 {
        read_u64(&system, tile, addr);
    }
    system.quiesce().unwrap();

    let entry = system.directory_entry(addr).unwrap();
    assert_eq!(entry.sharer_count(), 2);
    assert!(entry.has_sharer(3));
    let holders = (0..4)
        .filter(|t| system.tile(*t).cache_state(MemComponent::L2Cache, addr) == CacheState::Shared)
        .count();
    assert_eq!(holders, 2);
    system.check_coherence().unwrap();
}

/// Tests instruction fetches alongside data writes to the same line.
#[test]
fn test_fetch_sees_written_code() {
    let system = create_system(2);
    let addr = 0x7000;
    system.write(0, addr, &0x13u32.to_le_bytes()).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(system.fetch(1, addr, &mut buf), Ok(false));
    assert_eq!(u32::from_le_bytes(buf), 0x13);
    assert_eq!(system.fetch(1, addr, &mut buf), Ok(true));

    assert_eq!(system.fetch(0, addr, &mut buf), Ok(false));
    assert_eq!(u32::from_le_bytes(buf), 0x13);
    system.quiesce().unwrap();
    system.check_coherence().unwrap();
}

/// Tests error reporting for accesses the system cannot perform.
#[test]
fn test_invalid_system_accesses() {
    let system = create_system(2);
    let mut buf = [0u8; 8];
    assert!(matches!(
        system.read(5, 0x0, &mut buf),
        Err(SimError::InvalidAccess(_))
    ));
    assert!(matches!(
        system.access(0, MemComponent::L1ICache, AccessType::Write, 0x0, &mut buf),
        Err(SimError::InvalidAccess(_))
    ));
    assert!(system.fatal_error().is_none());
}

/// Tests replaying a trace and collecting statistics.
#[test]
fn test_trace_replay_and_stats() {
    let system = create_system(4);
    let trace = parse_trace(
        "0 W 0x1000 8 0x1122334455667788\n\
         1 R 0x1000 8\n\
         2 X 0x1000 8\n\
         3 I 0x2000 4\n",
    )
    .unwrap();

    let summary = run_trace(&system, &trace).unwrap();
    assert_eq!(summary.accesses, 4);
    system.check_coherence().unwrap();

    let stats = system.stats();
    assert_eq!(stats.tiles.len(), 4);
    assert!(stats.messages_sent > 0);
    let dir = stats.directory_totals();
    assert!(dir.ex_requests >= 2);
    assert_eq!(stats.cache_totals(|t| t.l1_i).misses, 1);

    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"tiles\""));
}

/// Tests that a trace naming a missing tile is rejected.
#[test]
fn test_trace_unknown_tile() {
    let system = create_system(2);
    let trace = parse_trace("7 R 0x0 8\n").unwrap();
    assert!(matches!(
        run_trace(&system, &trace),
        Err(SimError::InvalidAccess(_))
    ));
}
