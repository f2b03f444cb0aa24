//! Tests for configuration parsing and validation.

use tile_coherence::config::{Config, ConfigError, ReplacementPolicy, SharerPolicy};

fn assert_invalid(toml: &str, needle: &str) {
    match Config::from_toml_str(toml) {
        Err(ConfigError::Invalid(msg)) => assert!(
            msg.contains(needle),
            "expected '{}' in '{}'",
            needle,
            msg
        ),
        other => panic!("expected invalid config, got {:?}", other),
    }
}

/// Tests the built-in defaults.
#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.general.num_tiles, 4);
    assert_eq!(config.general.line_bytes, 64);
    assert_eq!(config.cache.l1_d.size_bytes, 16 * 1024);
    assert_eq!(config.cache.l2.ways, 8);
    assert_eq!(config.directory.total_entries, 1024);
    assert_eq!(config.directory.sharer_policy, SharerPolicy::LimitedBroadcast);
    assert!(config.validate().is_ok());
}

/// Tests that an empty document yields the defaults.
#[test]
fn test_empty_toml() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.general.num_tiles, 4);
    assert_eq!(config.home_tiles(), vec![0, 1, 2, 3]);
}

/// Tests parsing a partial configuration.
#[test]
fn test_parse_toml() {
    let config = Config::from_toml_str(
        r#"
        [general]
        num_tiles = 8
        seed = 0x10

        [cache.l1_i]
        size_bytes = 4096
        ways = 2
        policy = "round_robin"

        [directory]
        max_hw_sharers = 2
        sharer_policy = "limited_no_broadcast"
        home_tiles = [1, 5]
        "#,
    )
    .unwrap();

    assert_eq!(config.general.num_tiles, 8);
    assert_eq!(config.general.seed, 0x10);
    assert_eq!(config.general.line_bytes, 64);
    assert_eq!(config.cache.l1_i.size_bytes, 4096);
    assert_eq!(config.cache.l1_i.policy, ReplacementPolicy::RoundRobin);
    assert_eq!(config.cache.l1_d.size_bytes, 16 * 1024);
    assert_eq!(config.directory.sharer_policy, SharerPolicy::LimitedNoBroadcast);
    assert_eq!(config.home_tiles(), vec![1, 5]);
}

/// Tests the accepted spellings of the policies.
#[test]
fn test_policy_names() {
    let config = Config::from_toml_str(
        r#"
        [cache.l2]
        policy = "LRU"
        [cache.l1_d]
        policy = "RoundRobin"
        [directory]
        sharer_policy = "full_map"
        "#,
    )
    .unwrap();
    assert_eq!(config.cache.l2.policy, ReplacementPolicy::Lru);
    assert_eq!(config.cache.l1_d.policy, ReplacementPolicy::RoundRobin);
    assert_eq!(config.directory.sharer_policy, SharerPolicy::FullMap);

    assert!(matches!(
        Config::from_toml_str("[directory]\nsharer_policy = \"sometimes\"\n"),
        Err(ConfigError::Parse(_))
    ));
}

/// Tests rejection of bad cache geometry.
#[test]
fn test_invalid_cache_geometry() {
    assert_invalid("[cache.l2]\nsize_bytes = 3000\n", "cache.l2");
    assert_invalid("[cache.l1_i]\nways = 3\n", "cache.l1_i");
    assert_invalid(
        "[cache.l1_d]\nsize_bytes = 128\nways = 4\n",
        "cannot hold",
    );
    assert_invalid("[general]\nline_bytes = 48\n", "line_bytes");
}

/// Tests rejection of bad directory geometry.
#[test]
fn test_invalid_directory() {
    assert_invalid(
        "[directory]\ntotal_entries = 100\nassociativity = 16\n",
        "multiple",
    );
    assert_invalid(
        "[directory]\ntotal_entries = 48\nassociativity = 16\n",
        "power of two",
    );
    assert_invalid("[directory]\nmax_hw_sharers = 0\n", "max_hw_sharers");
}

/// Tests rejection of bad home tile lists.
#[test]
fn test_invalid_home_tiles() {
    assert_invalid("[directory]\nhome_tiles = []\n", "empty");
    assert_invalid("[directory]\nhome_tiles = [0, 9]\n", "does not exist");
    assert_invalid("[directory]\nhome_tiles = [1, 1]\n", "twice");
}

/// Tests rejection of an empty system.
#[test]
fn test_zero_tiles() {
    assert_invalid("[general]\nnum_tiles = 0\n", "num_tiles");
}

/// Tests loading the shipped configuration file.
#[test]
fn test_load_default_file() {
    let config = Config::from_file("configs/default.toml").unwrap();
    assert_eq!(config.general.num_tiles, 4);
    assert_eq!(config.general.seed, 0x5eed);
    assert_eq!(config.directory.associativity, 16);
    assert_eq!(config.directory.home_tiles, None);
}

/// Tests the error for a missing file.
#[test]
fn test_missing_file() {
    assert!(matches!(
        Config::from_file("configs/does-not-exist.toml"),
        Err(ConfigError::Io { .. })
    ));
}
