use crate::common::TileId;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

const DEFAULT_NUM_TILES: usize = 4;
const DEFAULT_LINE_BYTES: usize = 64;
const DEFAULT_SEED: u64 = 0x5eed;

const L1_SIZE: usize = 16 * 1024;
const L1_WAYS: usize = 4;
const L2_SIZE: usize = 256 * 1024;
const L2_WAYS: usize = 8;

const DIR_ENTRIES: usize = 1024;
const DIR_ASSOC: usize = 16;
const DIR_HW_SHARERS: usize = 4;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: CacheHierarchyConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Tiles hosting a directory slice.
    pub fn home_tiles(&self) -> Vec<TileId> {
        match &self.directory.home_tiles {
            Some(homes) => homes.clone(),
            None => (0..self.general.num_tiles).collect(),
        }
    }

    /// Checks the geometry and the directory placement.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let general = &self.general;

        if general.num_tiles == 0 {
            return invalid("general.num_tiles must be at least 1".into());
        }
        if !general.line_bytes.is_power_of_two() || general.line_bytes < 8 {
            return invalid(format!(
                "general.line_bytes must be a power of two >= 8, got {}",
                general.line_bytes
            ));
        }

        for (name, cache) in [
            ("cache.l1_i", &self.cache.l1_i),
            ("cache.l1_d", &self.cache.l1_d),
            ("cache.l2", &self.cache.l2),
        ] {
            if !cache.ways.is_power_of_two() || !cache.size_bytes.is_power_of_two() {
                return invalid(format!("{}: size_bytes and ways must be powers of two", name));
            }
            if cache.size_bytes < cache.ways * general.line_bytes {
                return invalid(format!(
                    "{}: {} bytes cannot hold {} ways of {} byte lines",
                    name, cache.size_bytes, cache.ways, general.line_bytes
                ));
            }
        }

        let dir = &self.directory;
        if dir.associativity == 0 || dir.total_entries % dir.associativity != 0 {
            return invalid("directory.total_entries must be a multiple of directory.associativity".into());
        }
        if !(dir.total_entries / dir.associativity).is_power_of_two() {
            return invalid("directory: number of sets must be a power of two".into());
        }
        if dir.max_hw_sharers == 0 {
            return invalid("directory.max_hw_sharers must be at least 1".into());
        }

        let homes = self.home_tiles();
        if homes.is_empty() {
            return invalid("directory.home_tiles must not be empty".into());
        }
        for (i, home) in homes.iter().enumerate() {
            if *home >= general.num_tiles {
                return invalid(format!("directory.home_tiles: tile {} does not exist", home));
            }
            if homes[..i].contains(home) {
                return invalid(format!("directory.home_tiles: tile {} listed twice", home));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_num_tiles")]
    pub num_tiles: usize,

    #[serde(default = "default_line_bytes")]
    pub line_bytes: usize,

    /// Seed of the directory's sharer-selection generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            num_tiles: default_num_tiles(),
            line_bytes: default_line_bytes(),
            seed: default_seed(),
        }
    }
}

fn default_num_tiles() -> usize {
    DEFAULT_NUM_TILES
}

fn default_line_bytes() -> usize {
    DEFAULT_LINE_BYTES
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Victim selection of a cache.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    #[default]
    #[serde(alias = "LRU")]
    Lru,
    #[serde(alias = "RoundRobin")]
    RoundRobin,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheHierarchyConfig {
    #[serde(default = "d_l1")]
    pub l1_i: CacheConfig,
    #[serde(default = "d_l1")]
    pub l1_d: CacheConfig,
    #[serde(default = "d_l2")]
    pub l2: CacheConfig,
}

impl Default for CacheHierarchyConfig {
    fn default() -> Self {
        Self {
            l1_i: d_l1(),
            l1_d: d_l1(),
            l2: d_l2(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "d_c_size")]
    pub size_bytes: usize,

    #[serde(default = "d_c_ways")]
    pub ways: usize,

    #[serde(default)]
    pub policy: ReplacementPolicy,
}

fn d_l1() -> CacheConfig {
    CacheConfig {
        size_bytes: L1_SIZE,
        ways: L1_WAYS,
        policy: ReplacementPolicy::Lru,
    }
}

fn d_l2() -> CacheConfig {
    CacheConfig {
        size_bytes: L2_SIZE,
        ways: L2_WAYS,
        policy: ReplacementPolicy::Lru,
    }
}

fn d_c_size() -> usize {
    L1_SIZE
}

fn d_c_ways() -> usize {
    L1_WAYS
}

/// What a directory entry does when its sharer set is full.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharerPolicy {
    /// Track sharers exactly, up to `max_hw_sharers`.
    FullMap,
    /// Fall back to broadcast invalidation.
    #[default]
    LimitedBroadcast,
    /// Invalidate one sharer to make room.
    LimitedNoBroadcast,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    #[serde(default = "d_d_entries")]
    pub total_entries: usize,

    #[serde(default = "d_d_assoc")]
    pub associativity: usize,

    #[serde(default = "d_d_sharers")]
    pub max_hw_sharers: usize,

    #[serde(default)]
    pub sharer_policy: SharerPolicy,

    /// Tiles hosting a directory slice; all tiles when absent.
    #[serde(default)]
    pub home_tiles: Option<Vec<TileId>>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            total_entries: d_d_entries(),
            associativity: d_d_assoc(),
            max_hw_sharers: d_d_sharers(),
            sharer_policy: SharerPolicy::default(),
            home_tiles: None,
        }
    }
}

fn d_d_entries() -> usize {
    DIR_ENTRIES
}

fn d_d_assoc() -> usize {
    DIR_ASSOC
}

fn d_d_sharers() -> usize {
    DIR_HW_SHARERS
}
