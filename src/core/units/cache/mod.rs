//! Set-Associative Cache.
//!
//! A generic N-way cache over fixed-size lines used for the private L1-I,
//! L1-D and L2 caches. Lines live in a flat arena indexed by
//! `set * ways + way`; callers hold [`LineHandle`]s rather than references so
//! that the controllers can look a line up, release the borrow, and come back
//! to it.
//!
//! The cache performs no coherence actions. [`Cache::insert`] hands the full
//! state of an evicted line back to the caller, which runs whatever eviction
//! notification the protocol requires.

/// Per-line coherence state and L1 location tracking.
pub mod line;

/// Replacement policies.
pub mod policies;

use crate::common::Address;
use crate::config::CacheConfig;
use line::{CacheLine, CacheState, CachedLocations};
use policies::Replacer;
use serde::Serialize;

/// Address decomposition for a set-associative structure.
///
/// Shared by the data caches and the directory cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheGeometry {
    pub line_bytes: usize,
    pub num_sets: usize,
    pub ways: usize,
    line_bits: u32,
    set_bits: u32,
}

impl CacheGeometry {
    /// Builds the geometry of a cache of `size_bytes` total capacity.
    ///
    /// All three quantities must be powers of two (checked by
    /// [`crate::config::Config::validate`]).
    pub fn new(size_bytes: usize, ways: usize, line_bytes: usize) -> Self {
        Self::from_sets(size_bytes / (ways * line_bytes), ways, line_bytes)
    }

    /// Builds the geometry from an explicit set count.
    pub fn from_sets(num_sets: usize, ways: usize, line_bytes: usize) -> Self {
        let num_sets = num_sets.max(1);
        Self {
            line_bytes,
            num_sets,
            ways,
            line_bits: line_bytes.trailing_zeros(),
            set_bits: num_sets.trailing_zeros(),
        }
    }

    /// Splits `addr` into `(tag, set_index, offset)`.
    pub fn split(&self, addr: Address) -> (u64, usize, usize) {
        let offset = (addr & (self.line_bytes as u64 - 1)) as usize;
        let line = addr >> self.line_bits;
        let set = (line & (self.num_sets as u64 - 1)) as usize;
        let tag = line >> self.set_bits;
        (tag, set, offset)
    }

    /// Rebuilds the line-aligned address of `tag` in `set`.
    pub fn join(&self, tag: u64, set: usize) -> Address {
        ((tag << self.set_bits) | set as u64) << self.line_bits
    }

    /// Returns the set index of `addr`.
    pub fn set_index(&self, addr: Address) -> usize {
        self.split(addr).1
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.num_sets * self.ways * self.line_bytes
    }
}

/// Position of a line inside a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineHandle {
    pub set: usize,
    pub way: usize,
}

/// A valid line displaced by [`Cache::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictedLine {
    /// Line-aligned address of the displaced line.
    pub address: Address,
    pub state: CacheState,
    pub dirty: bool,
    pub locations: CachedLocations,
    /// Contents of the line at the time of eviction.
    pub data: Vec<u8>,
}

/// Access counters of a single cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

/// A set-associative cache holding line data and coherence state.
pub struct Cache {
    name: &'static str,
    geometry: CacheGeometry,
    lines: Vec<CacheLine>,
    data: Vec<u8>,
    replacer: Replacer,
    /// Hit/miss/eviction counters, updated by the owning controller.
    pub counters: CacheCounters,
}

impl Cache {
    /// Creates an empty cache described by `config`.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in log output.
    /// * `config` - Capacity, associativity and replacement policy.
    /// * `line_bytes` - Line size shared by the whole hierarchy.
    pub fn new(name: &'static str, config: &CacheConfig, line_bytes: usize) -> Self {
        let geometry = CacheGeometry::new(config.size_bytes, config.ways, line_bytes);
        let slots = geometry.num_sets * geometry.ways;
        Self {
            name,
            geometry,
            lines: vec![CacheLine::default(); slots],
            data: vec![0; slots * line_bytes],
            replacer: Replacer::new(config.policy, geometry.num_sets, geometry.ways),
            counters: CacheCounters::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }

    /// Splits `addr` into `(tag, set_index, offset)`.
    pub fn split(&self, addr: Address) -> (u64, usize, usize) {
        self.geometry.split(addr)
    }

    fn index(&self, handle: LineHandle) -> usize {
        handle.set * self.geometry.ways + handle.way
    }

    /// Locates the valid line holding `addr`.
    pub fn find(&self, addr: Address) -> Option<LineHandle> {
        let (tag, set, _) = self.split(addr);
        (0..self.geometry.ways)
            .map(|way| LineHandle { set, way })
            .find(|h| {
                let line = &self.lines[self.index(*h)];
                line.valid && line.tag == tag
            })
    }

    /// Returns the valid line holding `addr`, if any.
    pub fn peek(&self, addr: Address) -> Option<&CacheLine> {
        self.find(addr).map(|h| self.line(h))
    }

    /// Returns the coherence state of `addr` (`Invalid` when absent).
    pub fn state_of(&self, addr: Address) -> CacheState {
        self.peek(addr).map(|l| l.state).unwrap_or_default()
    }

    pub fn line(&self, handle: LineHandle) -> &CacheLine {
        &self.lines[self.index(handle)]
    }

    pub fn line_mut(&mut self, handle: LineHandle) -> &mut CacheLine {
        let idx = self.index(handle);
        &mut self.lines[idx]
    }

    /// Returns the full contents of the line at `handle`.
    pub fn line_data(&self, handle: LineHandle) -> &[u8] {
        let start = self.index(handle) * self.geometry.line_bytes;
        &self.data[start..start + self.geometry.line_bytes]
    }

    /// Marks the line at `handle` as most recently used.
    pub fn touch(&mut self, handle: LineHandle) {
        self.replacer.touch(handle.set, handle.way);
    }

    /// Copies `buf.len()` bytes starting at `offset` out of the line.
    pub fn read(&mut self, handle: LineHandle, offset: usize, buf: &mut [u8]) {
        let start = self.index(handle) * self.geometry.line_bytes + offset;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        self.replacer.touch(handle.set, handle.way);
    }

    /// Copies `bytes` into the line starting at `offset`.
    ///
    /// Does not change the coherence state or the dirty flag.
    pub fn write(&mut self, handle: LineHandle, offset: usize, bytes: &[u8]) {
        let start = self.index(handle) * self.geometry.line_bytes + offset;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.replacer.touch(handle.set, handle.way);
    }

    /// Drops the line holding `addr`. Returns `false` if it was not cached.
    pub fn invalidate(&mut self, addr: Address) -> bool {
        match self.find(addr) {
            Some(handle) => {
                self.line_mut(handle).clear();
                self.counters.invalidations += 1;
                true
            }
            None => false,
        }
    }

    /// Installs the line at `addr` with `state` and contents `fill`.
    ///
    /// An invalid way is preferred; otherwise the replacement policy picks a
    /// victim, whose prior state and data are returned before the way is
    /// overwritten. `fill` shorter than a line leaves the tail zeroed.
    pub fn insert(
        &mut self,
        addr: Address,
        state: CacheState,
        fill: &[u8],
    ) -> (LineHandle, Option<EvictedLine>) {
        let (tag, set, _) = self.split(addr);
        let ways = self.geometry.ways;

        let way = self
            .find(addr)
            .map(|h| h.way)
            .or_else(|| (0..ways).find(|w| !self.lines[set * ways + w].valid))
            .unwrap_or_else(|| self.replacer.next_victim(set));
        let handle = LineHandle { set, way };

        let prior = *self.line(handle);
        let evicted = if prior.valid && prior.tag != tag {
            self.counters.evictions += 1;
            Some(EvictedLine {
                address: self.geometry.join(prior.tag, set),
                state: prior.state,
                dirty: prior.dirty,
                locations: prior.locations,
                data: self.line_data(handle).to_vec(),
            })
        } else {
            None
        };

        let line_bytes = self.geometry.line_bytes;
        let start = self.index(handle) * line_bytes;
        let slot = &mut self.data[start..start + line_bytes];
        slot.fill(0);
        let n = fill.len().min(line_bytes);
        slot[..n].copy_from_slice(&fill[..n]);

        *self.line_mut(handle) = CacheLine {
            tag,
            valid: true,
            dirty: false,
            state,
            locations: CachedLocations::default(),
        };
        self.replacer.touch(set, way);

        (handle, evicted)
    }

    /// Iterates over the line-aligned addresses of every valid line.
    pub fn valid_lines(&self) -> impl Iterator<Item = (Address, &CacheLine)> + '_ {
        let ways = self.geometry.ways;
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.valid)
            .map(move |(i, l)| (self.geometry.join(l.tag, i / ways), l))
    }
}
