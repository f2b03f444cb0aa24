//! Least Recently Used (LRU) Replacement Policy.
//!
//! Every way carries a recency stamp taken from a monotonically increasing
//! counter. Touching a way refreshes its stamp; the victim is the way with
//! the oldest stamp in the set.

/// LRU Policy state.
pub struct LruPolicy {
    /// Recency stamp of every way, one row per set.
    stamps: Vec<Vec<u64>>,
    clock: u64,
}

impl LruPolicy {
    /// Creates a new LRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            stamps: vec![vec![0; ways]; sets],
            clock: 0,
        }
    }

    /// Marks `way` of `set` as most recently used.
    pub fn update(&mut self, set: usize, way: usize) {
        self.clock += 1;
        self.stamps[set][way] = self.clock;
    }

    /// Returns the least recently used way of `set`.
    ///
    /// Ties resolve to the lowest way index.
    pub fn get_victim(&self, set: usize) -> usize {
        self.stamps[set]
            .iter()
            .enumerate()
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(way, _)| way)
            .unwrap_or(0)
    }
}
