//! Round-Robin Replacement Policy.
//!
//! Each set keeps a pointer that advances every time a victim is chosen,
//! independent of the access pattern.

/// Round-robin policy state.
pub struct RoundRobinPolicy {
    next: Vec<usize>,
    ways: usize,
}

impl RoundRobinPolicy {
    /// Creates a policy with every set pointer at way 0.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            next: vec![0; sets],
            ways,
        }
    }

    /// Returns the way under the pointer of `set` and advances the pointer.
    pub fn get_victim(&mut self, set: usize) -> usize {
        let way = self.next[set];
        self.next[set] = (way + 1) % self.ways;
        way
    }
}
