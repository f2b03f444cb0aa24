//! Cache Replacement Policies.
//!
//! The policy is fixed per cache instance and chosen from configuration.
//! Allocation always prefers an invalid way; the policy is consulted only
//! when every way of the set is valid.

/// Least Recently Used policy.
pub mod lru;

/// Round-robin policy.
pub mod round_robin;

use crate::config::ReplacementPolicy;

pub use lru::LruPolicy;
pub use round_robin::RoundRobinPolicy;

/// Victim selector of a cache instance.
pub enum Replacer {
    RoundRobin(RoundRobinPolicy),
    Lru(LruPolicy),
}

impl Replacer {
    /// Builds the selector named by `policy` for a cache of the given shape.
    pub fn new(policy: ReplacementPolicy, sets: usize, ways: usize) -> Self {
        match policy {
            ReplacementPolicy::RoundRobin => Replacer::RoundRobin(RoundRobinPolicy::new(sets, ways)),
            ReplacementPolicy::Lru => Replacer::Lru(LruPolicy::new(sets, ways)),
        }
    }

    /// Records an access to `way` of `set`.
    pub fn touch(&mut self, set: usize, way: usize) {
        if let Replacer::Lru(lru) = self {
            lru.update(set, way);
        }
    }

    /// Chooses the way of a full `set` to evict.
    pub fn next_victim(&mut self, set: usize) -> usize {
        match self {
            Replacer::RoundRobin(rr) => rr.get_victim(set),
            Replacer::Lru(lru) => lru.get_victim(set),
        }
    }
}
