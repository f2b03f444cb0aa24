//! Sharer Tracking.
//!
//! A [`SharerSet`] records which tiles hold a copy of a line. Three policies
//! differ only in what happens when a sharer is added to a full set:
//!
//! * `FullMap` tracks sharers exactly and rejects the add. The directory
//!   invalidates one existing sharer and retries once it has answered.
//! * `LimitedBroadcast` stops tracking individuals, raises the global flag,
//!   and counts every tile as an untracked sharer. Invalidations are then
//!   broadcast and every tile answers; each answer counts the set down.
//! * `LimitedNoBroadcast` rejects the add the same way.
//!
//! Every policy tracks at most `max_hw_sharers` tiles individually.

use crate::common::TileId;
use crate::config::SharerPolicy;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Result of [`SharerSet::sharers_list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SharersList {
    /// Broadcast fallback is active; every tile must be treated as a sharer.
    All,
    /// The exact set of sharers.
    Tracked(Vec<TileId>),
}

/// Set of tiles sharing a line, bounded by the hardware tracking capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharerSet {
    policy: SharerPolicy,
    tracked: BTreeSet<TileId>,
    capacity: usize,
    total_tiles: usize,
    global: bool,
    untracked: usize,
}

impl SharerSet {
    /// Creates an empty set.
    ///
    /// # Arguments
    ///
    /// * `policy` - Overflow behaviour.
    /// * `max_hw_sharers` - Number of tiles tracked individually.
    /// * `total_tiles` - Number of tiles in the system.
    pub fn new(policy: SharerPolicy, max_hw_sharers: usize, total_tiles: usize) -> Self {
        Self {
            policy,
            tracked: BTreeSet::new(),
            capacity: max_hw_sharers,
            total_tiles,
            global: false,
            untracked: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if `id` is individually tracked.
    pub fn has_sharer(&self, id: TileId) -> bool {
        self.tracked.contains(&id)
    }

    /// Returns `true` while broadcast fallback is active.
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Adds `id` to the set.
    ///
    /// Returns `false` when the set is full and the policy requires the
    /// caller to invalidate an existing sharer first.
    pub fn add_sharer(&mut self, id: TileId) -> bool {
        if self.global || self.tracked.contains(&id) {
            return true;
        }
        if self.tracked.len() < self.capacity {
            self.tracked.insert(id);
            return true;
        }
        match self.policy {
            SharerPolicy::LimitedBroadcast => {
                self.global = true;
                self.untracked = self.total_tiles;
                true
            }
            SharerPolicy::FullMap | SharerPolicy::LimitedNoBroadcast => false,
        }
    }

    /// Removes `id` from the set.
    ///
    /// `reply_expected` marks an acknowledgement to a broadcast invalidation;
    /// each one counts the untracked sharers down and the fallback ends when
    /// the count reaches zero. Returns `false` if the removal is inconsistent
    /// with the set (an unknown sharer, or a broadcast reply without fallback).
    pub fn remove_sharer(&mut self, id: TileId, reply_expected: bool) -> bool {
        let was_tracked = self.tracked.remove(&id);
        if !self.global {
            return was_tracked && !reply_expected;
        }
        if reply_expected {
            self.untracked = self.untracked.saturating_sub(1);
            if self.untracked == 0 {
                self.global = false;
                return self.tracked.is_empty();
            }
        }
        true
    }

    /// Number of sharers; every tile while broadcast fallback is active.
    pub fn sharer_count(&self) -> usize {
        if self.global {
            self.total_tiles
        } else {
            self.tracked.len()
        }
    }

    /// Picks a tracked sharer at random.
    pub fn one_sharer<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<TileId> {
        let sharers: Vec<TileId> = self.tracked.iter().copied().collect();
        sharers.choose(rng).copied()
    }

    pub fn sharers_list(&self) -> SharersList {
        if self.global {
            SharersList::All
        } else {
            SharersList::Tracked(self.tracked.iter().copied().collect())
        }
    }

    /// Returns `true` if at most `max_hw_sharers` tiles are tracked, or
    /// broadcast fallback is active.
    pub fn within_bound(&self) -> bool {
        self.global || self.tracked.len() <= self.capacity
    }
}
