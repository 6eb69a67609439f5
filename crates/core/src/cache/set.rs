//! Associativity-wide line groups with replacement bookkeeping.
//!
//! A set owns `associativity` line slots plus the replacement metadata that
//! orders them. For LRU and MRU the metadata is a dense rank permutation in
//! `[0, associativity)`; FIFO keeps a rotating victim pointer and ignores the
//! ranks. Lookups return slot indices rather than references so the caller
//! can reborrow lines mutably around downstream sends.

use crate::cache::line::{CacheLine, CoherenceState};
use crate::config::ReplacementPolicy;

/// One cache set: a fixed group of line slots sharing an index.
#[derive(Debug)]
pub struct CacheSet {
    associativity: usize,
    policy: ReplacementPolicy,
    lines: Vec<CacheLine>,
    /// Dense rank per slot (LRU/MRU). Rank `associativity - 1` is the victim.
    repl: Vec<u32>,
    /// Rotating victim pointer (FIFO).
    next_victim: usize,
    /// Slots touched at least once (MRU fill phase).
    touched: Vec<bool>,
    touched_count: usize,
}

impl CacheSet {
    /// Creates a set of empty lines.
    ///
    /// # Arguments
    ///
    /// * `line_size` - Line size in bytes.
    /// * `associativity` - Number of ways (≥ 1).
    /// * `policy` - Replacement policy ordering the ways.
    /// * `data_support` - Whether line slots carry data buffers.
    pub fn new(
        line_size: usize,
        associativity: usize,
        policy: ReplacementPolicy,
        data_support: bool,
    ) -> Self {
        let lines = (0..associativity)
            .map(|_| CacheLine::new(line_size, data_support))
            .collect();
        // Slot 0 starts at the victim rank so cold misses fill in index order.
        let repl = (0..associativity)
            .map(|i| (associativity - i - 1) as u32)
            .collect();
        Self {
            associativity,
            policy,
            lines,
            repl,
            next_victim: 0,
            touched: vec![false; associativity],
            touched_count: 0,
        }
    }

    /// Looks up `tag` and updates replacement metadata.
    ///
    /// On a hit the touched slot is promoted per the policy; on a miss the
    /// victim slot is selected (and, for FIFO, the pointer advances). Either
    /// way the returned index is the slot the access operates on.
    ///
    /// # Returns
    ///
    /// `(hit, slot_index)`.
    pub fn access(&mut self, tag: u64) -> (bool, usize) {
        match self.locate(tag) {
            Some(idx) => {
                if self.policy != ReplacementPolicy::Fifo {
                    self.promote(idx);
                }
                (true, idx)
            }
            None => {
                let victim = self.victim();
                match self.policy {
                    ReplacementPolicy::Fifo => {
                        self.next_victim = (self.next_victim + 1) % self.associativity;
                    }
                    _ => self.promote(victim),
                }
                (false, victim)
            }
        }
    }

    /// Returns the slot the replacement policy would sacrifice next,
    /// without updating any metadata.
    pub fn victim(&self) -> usize {
        match self.policy {
            ReplacementPolicy::Fifo => self.next_victim,
            ReplacementPolicy::Lru => self.rank_max(),
            ReplacementPolicy::Mru => {
                if self.touched_count < self.associativity {
                    // Fill phase: untouched slots go first, lowest index wins.
                    self.touched
                        .iter()
                        .position(|t| !t)
                        .unwrap_or_else(|| self.rank_max())
                } else {
                    self.rank_max()
                }
            }
        }
    }

    /// Returns the index of the slot holding `tag` in a non-Invalid state.
    pub fn locate(&self, tag: u64) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.tag() == tag && l.state() != CoherenceState::Invalid)
    }

    /// Returns a shared reference to the slot at `idx`.
    #[inline(always)]
    pub fn line(&self, idx: usize) -> &CacheLine {
        &self.lines[idx]
    }

    /// Returns a mutable reference to the slot at `idx`.
    #[inline(always)]
    pub fn line_mut(&mut self, idx: usize) -> &mut CacheLine {
        &mut self.lines[idx]
    }

    /// Iterates over all slots (used by whole-cache sweeps).
    pub fn lines_mut(&mut self) -> impl Iterator<Item = &mut CacheLine> {
        self.lines.iter_mut()
    }

    /// Promotes the touched slot per the policy and rebalances the ranks so
    /// they stay a dense permutation.
    fn promote(&mut self, idx: usize) {
        if !self.touched[idx] {
            self.touched[idx] = true;
            self.touched_count += 1;
        }
        let old = self.repl[idx];
        match self.policy {
            ReplacementPolicy::Lru => {
                // Touched slot becomes most-recent (rank 0); everything that
                // was more recent ages by one.
                for r in &mut self.repl {
                    if *r < old {
                        *r += 1;
                    }
                }
                self.repl[idx] = 0;
            }
            ReplacementPolicy::Mru => {
                // Touched slot becomes rank associativity-1 (the next victim
                // once the set is full); everything above it slides down.
                for r in &mut self.repl {
                    if *r > old {
                        *r -= 1;
                    }
                }
                self.repl[idx] = (self.associativity - 1) as u32;
            }
            ReplacementPolicy::Fifo => {}
        }
    }

    /// Index of the unique slot at the victim rank. Lower index wins on the
    /// (initialization-only) case of duplicate ranks.
    fn rank_max(&self) -> usize {
        let max = (self.associativity - 1) as u32;
        self.repl.iter().position(|&r| r == max).unwrap_or(0)
    }
}
