//! Replacement policy tests at the set level.
//!
//! `CacheSet::access(tag)` returns `(hit, slot)` and updates the policy
//! metadata; installing the tag into the returned slot is the controller's
//! job, so the helper below does it for the tests. Victim selection is
//! observed through the slots returned on misses.

use vpsim_core::cache::line::CoherenceState;
use vpsim_core::cache::set::CacheSet;
use vpsim_core::config::ReplacementPolicy;

const LINE: usize = 64;

fn set_with(policy: ReplacementPolicy, ways: usize) -> CacheSet {
    CacheSet::new(LINE, ways, policy, false)
}

/// Accesses `tag`, installing it into the victim slot on a miss.
fn touch(set: &mut CacheSet, tag: u64) -> (bool, usize) {
    let (hit, slot) = set.access(tag);
    if !hit {
        let line = set.line_mut(slot);
        line.set_new_line(tag * LINE as u64, tag);
        line.set_state(CoherenceState::Shared);
    }
    (hit, slot)
}

// ══════════════════════════════════════════════════════════
// 1. LRU
// ══════════════════════════════════════════════════════════

/// Cold misses fill the ways in index order.
#[test]
fn lru_cold_misses_fill_in_order() {
    let mut set = set_with(ReplacementPolicy::Lru, 4);
    for tag in 0..4 {
        let (hit, slot) = touch(&mut set, tag);
        assert!(!hit);
        assert_eq!(slot, tag as usize);
    }
}

/// After filling 0,1,2,3 the oldest tag (0) is the victim.
#[test]
fn lru_evicts_least_recent() {
    let mut set = set_with(ReplacementPolicy::Lru, 4);
    for tag in 0..4 {
        let _ = touch(&mut set, tag);
    }
    assert_eq!(set.victim(), 0);

    // Re-access tag 0: victim moves to the slot holding tag 1.
    let (hit, _) = touch(&mut set, 0);
    assert!(hit);
    assert_eq!(set.victim(), 1);
}

/// A miss lands in the victim slot and promotes it.
#[test]
fn lru_miss_replaces_victim() {
    let mut set = set_with(ReplacementPolicy::Lru, 2);
    let _ = touch(&mut set, 10);
    let _ = touch(&mut set, 11);
    // Slot 0 (tag 10) is LRU.
    let (hit, slot) = touch(&mut set, 12);
    assert!(!hit);
    assert_eq!(slot, 0);
    // Tag 10 is gone, 11 and 12 remain.
    assert!(set.locate(10).is_none());
    assert!(set.locate(11).is_some());
    assert!(set.locate(12).is_some());
}

/// Repeated hits on the most-recent way leave the victim unchanged.
#[test]
fn lru_repeated_hit_keeps_victim() {
    let mut set = set_with(ReplacementPolicy::Lru, 4);
    for tag in 0..4 {
        let _ = touch(&mut set, tag);
    }
    let _ = touch(&mut set, 3);
    let _ = touch(&mut set, 3);
    assert_eq!(set.victim(), 0);
}

// ══════════════════════════════════════════════════════════
// 2. FIFO
// ══════════════════════════════════════════════════════════

/// After `associativity` consecutive misses to distinct tags, further
/// misses evict them in insertion order.
#[test]
fn fifo_evicts_in_insertion_order() {
    let mut set = set_with(ReplacementPolicy::Fifo, 4);
    for tag in 0..4 {
        let (hit, slot) = touch(&mut set, tag);
        assert!(!hit);
        assert_eq!(slot, tag as usize);
    }
    // Wrap-around: the next four misses reuse slots 0..3 in order.
    for (i, tag) in (100..104).enumerate() {
        let (hit, slot) = touch(&mut set, tag);
        assert!(!hit);
        assert_eq!(slot, i);
    }
}

/// Hits never advance the FIFO pointer.
#[test]
fn fifo_hit_does_not_advance_pointer() {
    let mut set = set_with(ReplacementPolicy::Fifo, 4);
    let _ = touch(&mut set, 0);
    let _ = touch(&mut set, 1);
    // Pointer now at slot 2. Hitting tags 0 and 1 must not move it.
    let _ = touch(&mut set, 0);
    let _ = touch(&mut set, 1);
    assert_eq!(set.victim(), 2);
}

// ══════════════════════════════════════════════════════════
// 3. MRU
// ══════════════════════════════════════════════════════════

/// The fill phase uses every way once before any replacement.
#[test]
fn mru_fill_phase_in_order() {
    let mut set = set_with(ReplacementPolicy::Mru, 4);
    for tag in 0..4 {
        let (hit, slot) = touch(&mut set, tag);
        assert!(!hit);
        assert_eq!(slot, tag as usize);
    }
}

/// Once full, the most recently touched way is the victim.
#[test]
fn mru_evicts_most_recent_after_fill() {
    let mut set = set_with(ReplacementPolicy::Mru, 4);
    for tag in 0..4 {
        let _ = touch(&mut set, tag);
    }
    // Last touch was tag 3 in slot 3.
    assert_eq!(set.victim(), 3);

    // Hit tag 1: it becomes the victim.
    let (hit, _) = touch(&mut set, 1);
    assert!(hit);
    assert_eq!(set.victim(), 1);
}

/// MRU and LRU disagree after the same access sequence.
#[test]
fn mru_is_opposite_of_lru() {
    let mut lru = set_with(ReplacementPolicy::Lru, 4);
    let mut mru = set_with(ReplacementPolicy::Mru, 4);
    for tag in 0..4 {
        let _ = touch(&mut lru, tag);
        let _ = touch(&mut mru, tag);
    }
    assert_eq!(lru.victim(), 0);
    assert_eq!(mru.victim(), 3);
}
