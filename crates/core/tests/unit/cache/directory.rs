//! Directory entry and table invariants.
//!
//! The three legal entry shapes — Invalid with nobody, Shared with sharers
//! only, Modified with an owner only — are the backbone of the protocol;
//! everything else must be flagged as corrupt.

use std::collections::BTreeSet;

use proptest::prelude::*;
use vpsim_core::NodeId;
use vpsim_core::cache::directory::{DirectoryEntry, DirectoryTable};
use vpsim_core::cache::line::CoherenceState;

#[test]
fn constructors_are_consistent() {
    assert!(DirectoryEntry::invalid().is_consistent());
    assert!(DirectoryEntry::shared_by(NodeId::new(3)).is_consistent());
    assert!(DirectoryEntry::modified(NodeId::new(7)).is_consistent());
}

#[test]
fn shared_without_sharers_is_corrupt() {
    let entry = DirectoryEntry {
        state: CoherenceState::Shared,
        owner: NodeId::NONE,
        sharers: BTreeSet::new(),
    };
    assert!(!entry.is_consistent());
}

#[test]
fn modified_without_owner_is_corrupt() {
    let entry = DirectoryEntry {
        state: CoherenceState::Modified,
        owner: NodeId::NONE,
        sharers: BTreeSet::new(),
    };
    assert!(!entry.is_consistent());
}

#[test]
fn modified_with_sharers_is_corrupt() {
    let mut sharers = BTreeSet::new();
    let _ = sharers.insert(NodeId::new(1));
    let entry = DirectoryEntry {
        state: CoherenceState::Modified,
        owner: NodeId::new(0),
        sharers,
    };
    assert!(!entry.is_consistent());
}

#[test]
fn entries_default_to_invalid() {
    let mut table = DirectoryTable::new();
    assert!(table.get(0x1000).is_none());
    assert_eq!(*table.entry_mut(0x1000), DirectoryEntry::invalid());
    // Lazily created entries persist.
    assert!(table.get(0x1000).is_some());
    assert!(table.is_consistent());
}

#[test]
#[should_panic(expected = "directory corrupt")]
fn corrupt_entry_aborts() {
    let mut table = DirectoryTable::new();
    table.entry_mut(0x40).state = CoherenceState::Shared;
    table.assert_consistent(0x40, "test");
}

proptest! {
    /// Any non-empty sharer set makes a consistent Shared entry; emptying
    /// it must flip the verdict.
    #[test]
    fn shared_entries_track_sharer_population(ids in proptest::collection::btree_set(0u32..64, 1..8)) {
        let sharers: BTreeSet<NodeId> = ids.into_iter().map(NodeId::new).collect();
        let mut entry = DirectoryEntry::shared(sharers);
        prop_assert!(entry.is_consistent());
        entry.sharers.clear();
        prop_assert!(!entry.is_consistent());
    }

    /// A Modified entry is consistent for every real owner and corrupt the
    /// moment any sharer sneaks in.
    #[test]
    fn modified_entries_reject_sharers(owner in 0u32..64, intruder in 0u32..64) {
        let mut entry = DirectoryEntry::modified(NodeId::new(owner));
        prop_assert!(entry.is_consistent());
        let _ = entry.sharers.insert(NodeId::new(intruder));
        prop_assert!(!entry.is_consistent());
    }
}
