//! Directory state for home and intermediate caches.
//!
//! The directory maps line addresses to their authoritative sharing vector.
//! Entries are created lazily on first reference and never evicted. Lookup
//! is a hash map; nothing in the protocol depends on iteration order.

use std::collections::{BTreeSet, HashMap};

use crate::cache::line::CoherenceState;
use crate::common::NodeId;

/// Authoritative sharing vector for one line address.
///
/// Exactly one of three shapes is legal after every transaction:
/// - `Invalid`: no owner, no sharers;
/// - `Shared`: no owner, at least one sharer;
/// - `Modified`: an owner, no sharers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Aggregate state of the upper-level copies.
    pub state: CoherenceState,
    /// Owning node when `state == Modified`.
    pub owner: NodeId,
    /// Sharing nodes when `state == Shared`.
    pub sharers: BTreeSet<NodeId>,
}

impl DirectoryEntry {
    /// Creates an `Invalid` entry (no upper copies).
    pub fn invalid() -> Self {
        Self {
            state: CoherenceState::Invalid,
            owner: NodeId::NONE,
            sharers: BTreeSet::new(),
        }
    }

    /// Creates a `Shared` entry with the given sharers.
    pub fn shared(sharers: BTreeSet<NodeId>) -> Self {
        Self {
            state: CoherenceState::Shared,
            owner: NodeId::NONE,
            sharers,
        }
    }

    /// Creates a `Shared` entry with a single sharer.
    pub fn shared_by(id: NodeId) -> Self {
        let mut sharers = BTreeSet::new();
        let _ = sharers.insert(id);
        Self::shared(sharers)
    }

    /// Creates a `Modified` entry owned by `id`.
    pub fn modified(id: NodeId) -> Self {
        Self {
            state: CoherenceState::Modified,
            owner: id,
            sharers: BTreeSet::new(),
        }
    }

    /// Returns `true` if the entry satisfies the state/owner/sharers shape
    /// invariant.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            CoherenceState::Invalid => self.owner.is_none() && self.sharers.is_empty(),
            CoherenceState::Shared => self.owner.is_none() && !self.sharers.is_empty(),
            CoherenceState::Modified => !self.owner.is_none() && self.sharers.is_empty(),
        }
    }
}

impl Default for DirectoryEntry {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Lazily populated table of directory entries keyed by line address.
#[derive(Debug, Default)]
pub struct DirectoryTable {
    entries: HashMap<u64, DirectoryEntry>,
}

impl DirectoryTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `addr`, creating an `Invalid` one if absent.
    pub fn entry_mut(&mut self, addr: u64) -> &mut DirectoryEntry {
        self.entries.entry(addr).or_default()
    }

    /// Returns the entry for `addr` if it was ever referenced.
    pub fn get(&self, addr: u64) -> Option<&DirectoryEntry> {
        self.entries.get(&addr)
    }

    /// Asserts the shape invariant for `addr`, aborting the simulation with
    /// a diagnostic on violation. Called after every directory transaction.
    ///
    /// # Panics
    ///
    /// Panics when the entry exists and violates the invariant.
    pub fn assert_consistent(&self, addr: u64, cache: &str) {
        if let Some(entry) = self.entries.get(&addr) {
            assert!(
                entry.is_consistent(),
                "{cache}: directory corrupt at {addr:#x}: state {:?}, owner {}, {} sharer(s)",
                entry.state,
                entry.owner,
                entry.sharers.len(),
            );
        }
    }

    /// Returns `true` if every entry satisfies the shape invariant.
    pub fn is_consistent(&self) -> bool {
        self.entries.values().all(DirectoryEntry::is_consistent)
    }
}
