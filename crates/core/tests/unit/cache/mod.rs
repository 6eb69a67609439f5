//! Cache component tests.

/// Directory entry and table invariants.
pub mod directory;

/// Multi-level hierarchies with an intermediate directory.
pub mod hierarchy;




/// Replacement policy semantics at the set level.
pub mod set_replacement;
