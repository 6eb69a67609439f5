//! Construction-time error definitions.
//!
//! Everything that can go wrong while elaborating a platform is reported
//! through [`ConfigError`] before simulation starts. Runtime transport
//! failures travel as payload status codes instead, and protocol violations
//! abort the process; neither appears here.

use thiserror::Error;

/// A platform description that cannot be elaborated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Cache geometry is not realizable.
    #[error("cache '{name}': {reason}")]
    BadCacheGeometry {
        /// Offending cache instance.
        name: String,
        /// What is wrong with the geometry.
        reason: String,
    },

    /// Two fabric nodes claim the same identity.
    #[error("duplicate node id {id} ('{first}' and '{second}')")]
    DuplicateNodeId {
        /// The contested identity.
        id: u32,
        /// First claimant.
        first: String,
        /// Second claimant.
        second: String,
    },

    /// A cache names a `below` neighbor that does not exist.
    #[error("cache '{name}': unknown downstream cache '{below}'")]
    UnknownDownstream {
        /// Offending cache instance.
        name: String,
        /// The missing neighbor.
        below: String,
    },

    /// A home cache is missing its address range.
    #[error("home cache '{name}' has no address range")]
    HomeWithoutRange {
        /// Offending cache instance.
        name: String,
    },

    /// Two address-mapped outputs overlap.
    #[error("address ranges of '{first}' and '{second}' overlap")]
    OverlappingRanges {
        /// First claimant.
        first: String,
        /// Second claimant.
        second: String,
    },

    /// A component sits outside the configured mesh.
    #[error("'{name}': mesh position ({x}, {y}) outside {mesh_x}x{mesh_y} mesh")]
    PositionOutsideMesh {
        /// Offending component.
        name: String,
        /// Configured column.
        x: u32,
        /// Configured row.
        y: u32,
        /// Mesh width.
        mesh_x: u32,
        /// Mesh height.
        mesh_y: u32,
    },

    /// A NoC parameter is outside its legal domain.
    #[error("noc: {reason}")]
    BadNocParameter {
        /// What is wrong with the parameter.
        reason: String,
    },

    /// The platform references an identity that was never registered.
    #[error("unknown node id {id}")]
    UnknownNodeId {
        /// The unresolved identity.
        id: u32,
    },
}
