//! Memory-hierarchy timing core for virtual-platform simulation.
//!
//! This crate implements the timing model of a coherent memory system:
//! 1. **Caches:** Configurable set-associative controllers with LRU/MRU/FIFO
//!    replacement, write-back/write-through, write-allocate/write-around,
//!    and inclusive/exclusive/NINE inclusion policies.
//! 2. **Coherence:** A full MSI directory protocol across private (L1),
//!    intermediate (L2), and home/LLC roles.
//! 3. **Fabric:** A coherent interconnect routing by address range and node
//!    id, with RAM interleaving across memory controllers.
//! 4. **NoC:** A mesh timing model — XY routing, router/link latencies,
//!    virtual channels, and buffered contention with head-of-line blocking.
//! 5. **System:** `MemorySystem` (arena owner and transport entry points),
//!    platform builder, configuration, and statistics.
//!
//! The core consumes an initiator identity and a timestamp from its
//! collaborators and returns a response status and an accumulated delay; it
//! never executes code.

/// Cache lines, sets, directory, and the cache controller with its four
/// role engines.
pub mod cache;

/// Identities, commands, payloads, statuses, and construction errors.
pub mod common;

/// Platform configuration (defaults, enums, hierarchical structures).
pub mod config;

/// Coherent interconnect: port tables and routing rules.
pub mod interconnect;

/// Mesh NoC timing model (XY routing, contention windows).
pub mod noc;

/// Statistics collection and reporting.
pub mod stats;

/// Platform elaboration and the top-level `MemorySystem`.
pub mod system;

/// The cache controller type; one instance per cache in the platform.
pub use crate::cache::CacheController;
/// Transaction currency at every port; constructed by initiators.
pub use crate::common::{Command, NodeId, Payload, Status};
/// Root configuration type; deserialize from JSON or build in code.
pub use crate::config::PlatformConfig;
/// Top-level platform; construct with `MemorySystem::build`.
pub use crate::system::MemorySystem;
