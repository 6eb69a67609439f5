//! Common types shared across the memory hierarchy.
//!
//! This module defines the vocabulary every port speaks. It provides:
//! 1. **Identities:** `NodeId` for caches, homes, and devices in the coherence fabric.
//! 2. **Commands:** The unified data + coherence command set.
//! 3. **Payload:** The owned transaction record passed by mutable reference at every boundary.
//! 4. **Status:** Transport-layer response codes carried back in the payload.

/// Construction-time error definitions.
pub mod error;

/// Node identity type for caches, homes, and devices.
pub mod node;

/// Transaction payload, command set, delivery mode, and response status.
pub mod payload;

pub use error::ConfigError;
pub use node::NodeId;
pub use payload::{Command, Delivery, Payload, Status};
