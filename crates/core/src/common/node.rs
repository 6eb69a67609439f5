//! Node identities in the coherence fabric.
//!
//! Every cache, home, and DMA-capable device carries an opaque 32-bit identity.
//! A reserved sentinel (`NodeId::NONE`) marks "no node", used for directory
//! entries without an owner and payloads without a requester.

use std::fmt;

/// Opaque identity of a node (cache, home, or device) in the coherence fabric.
///
/// Identities are assigned at elaboration and never change. The all-ones
/// value is reserved as the `NONE` sentinel and is rejected wherever a real
/// node is required.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Reserved sentinel meaning "no node".
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Creates a node identity from a raw 32-bit value.
    #[inline(always)]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw 32-bit value.
    #[inline(always)]
    pub fn val(&self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the reserved `NONE` sentinel.
    #[inline(always)]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
