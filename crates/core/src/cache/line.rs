//! Cache line slots.
//!
//! A line is an in-place slot: it is allocated once at elaboration and
//! repurposed with `set_new_line` when a new address moves in, so steady-state
//! operation never touches the heap. The optional data buffer exists only
//! when the owning controller was built with data tracking.

use std::fmt;

/// Per-line coherence state of the MSI protocol.
///
/// At a directory, the state describes the upper level: `Modified` means
/// exactly one upper cache owns the line, `Shared` means one or more upper
/// caches hold clean copies, `Invalid` means no upper copies exist. At a
/// non-directory cache the state describes the local copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoherenceState {
    /// The local (or exactly one upper) copy is dirty and exclusive.
    Modified,
    /// One or more clean copies exist.
    Shared,
    /// No valid copy.
    Invalid,
}

/// One line slot inside a cache set.
pub struct CacheLine {
    /// Address of byte 0 of the line, aligned to the line size. Meaningful
    /// only while `state != Invalid` or until the slot is repurposed.
    base_address: u64,
    /// Most-significant address bits identifying the line within its set.
    tag: u64,
    /// MSI state of this slot.
    state: CoherenceState,
    /// Line contents; allocated iff the controller tracks data.
    data: Option<Vec<u8>>,
    /// Opaque handle reported to the eviction observer when this slot's
    /// occupant is pushed out.
    pub evict_handle: Option<u64>,
}

impl CacheLine {
    /// Creates an empty (Invalid) line slot.
    ///
    /// # Arguments
    ///
    /// * `line_size` - Line size in bytes.
    /// * `data_support` - Whether to allocate a data buffer for this slot.
    pub fn new(line_size: usize, data_support: bool) -> Self {
        Self {
            base_address: 0,
            tag: 0,
            state: CoherenceState::Invalid,
            data: if data_support {
                Some(vec![0; line_size])
            } else {
                None
            },
            evict_handle: None,
        }
    }

    /// Repurposes this slot for a new address.
    ///
    /// The previous occupant is the victim the caller has already written
    /// back or evicted; the slot restarts Invalid and keeps its data buffer.
    pub fn set_new_line(&mut self, base_address: u64, tag: u64) {
        self.base_address = base_address;
        self.tag = tag;
        self.state = CoherenceState::Invalid;
        self.evict_handle = None;
    }

    /// Returns the line-aligned base address.
    #[inline(always)]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Returns the tag.
    #[inline(always)]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns the coherence state.
    #[inline(always)]
    pub fn state(&self) -> CoherenceState {
        self.state
    }

    /// Sets the coherence state.
    #[inline(always)]
    pub fn set_state(&mut self, state: CoherenceState) {
        self.state = state;
    }

    /// Returns the line contents, if data is tracked.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Returns the line contents mutably, if data is tracked.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.data.as_deref_mut()
    }

    /// Copies `src` into the line at `offset`. No-op when data is untracked.
    pub fn fill(&mut self, offset: usize, src: &[u8]) {
        if let Some(buf) = self.data.as_deref_mut() {
            buf[offset..offset + src.len()].copy_from_slice(src);
        }
    }

    /// Copies the line at `offset` into `dst`. No-op when data is untracked.
    pub fn extract(&self, offset: usize, dst: &mut [u8]) {
        if let Some(buf) = self.data.as_deref() {
            dst.copy_from_slice(&buf[offset..offset + dst.len()]);
        }
    }
}

impl fmt::Debug for CacheLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLine")
            .field("base_address", &format_args!("{:#x}", self.base_address))
            .field("tag", &format_args!("{:#x}", self.tag))
            .field("state", &self.state)
            .finish()
    }
}
