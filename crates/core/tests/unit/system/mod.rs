//! System-level tests.

/// Device-initiated DMA reads and writes.
pub mod device_dma;
