//! Configuration system for the memory-hierarchy timing core.
//!
//! This module defines all configuration structures and enums used to
//! parameterize a platform. It provides:
//! 1. **Defaults:** Baseline hardware constants (cache geometry, NoC timing, RAM map).
//! 2. **Structures:** Hierarchical config for caches, memory targets, and the NoC.
//! 3. **Enums:** Replacement, write, allocation, and inclusion policies; cache
//!    level and role options; memory latency models.
//!
//! Configuration is supplied as JSON (typically emitted by the host platform
//! description) or built programmatically; use the struct `Default`s for a
//! minimal two-level platform.

use serde::Deserialize;

/// Default configuration constants.
///
/// These values define the baseline hardware configuration when not
/// explicitly overridden in the platform description.
mod defaults {
    /// Default cache capacity in bytes (32 KiB).
    pub const CACHE_SIZE: usize = 32 * 1024;

    /// Default line size in bytes (64 bytes).
    ///
    /// Matches typical modern processor cache line sizes and DRAM burst length.
    pub const LINE_SIZE: usize = 64;

    /// Default associativity (1 way = direct-mapped).
    pub const ASSOCIATIVITY: usize = 1;

    /// Default per-access cache latency in nanoseconds.
    pub const CACHE_LATENCY: u64 = 1;

    /// Base address of main system RAM (2 GiB).
    pub const RAM_BASE: u64 = 0x8000_0000;

    /// Total size of main system RAM (128 MiB).
    pub const RAM_SIZE: u64 = 128 * 1024 * 1024;

    /// Fixed memory access latency in nanoseconds.
    pub const MEMORY_LATENCY: u64 = 100;

    /// CAS (column access strobe) latency in nanoseconds.
    pub const T_CAS: u64 = 14;

    /// RAS (row access strobe) latency in nanoseconds.
    pub const T_RAS: u64 = 14;

    /// Precharge latency in nanoseconds.
    pub const T_PRE: u64 = 14;

    /// Per-router traversal latency in nanoseconds.
    pub const ROUTER_LATENCY: u64 = 1;

    /// Per-link traversal latency in nanoseconds.
    pub const LINK_LATENCY: u64 = 1;

    /// Flit size in bytes.
    pub const FLIT_SIZE: u32 = 8;

    /// Contention-interval length in nanoseconds.
    pub const CONTENTION_INTERVAL: u64 = 1000;

    /// Virtual channels per physical link.
    pub const VIRTUAL_CHANNELS: u32 = 1;

    /// Output-buffer depth in flits per virtual channel.
    pub const BUFFER_SIZE: u32 = 1;

    /// Memory word length in bytes (DMA word split).
    pub const MEMORY_WORD_LENGTH: u32 = 8;
}

/// Cache replacement policy algorithms.
///
/// Selects which line a full set sacrifices when a new line must be
/// installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used: evicts the line untouched for the longest time.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// Most Recently Used: evicts the line touched most recently once the
    /// set has filled. Effective for cyclic patterns larger than the cache.
    #[serde(alias = "Mru")]
    Mru,
    /// First-In First-Out: round-robin victim pointer, ignores hits.
    #[serde(alias = "Fifo")]
    Fifo,
}

/// Write-handling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum WritePolicy {
    /// Write-back: dirty lines are forwarded only on replacement.
    #[default]
    #[serde(alias = "write-back")]
    WBack,
    /// Write-through: every write is forwarded to the next level.
    #[serde(alias = "write-through")]
    WThrough,
}

/// Allocation policies for writes that miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum AllocationPolicy {
    /// Write-allocate: install the line on a write miss.
    #[default]
    #[serde(alias = "write-allocate")]
    WAllocate,
    /// Write-around: forward the write without installing the line.
    #[serde(alias = "write-around")]
    WAround,
}

/// Inclusion relationship required between adjacent cache levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum InclusionPolicy {
    /// Non-inclusive, non-exclusive: no constraint.
    #[default]
    #[serde(alias = "NINE")]
    Nine,
    /// The neighbor's lines are a subset of this cache's lines.
    Inclusive,
    /// No line lives in both this cache and the neighbor at once.
    Exclusive,
}

/// Position of a cache in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum CacheLevel {
    /// Private first-level cache; emits requests only downstream.
    #[default]
    #[serde(rename = "1")]
    L1,
    /// Intermediate level; emits requests both up and down.
    #[serde(rename = "2")]
    L2,
    /// Last-level cache; emits requests only upstream (plus memory).
    #[serde(rename = "LLC")]
    Llc,
}

/// Memory latency model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryModel {
    /// Fixed latency per access.
    #[default]
    Simple,
    /// Row-buffer-aware DRAM timing (CAS, RAS, precharge).
    #[serde(alias = "DRAM")]
    Dram,
}

/// Mesh coordinates of a component's attachment router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Position {
    /// Router column, in `[0, mesh_x)`.
    pub x: u32,
    /// Router row, in `[0, mesh_y)`.
    pub y: u32,
}

/// A contiguous physical address range claimed by a home or memory target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AddressRange {
    /// First byte covered.
    pub base: u64,
    /// Number of bytes covered.
    pub size: u64,
}

impl AddressRange {
    /// Last byte covered (inclusive).
    pub fn last(&self) -> u64 {
        self.base + self.size - 1
    }

    /// Returns `true` when `[addr, addr + len)` lies entirely inside the range.
    pub fn covers(&self, addr: u64, len: usize) -> bool {
        addr >= self.base && addr + len as u64 - 1 <= self.last()
    }
}

/// Configuration of one cache controller.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Instance name used in reports and diagnostics.
    pub name: String,

    /// NodeId of this cache in the coherence fabric.
    pub id: u32,

    /// Fixed per-access delay in nanoseconds.
    #[serde(default = "CacheConfig::default_latency")]
    pub latency: u64,

    /// Total cache capacity in bytes.
    #[serde(default = "CacheConfig::default_size")]
    pub size: usize,

    /// Line size in bytes (power of two).
    #[serde(default = "CacheConfig::default_line_size")]
    pub line_size: usize,

    /// Ways per set (≥ 1).
    #[serde(default = "CacheConfig::default_associativity")]
    pub associativity: usize,

    /// Replacement policy.
    #[serde(default)]
    pub repl_policy: ReplacementPolicy,

    /// Write policy.
    #[serde(default)]
    pub writing_policy: WritePolicy,

    /// Allocation policy.
    #[serde(default)]
    pub allocation_policy: AllocationPolicy,

    /// Inclusion relationship with the level above.
    #[serde(default)]
    pub inclusion_higher: InclusionPolicy,

    /// Inclusion relationship with the level below.
    #[serde(default)]
    pub inclusion_lower: InclusionPolicy,

    /// Promotes this cache to a directory home.
    #[serde(default)]
    pub is_home: bool,

    /// Enables the MSI state machine.
    #[serde(default)]
    pub is_coherent: bool,

    /// Hierarchy level.
    #[serde(default)]
    pub level: CacheLevel,

    /// Tracks and transfers actual line contents.
    #[serde(default)]
    pub data_support: bool,

    /// Attachment router in the mesh.
    #[serde(default)]
    pub position: Position,

    /// Name of the cache directly below (a private next level); when absent
    /// the cache sends downstream traffic to the fabric.
    #[serde(default)]
    pub below: Option<String>,

    /// Address range served when this cache is a home.
    #[serde(default)]
    pub range: Option<AddressRange>,
}

impl CacheConfig {
    /// Returns the default per-access latency in nanoseconds.
    fn default_latency() -> u64 {
        defaults::CACHE_LATENCY
    }

    /// Returns the default cache capacity in bytes.
    fn default_size() -> usize {
        defaults::CACHE_SIZE
    }

    /// Returns the default line size in bytes.
    fn default_line_size() -> usize {
        defaults::LINE_SIZE
    }

    /// Returns the default associativity.
    fn default_associativity() -> usize {
        defaults::ASSOCIATIVITY
    }
}

/// Configuration of one memory-mapped backing store.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Instance name used in reports and diagnostics.
    pub name: String,

    /// Address range served.
    pub range: AddressRange,

    /// Latency model.
    #[serde(default)]
    pub model: MemoryModel,

    /// Fixed latency in nanoseconds (Simple model).
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: u64,

    /// CAS latency in nanoseconds (DRAM model).
    #[serde(default = "MemoryConfig::default_t_cas")]
    pub t_cas: u64,

    /// RAS latency in nanoseconds (DRAM model).
    #[serde(default = "MemoryConfig::default_t_ras")]
    pub t_ras: u64,

    /// Precharge latency in nanoseconds (DRAM model).
    #[serde(default = "MemoryConfig::default_t_pre")]
    pub t_pre: u64,

    /// Attachment router in the mesh.
    #[serde(default)]
    pub position: Position,
}

impl MemoryConfig {
    /// Returns the default fixed access latency in nanoseconds.
    fn default_latency() -> u64 {
        defaults::MEMORY_LATENCY
    }

    /// Returns the default CAS latency in nanoseconds.
    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }

    /// Returns the default RAS latency in nanoseconds.
    fn default_t_ras() -> u64 {
        defaults::T_RAS
    }

    /// Returns the default precharge latency in nanoseconds.
    fn default_t_pre() -> u64 {
        defaults::T_PRE
    }
}

/// Configuration of one DMA-capable device attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Instance name used in reports and diagnostics.
    pub name: String,

    /// NodeId of the device.
    pub id: u32,

    /// Attachment router in the mesh.
    #[serde(default)]
    pub position: Position,
}

/// NoC and fabric configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NocConfig {
    /// Enables the mesh timing model; when false a fixed fabric latency applies.
    #[serde(default)]
    pub is_mesh: bool,

    /// Mesh width in routers.
    #[serde(default = "NocConfig::default_mesh_dim")]
    pub mesh_x: u32,

    /// Mesh height in routers.
    #[serde(default = "NocConfig::default_mesh_dim")]
    pub mesh_y: u32,

    /// Per-router traversal latency in nanoseconds.
    #[serde(default = "NocConfig::default_router_latency")]
    pub router_latency: u64,

    /// Per-link traversal latency in nanoseconds.
    #[serde(default = "NocConfig::default_link_latency")]
    pub link_latency: u64,

    /// Flit size in bytes.
    #[serde(default = "NocConfig::default_flit_size")]
    pub flit_size: u32,

    /// Enables the buffered-contention model.
    #[serde(default)]
    pub with_contention: bool,

    /// Contention-interval length in nanoseconds.
    #[serde(default = "NocConfig::default_contention_interval")]
    pub contention_interval: u64,

    /// Virtual channels per physical link (≥ 1).
    #[serde(default = "NocConfig::default_virtual_channels")]
    pub virtual_channels: u32,

    /// Output-buffer depth in flits per virtual channel (≥ 1).
    #[serde(default = "NocConfig::default_buffer_size")]
    pub buffer_size: u32,

    /// Memory word length in bytes, used to split DMA reads.
    #[serde(default = "NocConfig::default_memory_word_length")]
    pub memory_word_length: u32,

    /// Interleave stripe length in bytes; 0 disables interleaving.
    #[serde(default)]
    pub interleave_length: u64,

    /// First byte of the interleaved RAM window.
    #[serde(default = "NocConfig::default_ram_base_address")]
    pub ram_base_address: u64,

    /// First byte past the interleaved RAM window.
    #[serde(default = "NocConfig::default_ram_last_address")]
    pub ram_last_address: u64,

    /// Fixed fabric latency in nanoseconds when the mesh model is off.
    #[serde(default)]
    pub latency: u64,

    /// Keeps per-initiator distance/latency totals.
    #[serde(default)]
    pub stats_per_initiator: bool,
}

impl NocConfig {
    /// Returns the default mesh dimension in routers.
    fn default_mesh_dim() -> u32 {
        1
    }

    /// Returns the default per-router latency in nanoseconds.
    fn default_router_latency() -> u64 {
        defaults::ROUTER_LATENCY
    }

    /// Returns the default per-link latency in nanoseconds.
    fn default_link_latency() -> u64 {
        defaults::LINK_LATENCY
    }

    /// Returns the default flit size in bytes.
    fn default_flit_size() -> u32 {
        defaults::FLIT_SIZE
    }

    /// Returns the default contention-interval length in nanoseconds.
    fn default_contention_interval() -> u64 {
        defaults::CONTENTION_INTERVAL
    }

    /// Returns the default virtual-channel count.
    fn default_virtual_channels() -> u32 {
        defaults::VIRTUAL_CHANNELS
    }

    /// Returns the default buffer depth in flits per virtual channel.
    fn default_buffer_size() -> u32 {
        defaults::BUFFER_SIZE
    }

    /// Returns the default memory word length in bytes.
    fn default_memory_word_length() -> u32 {
        defaults::MEMORY_WORD_LENGTH
    }

    /// Returns the default RAM window base.
    fn default_ram_base_address() -> u64 {
        defaults::RAM_BASE
    }

    /// Returns the default end of the RAM window.
    fn default_ram_last_address() -> u64 {
        defaults::RAM_BASE + defaults::RAM_SIZE
    }
}

impl Default for NocConfig {
    fn default() -> Self {
        Self {
            is_mesh: false,
            mesh_x: Self::default_mesh_dim(),
            mesh_y: Self::default_mesh_dim(),
            router_latency: Self::default_router_latency(),
            link_latency: Self::default_link_latency(),
            flit_size: Self::default_flit_size(),
            with_contention: false,
            contention_interval: Self::default_contention_interval(),
            virtual_channels: Self::default_virtual_channels(),
            buffer_size: Self::default_buffer_size(),
            memory_word_length: Self::default_memory_word_length(),
            interleave_length: 0,
            ram_base_address: Self::default_ram_base_address(),
            ram_last_address: Self::default_ram_last_address(),
            latency: 0,
            stats_per_initiator: false,
        }
    }
}

/// Root configuration describing a whole platform.
///
/// # Examples
///
/// ```
/// use vpsim_core::config::PlatformConfig;
///
/// let json = r#"{
///     "coherent": true,
///     "caches": [
///         { "name": "l1_0", "id": 0, "size": 1024, "line_size": 64,
///           "is_coherent": true, "level": "1", "data_support": true },
///         { "name": "llc", "id": 8, "size": 65536, "line_size": 64,
///           "associativity": 4, "is_coherent": true, "is_home": true,
///           "level": "LLC", "data_support": true,
///           "range": { "base": 2147483648, "size": 134217728 } }
///     ],
///     "memories": [
///         { "name": "dram0",
///           "range": { "base": 2147483648, "size": 134217728 },
///           "model": "Dram" }
///     ],
///     "noc": { "is_mesh": true, "mesh_x": 2, "mesh_y": 2 }
/// }"#;
///
/// let config: PlatformConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.caches.len(), 2);
/// assert!(config.caches[1].is_home);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Whether the fabric routes MSI coherence traffic.
    #[serde(default)]
    pub coherent: bool,

    /// Cache controllers, upper levels first by convention.
    pub caches: Vec<CacheConfig>,

    /// Memory-mapped backing stores.
    pub memories: Vec<MemoryConfig>,

    /// DMA-capable devices.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Interconnect and NoC parameters.
    #[serde(default)]
    pub noc: NocConfig,
}
