//! Platform builders for the test suite.
//!
//! Every test platform is small on purpose: a few kilobytes of cache over a
//! 64 KiB memory window, fixed latencies, no mesh unless the test asks for
//! one. Cache arena indices follow the order of `caches` in the
//! configuration, which the direct-payload tests rely on.

use vpsim_core::MemorySystem;
use vpsim_core::config::{
    AddressRange, AllocationPolicy, CacheConfig, CacheLevel, InclusionPolicy, MemoryConfig,
    MemoryModel, NocConfig, PlatformConfig, Position, ReplacementPolicy, WritePolicy,
};

/// Base of the RAM window every test platform maps.
pub const RAM_BASE: u64 = 0x8000_0000;

/// Size of the RAM window.
pub const RAM_SIZE: u64 = 64 * 1024;

/// Fixed memory latency used by the harness platforms, in nanoseconds.
pub const MEM_LATENCY: u64 = 100;

/// Per-access L1 latency used by the harness platforms, in nanoseconds.
pub const L1_LATENCY: u64 = 1;

/// Per-access LLC latency used by the harness platforms, in nanoseconds.
pub const LLC_LATENCY: u64 = 10;

/// A 1 KiB direct-mapped cache template with 64-byte lines.
pub fn cache_template(name: &str, id: u32) -> CacheConfig {
    CacheConfig {
        name: name.to_string(),
        id,
        latency: L1_LATENCY,
        size: 1024,
        line_size: 64,
        associativity: 1,
        repl_policy: ReplacementPolicy::Lru,
        writing_policy: WritePolicy::WBack,
        allocation_policy: AllocationPolicy::WAllocate,
        inclusion_higher: InclusionPolicy::Nine,
        inclusion_lower: InclusionPolicy::Nine,
        is_home: false,
        is_coherent: false,
        level: CacheLevel::L1,
        data_support: true,
        position: Position::default(),
        below: None,
        range: None,
    }
}

/// A coherent private L1.
pub fn l1(name: &str, id: u32) -> CacheConfig {
    CacheConfig {
        is_coherent: true,
        ..cache_template(name, id)
    }
}

/// The coherent home LLC claiming the whole RAM window.
pub fn llc(id: u32) -> CacheConfig {
    CacheConfig {
        latency: LLC_LATENCY,
        size: 16 * 1024,
        associativity: 4,
        is_home: true,
        is_coherent: true,
        level: CacheLevel::Llc,
        range: Some(AddressRange {
            base: RAM_BASE,
            size: RAM_SIZE,
        }),
        ..cache_template("llc", id)
    }
}

/// A fixed-latency memory target covering the RAM window.
pub fn ram(name: &str) -> MemoryConfig {
    MemoryConfig {
        name: name.to_string(),
        range: AddressRange {
            base: RAM_BASE,
            size: RAM_SIZE,
        },
        model: MemoryModel::Simple,
        latency: MEM_LATENCY,
        t_cas: 14,
        t_ras: 14,
        t_pre: 14,
        position: Position::default(),
    }
}

/// Two coherent cores over a shared home LLC and one memory.
///
/// Arena indices: `l1_0` is 0, `l1_1` is 1, `llc` is 2.
pub fn coherent_pair() -> MemorySystem {
    let config = PlatformConfig {
        coherent: true,
        caches: vec![l1("l1_0", 0), l1("l1_1", 1), llc(8)],
        memories: vec![ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    MemorySystem::build(&config).unwrap()
}

/// Like [`coherent_pair`] but with two-line direct-mapped L1s (128 bytes),
/// for eviction scenarios.
pub fn coherent_pair_tiny_l1() -> MemorySystem {
    let mut small0 = l1("l1_0", 0);
    small0.size = 128;
    let mut small1 = l1("l1_1", 1);
    small1.size = 128;
    let config = PlatformConfig {
        coherent: true,
        caches: vec![small0, small1, llc(8)],
        memories: vec![ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    MemorySystem::build(&config).unwrap()
}

/// A single non-coherent cache straight over memory.
///
/// The cache is marked as the home of the fabric so its misses route to the
/// memory output. Arena index 0.
pub fn noncoherent_single(mutate: impl FnOnce(&mut CacheConfig)) -> MemorySystem {
    let mut cache = cache_template("dcache", 0);
    cache.is_home = true;
    cache.range = Some(AddressRange {
        base: RAM_BASE,
        size: RAM_SIZE,
    });
    mutate(&mut cache);
    let config = PlatformConfig {
        coherent: false,
        caches: vec![cache],
        memories: vec![ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    MemorySystem::build(&config).unwrap()
}

/// A non-coherent exclusive pair: an upper cache whose victims migrate into
/// a lower victim cache. Arena indices: upper 0, lower 1.
pub fn noncoherent_exclusive_pair() -> MemorySystem {
    let mut upper = cache_template("upper", 0);
    upper.size = 128;
    upper.inclusion_lower = InclusionPolicy::Exclusive;
    upper.below = Some("victim".to_string());
    let mut lower = cache_template("victim", 1);
    lower.inclusion_higher = InclusionPolicy::Exclusive;
    lower.is_home = true;
    lower.level = CacheLevel::L2;
    lower.range = Some(AddressRange {
        base: RAM_BASE,
        size: RAM_SIZE,
    });
    let config = PlatformConfig {
        coherent: false,
        caches: vec![upper, lower],
        memories: vec![ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    MemorySystem::build(&config).unwrap()
}
