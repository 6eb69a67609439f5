//! Address maps, range errors, interleaving, and fabric latency.

use vpsim_core::MemorySystem;
use vpsim_core::common::{NodeId, Status};
use vpsim_core::config::{AddressRange, NocConfig, PlatformConfig, Position};

use crate::common::harness::{self, RAM_BASE, RAM_SIZE};

const CPU: NodeId = NodeId(0);

/// Two memories split the RAM window; writes land in the right one.
fn split_memory_platform(noc: NocConfig) -> MemorySystem {
    let mut mem_low = harness::ram("mem_low");
    mem_low.range = AddressRange {
        base: RAM_BASE,
        size: RAM_SIZE / 2,
    };
    mem_low.position = Position { x: 0, y: 0 };
    let mut mem_high = harness::ram("mem_high");
    mem_high.range = AddressRange {
        base: RAM_BASE + RAM_SIZE / 2,
        size: RAM_SIZE / 2,
    };
    mem_high.position = Position { x: 1, y: 0 };

    let mut cache = harness::cache_template("dcache", 0);
    cache.is_home = true;
    cache.range = Some(AddressRange {
        base: RAM_BASE,
        size: RAM_SIZE,
    });
    let config = PlatformConfig {
        coherent: false,
        caches: vec![cache],
        memories: vec![mem_low, mem_high],
        devices: vec![],
        noc,
    };
    MemorySystem::build(&config).unwrap()
}

// ══════════════════════════════════════════════════════════
// 1. Range routing
// ══════════════════════════════════════════════════════════

#[test]
fn writes_route_to_covering_range() {
    let mut sys = split_memory_platform(NocConfig::default());
    let mut delay = 0;
    let low = RAM_BASE + 8;
    let high = RAM_BASE + RAM_SIZE / 2 + 8;

    assert_eq!(sys.write(CPU, low, &[0xAA; 4], &mut delay, 0), Status::Ok);
    assert_eq!(sys.write(CPU, high, &[0xBB; 4], &mut delay, 1), Status::Ok);

    // Force both dirty lines out so memory sees them.
    let mut buf = [0u8; 4];
    assert_eq!(sys.read(CPU, low + 1024, &mut buf, &mut delay, 2), Status::Ok);
    assert_eq!(sys.read(CPU, high + 1024, &mut buf, &mut delay, 3), Status::Ok);

    let mut held = [0u8; 4];
    sys.memory_mut("mem_low").unwrap().peek(low, &mut held);
    assert_eq!(held, [0xAA; 4]);
    sys.memory_mut("mem_high").unwrap().peek(high, &mut held);
    assert_eq!(held, [0xBB; 4]);
}

/// For any address in a registered range, routing terminates at exactly
/// one memory output; outside every range it fails with `AddressError`.
#[test]
fn unmapped_address_reports_address_error() {
    let mut sys = split_memory_platform(NocConfig::default());
    let mut delay = 0;
    let mut buf = [0u8; 4];
    let status = sys.read(CPU, RAM_BASE + RAM_SIZE + 64, &mut buf, &mut delay, 0);
    assert_eq!(status, Status::AddressError);
}

// ══════════════════════════════════════════════════════════
// 2. Interleaving
// ══════════════════════════════════════════════════════════

/// Stripes alternate between controllers:
/// `index = ((addr - base) / stripe) % controllers`.
#[test]
fn interleave_index_alternates() {
    let noc = NocConfig {
        interleave_length: 4096,
        ram_base_address: RAM_BASE,
        ram_last_address: RAM_BASE + RAM_SIZE,
        ..NocConfig::default()
    };
    let sys = split_memory_platform(noc);
    let ic = &sys.interconnect;

    assert_eq!(ic.controller_index(RAM_BASE, 8), Ok(0));
    assert_eq!(ic.controller_index(RAM_BASE + 4096, 8), Ok(1));
    assert_eq!(ic.controller_index(RAM_BASE + 8192, 8), Ok(0));
    assert_eq!(ic.controller_index(RAM_BASE + 3 * 4096 + 17, 8), Ok(1));
}

// ══════════════════════════════════════════════════════════
// 3. Fabric latency
// ══════════════════════════════════════════════════════════

/// Without a mesh, the fixed fabric latency is billed on downstream
/// traversals only: a miss pays it, a hit never reaches the fabric.
#[test]
fn fixed_latency_applies_downstream() {
    let noc = NocConfig {
        latency: 7,
        ..NocConfig::default()
    };
    let mut sys = split_memory_platform(noc);
    let mut buf = [0u8; 4];

    let mut miss_delay = 0;
    assert_eq!(sys.read(CPU, RAM_BASE, &mut buf, &mut miss_delay, 0), Status::Ok);
    let mut hit_delay = 0;
    assert_eq!(sys.read(CPU, RAM_BASE, &mut buf, &mut hit_delay, 1), Status::Ok);

    assert_eq!(miss_delay - hit_delay, 7 + harness::MEM_LATENCY);
    assert_eq!(hit_delay, harness::L1_LATENCY);
}
