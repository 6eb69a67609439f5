//! Device-initiated DMA reads and writes.
//!
//! Devices bypass the cache hierarchy and talk to memory through the
//! fabric. Reads pay the reply path (memory toward the device), writes the
//! forward path, and multi-flit transfers report the slowest flit.

use vpsim_core::MemorySystem;
use vpsim_core::common::{NodeId, Status};
use vpsim_core::config::{AddressRange, DeviceConfig, NocConfig, PlatformConfig, Position};

use crate::common::harness::{self, MEM_LATENCY, RAM_BASE, RAM_SIZE};

const DMA: NodeId = NodeId(40);

fn device_platform(noc: NocConfig) -> MemorySystem {
    let mut cache = harness::cache_template("dcache", 0);
    cache.is_home = true;
    cache.range = Some(AddressRange {
        base: RAM_BASE,
        size: RAM_SIZE,
    });
    let mut mem = harness::ram("ram0");
    mem.position = Position { x: 1, y: 1 };
    let config = PlatformConfig {
        coherent: false,
        caches: vec![cache],
        memories: vec![mem],
        devices: vec![DeviceConfig {
            name: "dma0".to_string(),
            id: DMA.val(),
            position: Position { x: 0, y: 0 },
        }],
        noc,
    };
    MemorySystem::build(&config).unwrap()
}

#[test]
fn write_then_read_without_mesh() {
    let mut sys = device_platform(NocConfig::default());
    let mut delay = 0;

    let data: Vec<u8> = (0..32u8).collect();
    assert_eq!(
        sys.device_write(DMA, RAM_BASE + 256, &data, &mut delay, 0),
        Status::Ok
    );
    // Straight to the backing store, no cache involved.
    let mut held = vec![0u8; 32];
    sys.memory_mut("ram0").unwrap().peek(RAM_BASE + 256, &mut held);
    assert_eq!(held, data);

    let mut back = vec![0u8; 32];
    let mut read_delay = 0;
    assert_eq!(
        sys.device_read(DMA, RAM_BASE + 256, &mut back, &mut read_delay, 1),
        Status::Ok
    );
    assert_eq!(back, data);
    assert!(read_delay >= MEM_LATENCY);
}

#[test]
fn mesh_transfers_decompose_into_flits() {
    let noc = NocConfig {
        is_mesh: true,
        mesh_x: 2,
        mesh_y: 2,
        router_latency: 1,
        link_latency: 1,
        with_contention: true,
        contention_interval: 1000,
        flit_size: 8,
        memory_word_length: 8,
        ..NocConfig::default()
    };
    let mut sys = device_platform(noc);
    let mut delay = 0;

    // 32 bytes over 8-byte flits: four flits on the forward path.
    let data: Vec<u8> = (100..132u8).collect();
    assert_eq!(
        sys.device_write(DMA, RAM_BASE, &data, &mut delay, 0),
        Status::Ok
    );
    let mut held = vec![0u8; 32];
    sys.memory_mut("ram0").unwrap().peek(RAM_BASE, &mut held);
    assert_eq!(held, data);

    let mut back = vec![0u8; 32];
    let mut read_delay = 0;
    assert_eq!(
        sys.device_read(DMA, RAM_BASE, &mut back, &mut read_delay, 10_000),
        Status::Ok
    );
    assert_eq!(back, data);
    // Every flit paid at least one memory access on its word.
    assert!(read_delay >= MEM_LATENCY);
}
