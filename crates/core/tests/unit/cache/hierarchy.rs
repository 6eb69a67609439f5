//! Three-level coherent hierarchy: private L1s over a shared private L2
//! over the home.
//!
//! The L2 keeps its own directory over the L1s, so hits at the L2 must not
//! descend to the home, and revocations from the home must be relayed to
//! whichever L1s actually hold the line.

use vpsim_core::MemorySystem;
use vpsim_core::cache::line::CoherenceState;
use vpsim_core::common::{NodeId, Status};
use vpsim_core::config::{CacheLevel, NocConfig, PlatformConfig};

use crate::common::harness::{self, RAM_BASE};

const ADDR: u64 = RAM_BASE + 0x400;

fn three_level() -> MemorySystem {
    let mut l1_0 = harness::l1("l1_0", 0);
    l1_0.below = Some("l2".to_string());
    let mut l1_1 = harness::l1("l1_1", 1);
    l1_1.below = Some("l2".to_string());
    let mut l2 = harness::l1("l2", 4);
    l2.level = CacheLevel::L2;
    l2.size = 4096;
    l2.associativity = 2;
    l2.latency = 4;
    let config = PlatformConfig {
        coherent: true,
        caches: vec![l1_0, l1_1, l2, harness::llc(8)],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    MemorySystem::build(&config).unwrap()
}

fn core(id: u32) -> NodeId {
    NodeId::new(id)
}

/// A second core's read of a line the L2 already holds is absorbed there;
/// the home sees one GetS, not two.
#[test]
fn l2_absorbs_second_reader() {
    let mut sys = three_level();
    let mut buf = [0u8; 8];
    let mut delay = 0;

    assert_eq!(sys.read(core(0), ADDR, &mut buf, &mut delay, 0), Status::Ok);
    assert_eq!(sys.read(core(1), ADDR, &mut buf, &mut delay, 1), Status::Ok);

    assert_eq!(sys.cache_stats("llc").unwrap().get_s, 1);
    assert_eq!(sys.cache_stats("l2").unwrap().get_s, 2);

    let entry = sys.cache("l2").unwrap().directory().get(ADDR).unwrap();
    assert_eq!(entry.state, CoherenceState::Shared);
    assert_eq!(
        entry.sharers.iter().copied().collect::<Vec<_>>(),
        vec![core(0), core(1)]
    );
}

/// A write through the L2 invalidates the sibling L1 via the local
/// directory, without bothering the other cores through the fabric.
#[test]
fn l2_invalidates_sibling_on_write() {
    let mut sys = three_level();
    let mut buf = [0u8; 8];
    let mut delay = 0;

    assert_eq!(sys.read(core(0), ADDR, &mut buf, &mut delay, 0), Status::Ok);
    assert_eq!(sys.read(core(1), ADDR, &mut buf, &mut delay, 1), Status::Ok);
    assert_eq!(sys.write(core(1), ADDR, &[0x9C; 8], &mut delay, 2), Status::Ok);

    assert_eq!(sys.cache("l1_0").unwrap().probe(ADDR), None);
    assert_eq!(
        sys.cache("l1_1").unwrap().probe(ADDR),
        Some(CoherenceState::Modified)
    );
    let entry = sys.cache("l2").unwrap().directory().get(ADDR).unwrap();
    assert_eq!((entry.state, entry.owner), (CoherenceState::Modified, core(1)));
    assert_eq!(sys.cache_stats("l1_0").unwrap().put_i, 1);
}

/// Data written by one core reaches its sibling through the L2's forward
/// path.
#[test]
fn sibling_round_trip_through_l2() {
    let mut sys = three_level();
    let mut buf = [0u8; 8];
    let mut delay = 0;

    assert_eq!(sys.read(core(0), ADDR, &mut buf, &mut delay, 0), Status::Ok);
    assert_eq!(sys.read(core(1), ADDR, &mut buf, &mut delay, 1), Status::Ok);
    let value = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    assert_eq!(sys.write(core(1), ADDR, &value, &mut delay, 2), Status::Ok);

    let mut back = [0u8; 8];
    assert_eq!(sys.read(core(0), ADDR, &mut back, &mut delay, 3), Status::Ok);
    assert_eq!(back, value);
    assert_eq!(sys.cache_stats("l1_1").unwrap().fwd_get_s, 1);
}
