//! Buffered-contention window behavior.
//!
//! The model is driven directly: `observe` admits transfers, a timestamp
//! outside the open window (or `finalize_window`) closes it, and the window
//! sums fold into the totals.

use vpsim_core::NodeId;
use vpsim_core::config::NocConfig;
use vpsim_core::noc::MeshNoc;
use vpsim_core::noc::route::MeshPos;

fn noc(router: u64, link: u64, interval: u64, vc: u32, buffers: u32) -> MeshNoc {
    let config = NocConfig {
        is_mesh: true,
        mesh_x: 3,
        mesh_y: 3,
        router_latency: router,
        link_latency: link,
        with_contention: true,
        contention_interval: interval,
        virtual_channels: vc,
        buffer_size: buffers,
        ..NocConfig::default()
    };
    MeshNoc::new(&config).unwrap()
}

// ══════════════════════════════════════════════════════════
// 1. No-contention sub-mode
// ══════════════════════════════════════════════════════════

/// Three hops: `3 * router + 4 * link`.
#[test]
fn distance_latency_formula() {
    let config = NocConfig {
        is_mesh: true,
        mesh_x: 3,
        mesh_y: 3,
        router_latency: 2,
        link_latency: 3,
        ..NocConfig::default()
    };
    let mut mesh = MeshNoc::new(&config).unwrap();
    let latency = mesh.no_contention(
        MeshPos::new(0, 0),
        &[MeshPos::new(2, 1)],
        NodeId::new(0),
    );
    assert_eq!(latency, 3 * 2 + 4 * 3);
    assert_eq!(mesh.stats.total_distance, 3);
    assert_eq!(mesh.stats.packets, 1);
}

/// Broadcast latency is governed by the farthest target.
#[test]
fn broadcast_uses_max_distance() {
    let config = NocConfig {
        is_mesh: true,
        mesh_x: 3,
        mesh_y: 3,
        router_latency: 1,
        link_latency: 1,
        ..NocConfig::default()
    };
    let mut mesh = MeshNoc::new(&config).unwrap();
    let latency = mesh.no_contention(
        MeshPos::new(0, 0),
        &[MeshPos::new(1, 0), MeshPos::new(2, 2)],
        NodeId::new(0),
    );
    // Farthest target at distance 4.
    assert_eq!(latency, 4 + 5);
}

// ══════════════════════════════════════════════════════════
// 2. Contention windows
// ══════════════════════════════════════════════════════════

/// Two flits on the same route: the first waits nowhere, the second queues
/// once at the shared entry port and inherits serialization afterwards.
#[test]
fn two_flits_same_route() {
    // router 1 ns, link 1 ns, interval 2 ns, one virtual channel.
    let mut mesh = noc(1, 1, 2, 1, 1);
    mesh.observe(0, MeshPos::new(0, 0), &[MeshPos::new(1, 0)], 2);
    mesh.finalize_window();

    // Flit 1: 1 hop, no wait: 1 * 1 + 2 * 1 = 3.
    // Flit 2 at (0,0,E): wait = max(0, 0 + 1 + 1 - 2/(2/1)) = 1; at the
    // destination it is serialized behind the same flit: no further wait.
    // Latency 3 + 1 = 4; window sum 7.
    assert_eq!(mesh.stats.packets, 2);
    assert_eq!(mesh.stats.total_latency, 7);
    assert_eq!(mesh.last_packet_latency(), 4);
    // Both flits crossed one link: distance 1 each.
    assert_eq!(mesh.stats.total_distance, 2);
}

/// A timestamp past the window closes it and opens a new one; totals are
/// the sum over all finalized windows.
#[test]
fn window_rollover_accumulates() {
    let mut mesh = noc(1, 1, 10, 1, 1);

    // Window 1: one flit, latency 3 (one hop).
    mesh.observe(0, MeshPos::new(0, 0), &[MeshPos::new(1, 0)], 1);
    assert_eq!(mesh.stats.packets, 0, "window still open");

    // Arrives past interval_end = 10: window 1 is finalized.
    mesh.observe(11, MeshPos::new(0, 0), &[MeshPos::new(1, 0)], 1);
    assert_eq!(mesh.stats.packets, 1);
    assert_eq!(mesh.stats.total_latency, 3);

    mesh.finalize_window();
    assert_eq!(mesh.stats.packets, 2);
    assert_eq!(mesh.stats.total_latency, 6);
}

/// Time going backwards also closes the window.
#[test]
fn backwards_time_closes_window() {
    let mut mesh = noc(1, 1, 10, 1, 1);
    mesh.observe(100, MeshPos::new(0, 0), &[MeshPos::new(1, 0)], 1);
    mesh.observe(5, MeshPos::new(0, 0), &[MeshPos::new(1, 0)], 1);
    assert_eq!(mesh.stats.packets, 1);
    mesh.finalize_window();
    assert_eq!(mesh.stats.packets, 2);
}

/// With enough virtual channels the queue share grows and the wait clamps
/// at zero.
#[test]
fn virtual_channels_absorb_contention() {
    // interval 2, vc 2: share = max(1, 2/2) = 1, wait = max(0, 2 - 2) = 0.
    let mut mesh = noc(1, 1, 2, 2, 1);
    mesh.observe(0, MeshPos::new(0, 0), &[MeshPos::new(1, 0)], 2);
    mesh.finalize_window();
    assert_eq!(mesh.stats.total_latency, 6, "both flits travel wait-free");
}

/// Per-router counters see every admitted flit.
#[test]
fn router_counters_track_traffic() {
    let mut mesh = noc(1, 1, 100, 1, 1);
    mesh.observe(0, MeshPos::new(0, 0), &[MeshPos::new(2, 0)], 1);
    mesh.finalize_window();
    // Route (0,0,E) (1,0,E) (2,0,L): routers 0, 1, 2 of row 0.
    assert_eq!(mesh.stats.router_packets[0], 1);
    assert_eq!(mesh.stats.router_packets[1], 1);
    assert_eq!(mesh.stats.router_packets[2], 1);
    assert_eq!(mesh.stats.router_packets[3], 0);
}
