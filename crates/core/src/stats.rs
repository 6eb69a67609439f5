//! Statistics collection and reporting.
//!
//! This module tracks the performance counters of the memory core. It provides:
//! 1. **Cache counters:** Hits, misses, reads, writes, write-backs, invalidations,
//!    evictions, and one counter per coherence command kind.
//! 2. **Fabric counters:** Total distance, latency, and packet counts, with
//!    per-router and per-initiator breakdowns.
//!
//! Counters are plain strongly-typed fields bumped on the hot path;
//! serialization to the reporting stream happens only at report time.
//! Units are bytes and nanoseconds.

use std::collections::BTreeMap;

use crate::common::NodeId;
use crate::config::InclusionPolicy;

/// Per-cache access counters.
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    /// Accesses that missed.
    pub misses: u64,
    /// Accesses that hit.
    pub hits: u64,
    /// Read accesses serviced.
    pub reads: u64,
    /// Write accesses serviced.
    pub writes: u64,
    /// Dirty victim lines forwarded to the next level.
    pub write_backs: u64,
    /// Invalidations that found a valid line.
    pub invals: u64,
    /// Invalidation requests received.
    pub total_invals: u64,
    /// Back-invalidations broadcast to upper sharers.
    pub back_invals: u64,
    /// Evictions received from a higher exclusive cache.
    pub evictions: u64,
    /// Clean victim lines pushed to an exclusive lower cache.
    pub evict_backs: u64,
    /// Lines re-read from upper caches on behalf of the home.
    pub read_backs: u64,
    /// PutS commands serviced.
    pub put_s: u64,
    /// PutM commands serviced.
    pub put_m: u64,
    /// PutI commands serviced.
    pub put_i: u64,
    /// GetS commands serviced.
    pub get_s: u64,
    /// GetM commands serviced.
    pub get_m: u64,
    /// FwdGetS commands serviced.
    pub fwd_get_s: u64,
    /// FwdGetM commands serviced.
    pub fwd_get_m: u64,
}

impl CacheStats {
    /// Total accesses counted for the miss rate.
    pub fn accesses(&self) -> u64 {
        self.misses + self.hits + self.invals + self.evictions
    }

    /// Miss rate over [`Self::accesses`], or 0 when idle.
    pub fn miss_rate(&self) -> f64 {
        let total = self.accesses();
        if total > 0 {
            self.misses as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Prints this cache's counters to the reporting stream.
    ///
    /// Inclusion-dependent counters are shown only when the corresponding
    /// policy makes them meaningful.
    pub fn print(&self, name: &str, lower: InclusionPolicy) {
        println!("{name}: MissCount {} , HitCount {}", self.misses, self.hits);
        print!(
            "{name}: total accesses {} , MissRate {:.4}",
            self.accesses(),
            self.miss_rate()
        );
        print!(
            " writes: {} reads: {} WriteBacks: {}",
            self.writes, self.reads, self.write_backs
        );
        if lower == InclusionPolicy::Inclusive {
            print!(
                " total invalidations: {} real invalidations: {}",
                self.total_invals, self.invals
            );
        }
        if lower == InclusionPolicy::Exclusive {
            print!(" evictions: {}", self.evictions);
        }
        println!();
        println!(
            "{name}: GetS {} GetM {} FwdGetS {} FwdGetM {} PutS {} PutM {} PutI {}",
            self.get_s, self.get_m, self.fwd_get_s, self.fwd_get_m, self.put_s, self.put_m,
            self.put_i
        );
    }
}

/// Per-initiator traffic totals on the fabric.
#[derive(Clone, Debug, Default)]
pub struct InitiatorStats {
    /// Attachment router of the initiator, as "x_y".
    pub position: String,
    /// Packets injected.
    pub packets: u64,
    /// Sum of Manhattan distances traveled.
    pub distance: u64,
    /// Sum of per-packet latencies in nanoseconds.
    pub latency: u64,
}

/// Fabric and NoC counters.
#[derive(Clone, Debug, Default)]
pub struct NocStats {
    /// Sum of Manhattan distances over all packets (flits included).
    pub total_distance: u64,
    /// Sum of per-packet latencies in nanoseconds.
    pub total_latency: u64,
    /// Packets (flits in contention mode) observed.
    pub packets: u64,
    /// Contention wait accumulated at each router, row-major, in nanoseconds.
    pub router_latency: Vec<u64>,
    /// Packets that traversed each router, row-major.
    pub router_packets: Vec<u64>,
    /// Traffic totals per initiator (kept only when enabled).
    pub per_initiator: BTreeMap<NodeId, InitiatorStats>,
}

impl NocStats {
    /// Creates counters sized for an `x` by `y` mesh.
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            router_latency: vec![0; (x * y) as usize],
            router_packets: vec![0; (x * y) as usize],
            ..Self::default()
        }
    }

    /// Prints the fabric counters to the reporting stream.
    pub fn print(&self, name: &str, mesh_x: u32) {
        println!(
            "{name}: total distance {} , total latency {} ns , packets {}",
            self.total_distance, self.total_latency, self.packets
        );
        for (i, (lat, pkts)) in self
            .router_latency
            .iter()
            .zip(self.router_packets.iter())
            .enumerate()
        {
            if *pkts > 0 {
                let x = i as u32 % mesh_x;
                let y = i as u32 / mesh_x;
                println!("{name}: router ({x},{y}): packets {pkts} , wait {lat} ns");
            }
        }
        for (id, init) in &self.per_initiator {
            println!(
                "{name}: initiator {id} at ({}) : packets {} , distance {} , latency {} ns",
                init.position, init.packets, init.distance, init.latency
            );
        }
    }
}
