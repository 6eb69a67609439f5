//! Mesh NoC timing model.
//!
//! Computes per-packet latency on top of the interconnect's routing
//! decisions. Two sub-modes exist:
//! 1. **No contention:** pure XY distance — `dist * router + (dist + 1) * link`.
//! 2. **With contention:** packets arriving within a contention interval are
//!    aggregated; when the window closes, each packet's waiting time is
//!    derived from its position in every output buffer it traverses,
//!    including serialization behind a repeated predecessor and head-of-line
//!    blocking through full downstream buffers.
//!
//! All times are integer nanoseconds end to end.

/// XY routing and mesh coordinates.
pub mod route;

/// Router output buffers for the contention model.
pub mod router;

use tracing::debug;

use crate::common::{ConfigError, NodeId};
use crate::config::NocConfig;
use crate::stats::{InitiatorStats, NocStats};
use route::{Hop, MeshPos, Port, Route, manhattan, xy_route};
use router::MeshGrid;

/// One packet admitted to the current contention window.
#[derive(Clone, Debug)]
struct Packet {
    route: Route,
}

/// The mesh timing model. Owned by the interconnect; consulted once per
/// forwarded transaction.
#[derive(Debug)]
pub struct MeshNoc {
    mesh_x: u32,
    mesh_y: u32,
    router_latency: u64,
    link_latency: u64,
    with_contention: bool,
    contention_interval: u64,
    virtual_channels: u32,
    buffer_size: u32,
    stats_per_initiator: bool,

    grid: MeshGrid,
    /// Packets of the current window; packet id `n` lives at index `n - 1`.
    packets: Vec<Packet>,
    total_flits: u64,
    interval_start: i64,
    interval_end: i64,
    /// Latency of the last packet whose window was finalized; the
    /// contention-mode contribution to the accumulated delay.
    last_packet_latency: u64,

    /// Fabric counters.
    pub stats: NocStats,
}

impl MeshNoc {
    /// Builds the mesh model from the NoC configuration.
    ///
    /// # Errors
    ///
    /// Rejects zero mesh dimensions, zero virtual channels, and zero buffer
    /// depth.
    pub fn new(config: &NocConfig) -> Result<Self, ConfigError> {
        let bad = |reason: &str| ConfigError::BadNocParameter {
            reason: reason.to_string(),
        };
        if config.mesh_x == 0 || config.mesh_y == 0 {
            return Err(bad("mesh dimensions must be at least 1x1"));
        }
        if config.virtual_channels == 0 {
            return Err(bad("the number of virtual channels must be >= 1"));
        }
        if config.buffer_size == 0 {
            return Err(bad("buffer depth must be >= 1 flit"));
        }
        Ok(Self {
            mesh_x: config.mesh_x,
            mesh_y: config.mesh_y,
            router_latency: config.router_latency,
            link_latency: config.link_latency,
            with_contention: config.with_contention,
            contention_interval: config.contention_interval,
            virtual_channels: config.virtual_channels,
            buffer_size: config.buffer_size,
            stats_per_initiator: config.stats_per_initiator,
            grid: MeshGrid::new(config.mesh_x, config.mesh_y),
            packets: Vec::new(),
            total_flits: 0,
            interval_start: 0,
            interval_end: 0,
            last_packet_latency: 0,
            stats: NocStats::new(config.mesh_x, config.mesh_y),
        })
    }

    /// Mesh width in routers.
    pub fn mesh_x(&self) -> u32 {
        self.mesh_x
    }

    /// Mesh height in routers.
    pub fn mesh_y(&self) -> u32 {
        self.mesh_y
    }

    /// Whether the buffered-contention sub-mode is active.
    pub fn with_contention(&self) -> bool {
        self.with_contention
    }

    /// Latency of the last finalized packet (contention-mode delay share).
    pub fn last_packet_latency(&self) -> u64 {
        self.last_packet_latency
    }

    /// Slots a port drains before its head can stall on the next router:
    /// `buffer_size * virtual_channels`.
    pub fn effective_buffer_depth(&self) -> usize {
        (self.buffer_size * self.virtual_channels) as usize
    }

    /// Contention-free latency of one transfer from `src` toward `dests`.
    ///
    /// For a broadcast the largest Manhattan distance wins. Counters are
    /// updated; per-initiator totals when enabled.
    pub fn no_contention(
        &mut self,
        src: MeshPos,
        dests: &[MeshPos],
        initiator: NodeId,
    ) -> u64 {
        let dist = dests.iter().map(|&d| manhattan(src, d)).max().unwrap_or(0);
        let latency = dist * self.router_latency + (dist + 1) * self.link_latency;
        self.stats.total_distance += dist;
        self.stats.total_latency += latency;
        self.stats.packets += 1;
        if self.stats_per_initiator && !initiator.is_none() {
            let entry = self
                .stats
                .per_initiator
                .entry(initiator)
                .or_insert_with(InitiatorStats::default);
            entry.position = format!("{}_{}", src.x, src.y);
            entry.packets += 1;
            entry.distance += dist;
            entry.latency += latency;
        }
        latency
    }

    /// Feeds one transfer into the contention model.
    ///
    /// A packet whose timestamp falls outside the open window first closes
    /// it: the window's waiting times are computed, its latencies fold into
    /// the totals, and all windowed state restarts with this packet.
    pub fn observe(&mut self, ts: i64, src: MeshPos, dests: &[MeshPos], flits: u32) {
        if self.total_flits == 0 {
            self.interval_start = ts;
            self.interval_end = ts + self.contention_interval as i64;
        } else if ts > self.interval_end || ts < self.interval_start {
            // A new interval begins; time going backwards also closes the
            // window.
            self.finalize_window();
            self.interval_start = ts;
            self.interval_end = ts + self.contention_interval as i64;
        }
        for &dst in dests {
            self.admit(src, dst, flits);
        }
    }

    /// Routes one transfer and records each flit in every output buffer on
    /// its path, in arrival order.
    fn admit(&mut self, src: MeshPos, dst: MeshPos, flits: u32) {
        let path = xy_route(src, dst);
        let hops = (path.len() - 1) as u64;
        for hop in &path {
            let flat = self.grid.flat_index(hop.x, hop.y);
            self.stats.router_packets[flat] += u64::from(flits);
            let buf = self
                .grid
                .router_mut(MeshPos::new(hop.x, hop.y))
                .port_mut(hop.port);
            for f in 0..u64::from(flits) {
                buf.push(self.total_flits + 1 + f);
            }
        }
        for _ in 0..flits {
            self.packets.push(Packet { route: path.clone() });
        }
        self.total_flits += u64::from(flits);
        self.stats.total_distance += u64::from(flits) * hops;
    }

    /// Closes the current window: computes every queued packet's latency,
    /// folds the sum into the totals, and clears the windowed state.
    pub fn finalize_window(&mut self) {
        if self.packets.is_empty() {
            return;
        }
        let window_sum = self.compute_packet_latency();
        self.stats.total_latency += window_sum;
        self.stats.packets += self.packets.len() as u64;
        debug!(
            packets = self.packets.len(),
            window_sum, "contention window closed"
        );
        self.packets.clear();
        self.grid.clear();
        self.total_flits = 0;
    }

    /// Per-window waiting-time resolution.
    ///
    /// Walks every packet's route in arrival order. At each output buffer
    /// the packet either leads (no wait), is serialized behind the same
    /// predecessor it already queued behind (no extra wait unless the
    /// predecessor's own wait grew), or converges with a new predecessor
    /// (queue wait). A predecessor stuck deep in its next router's buffer
    /// additionally stalls the head of this one.
    ///
    /// Returns the sum of packet latencies in the window and records the
    /// last one for the delay channel.
    fn compute_packet_latency(&mut self) -> u64 {
        let mut window_sum = 0;
        for i in 0..self.packets.len() {
            let pkt_id = (i + 1) as u64;
            let path = self.packets[i].route.clone();
            let mut prev_pkt: Option<u64> = None;
            let mut prev_wait = 0u64;
            let mut total_wait = 0u64;

            for (hop_idx, hop) in path.iter().enumerate() {
                let pos_here = MeshPos::new(hop.x, hop.y);
                let flat = self.grid.flat_index(hop.x, hop.y);
                let pos = self
                    .grid
                    .router(pos_here)
                    .port(hop.port)
                    .position(pkt_id)
                    .unwrap_or(0);
                if pos == 0 {
                    // Head of the buffer travels unimpeded.
                    self.grid
                        .router_mut(pos_here)
                        .port_mut(hop.port)
                        .set_wait(pos, 0);
                    continue;
                }
                let (ahead_id, ahead_wait) = self.grid.router(pos_here).port(hop.port).at(pos - 1);
                let wait = if Some(ahead_id) == prev_pkt {
                    // Already serialized behind this packet at an earlier
                    // convergence; pay only if its wait has grown since.
                    if ahead_wait == prev_wait { 0 } else { ahead_wait }
                } else {
                    // First convergence with this predecessor.
                    let queue_len = self.grid.router(pos_here).port(hop.port).len() as u64;
                    let w = self.queue_waiting_time(ahead_wait, queue_len);
                    prev_pkt = Some(ahead_id);
                    prev_wait = ahead_wait;
                    w
                };
                total_wait += wait;
                self.grid
                    .router_mut(pos_here)
                    .port_mut(hop.port)
                    .set_wait(pos, wait);
                self.stats.router_latency[flat] += wait;

                // Head-of-line blocking: if the packet ahead sits past the
                // effective buffer depth of its next output port, its stall
                // backs up into this one.
                if hop.port != Port::Local {
                    if let Some(extra) =
                        self.hol_wait(&path, hop_idx, hop, ahead_id)
                    {
                        total_wait += extra;
                        self.grid
                            .router_mut(pos_here)
                            .port_mut(hop.port)
                            .add_wait(pos, extra);
                        self.stats.router_latency[flat] += extra;
                    }
                }
            }

            let hops = (path.len() - 1) as u64;
            let latency = self.packet_latency(total_wait, hops);
            self.last_packet_latency = latency;
            window_sum += latency;
        }
        window_sum
    }

    /// Extra wait caused by head-of-line blocking at `hop`, if any.
    fn hol_wait(&self, path: &Route, hop_idx: usize, hop: &Hop, ahead_id: u64) -> Option<u64> {
        let ahead_route = &self.packets[(ahead_id - 1) as usize].route;
        let ahead_here = ahead_route.iter().position(|h| h == hop)?;
        let ahead_next = ahead_route.get(ahead_here + 1)?;
        let my_next = path.get(hop_idx + 1)?;
        if ahead_next == my_next {
            // Both continue through the same port; plain serialization.
            return None;
        }
        let next_buf = self
            .grid
            .router(MeshPos::new(ahead_next.x, ahead_next.y))
            .port(ahead_next.port);
        let ahead_pos = next_buf.position(ahead_id)?;
        let depth = self.effective_buffer_depth();
        if ahead_pos < depth {
            return None;
        }
        let slot = ahead_pos.saturating_sub(depth) + 1;
        Some(next_buf.at(slot).1)
    }

    /// Per-queue wait at a first-convergence point.
    ///
    /// The predecessor's wait plus one router and link traversal, minus the
    /// share of the interval this queue drains through its virtual
    /// channels; clamped at zero.
    fn queue_waiting_time(&self, ahead_wait: u64, queue_len: u64) -> u64 {
        let share = (queue_len / u64::from(self.virtual_channels)).max(1);
        let wt = ahead_wait as i64 + self.router_latency as i64 + self.link_latency as i64
            - (self.contention_interval / share) as i64;
        wt.max(0) as u64
    }

    /// Final packet latency: traversal plus accumulated wait.
    fn packet_latency(&self, total_wait: u64, hops: u64) -> u64 {
        hops * self.router_latency + (hops + 1) * self.link_latency + total_wait
    }
}
