//! Platform elaboration and the top-level `MemorySystem`.
//!
//! The `MemorySystem` owns every component of the memory hierarchy — cache
//! controllers, memory targets, and the interconnect — and realizes the
//! synchronous, blocking transport chain: each call descends depth-first
//! through caches and fabric on the calling context's stack and runs to
//! completion. Components live in slot arenas; a component is taken out of
//! its slot while its `transport` runs, so re-entering the same component is
//! impossible by construction (and aborts as the protocol violation it is).

/// Platform assembly from configuration.
pub mod builder;

/// Memory-mapped backing stores and latency models.
pub mod memory;

use crate::cache::CacheController;
use crate::common::{Command, NodeId, Payload, Status};
use crate::interconnect::{CoherentInterconnect, Deliver};
use crate::stats::CacheStats;
use memory::MemoryTarget;

/// The assembled platform: caches, memories, and the routing fabric.
#[derive(Debug)]
pub struct MemorySystem {
    caches: Vec<Option<CacheController>>,
    memories: Vec<MemoryTarget>,
    /// The routing fabric, including the optional mesh timing model.
    pub interconnect: CoherentInterconnect,
    /// Initiator id to first-level cache arena index.
    initiators: Vec<(NodeId, usize)>,
}

impl MemorySystem {
    /// Services a payload arriving at the fabric from a cache.
    ///
    /// Applies fabric/NoC timing, resolves the target port, and delivers.
    /// Address-range misses return (and record) `AddressError` without
    /// forwarding.
    pub fn route(&mut self, payload: &mut Payload, delay: &mut u64) -> Status {
        match self.interconnect.prepare(payload, delay) {
            Err(status) => {
                payload.status = status;
                status
            }
            Ok(Deliver::Memory(idx)) => self.memories[idx].transport(payload, delay),
            Ok(Deliver::Home(idx)) => self.transport_cache(idx, payload, delay),
            Ok(Deliver::Caches(idxs)) => {
                let mut status = Status::Ok;
                for idx in idxs {
                    status = self.transport_cache(idx, payload, delay);
                }
                status
            }
        }
    }

    /// Runs one cache's `transport`, taking it out of its slot for the
    /// duration so the chain below it can reach every other component.
    ///
    /// # Panics
    ///
    /// Re-entering a cache already on the chain is a protocol violation.
    pub fn transport_cache(
        &mut self,
        idx: usize,
        payload: &mut Payload,
        delay: &mut u64,
    ) -> Status {
        let mut cache = self.caches[idx]
            .take()
            .unwrap_or_else(|| panic!("transport re-entered cache #{idx}"));
        let status = cache.transport(self, payload, delay);
        self.caches[idx] = Some(cache);
        status
    }

    // ── Initiator-facing entry points ──────────────────────────────────

    /// Reads `buf.len()` bytes at `addr` through `initiator`'s first-level
    /// cache, filling `buf` when the path tracks data.
    pub fn read(
        &mut self,
        initiator: NodeId,
        addr: u64,
        buf: &mut [u8],
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        let idx = self.initiator_cache(initiator);
        let mut payload = Payload::new(Command::Read, addr, buf.len())
            .with_data(vec![0; buf.len()])
            .from_node(initiator)
            .at_time(ts);
        let status = self.transport_cache(idx, &mut payload, delay);
        if let Some(data) = payload.data {
            buf.copy_from_slice(&data);
        }
        status
    }

    /// Writes `data` at `addr` through `initiator`'s first-level cache.
    pub fn write(
        &mut self,
        initiator: NodeId,
        addr: u64,
        data: &[u8],
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        let idx = self.initiator_cache(initiator);
        let mut payload = Payload::new(Command::Write, addr, data.len())
            .with_data(data.to_vec())
            .from_node(initiator)
            .at_time(ts);
        self.transport_cache(idx, &mut payload, delay)
    }

    /// Arena index of the first-level cache serving `initiator`.
    ///
    /// # Panics
    ///
    /// An unknown initiator is a wiring fault.
    fn initiator_cache(&self, initiator: NodeId) -> usize {
        self.initiators
            .iter()
            .find(|&&(id, _)| id == initiator)
            .map_or_else(
                || panic!("no first-level cache for initiator {initiator}"),
                |&(_, idx)| idx,
            )
    }

    // ── Device-facing entry points (DMA) ───────────────────────────────

    /// Device-initiated read: the reply path (memory toward the device) is
    /// what costs time, per word and per flit; the effective delay is the
    /// maximum across component flits.
    pub fn device_read(
        &mut self,
        device: NodeId,
        addr: u64,
        buf: &mut [u8],
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        if self.interconnect.mesh.is_none() {
            let status = self.device_memory_access(Command::Read, addr, Some(buf), None, delay);
            *delay += self.interconnect_latency();
            return status;
        }
        let device_pos = self.interconnect.device_pos(device);
        let word = self.interconnect.word_length.max(1) as usize;
        let flits_per_word = (word as u32).div_ceil(self.interconnect.flit_size.max(1)).max(1);
        let words = buf.len().div_ceil(word);

        let mut status = Status::Ok;
        let mut mem_delay = *delay;
        let mut max_delay = *delay;
        for w in 0..words {
            let word_addr = addr + (w * word) as u64;
            let span = word.min(buf.len() - w * word);
            let slice = &mut buf[w * word..w * word + span];
            status = self.device_memory_access(
                Command::Read,
                word_addr,
                Some(slice),
                None,
                &mut mem_delay,
            );
            if status != Status::Ok {
                return status;
            }
            let arrival = mem_delay;
            for _ in 0..flits_per_word {
                let flit_ts = ts + arrival as i64;
                let src = match self.interconnect.memory_pos(word_addr, span) {
                    Ok(pos) => pos,
                    Err(st) => return st,
                };
                if let Some(mesh) = &mut self.interconnect.mesh {
                    mesh.observe(flit_ts, src, &[device_pos], 1);
                    let tmp = mem_delay + mesh.last_packet_latency();
                    max_delay = max_delay.max(tmp);
                }
            }
        }
        *delay = max_delay;
        status
    }

    /// Device-initiated write: decomposes into flits on the forward path;
    /// the effective delay is the maximum across component flits.
    pub fn device_write(
        &mut self,
        device: NodeId,
        addr: u64,
        data: &[u8],
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        if self.interconnect.mesh.is_none() {
            *delay += self.interconnect_latency();
            return self.device_memory_access(Command::Write, addr, None, Some(data), delay);
        }
        let device_pos = self.interconnect.device_pos(device);
        let flit = self.interconnect.flit_size.max(1) as usize;
        let flits = data.len().div_ceil(flit);

        let mut status = Status::Ok;
        let arrival = *delay;
        let mut max_delay = *delay;
        for f in 0..flits {
            let flit_addr = addr + (f * flit) as u64;
            let span = flit.min(data.len() - f * flit);
            let slice = &data[f * flit..f * flit + span];
            let flit_ts = ts + arrival as i64;
            let dst = match self.interconnect.memory_pos(flit_addr, span) {
                Ok(pos) => pos,
                Err(st) => return st,
            };
            let mut mem_delay = arrival;
            if let Some(mesh) = &mut self.interconnect.mesh {
                mesh.observe(flit_ts, device_pos, &[dst], 1);
                mem_delay += mesh.last_packet_latency();
            }
            status = self.device_memory_access(
                Command::Write,
                flit_addr,
                None,
                Some(slice),
                &mut mem_delay,
            );
            if status != Status::Ok {
                return status;
            }
            max_delay = max_delay.max(mem_delay);
        }
        *delay = max_delay;
        status
    }

    /// One leaf access to the memory target covering `addr`.
    fn device_memory_access(
        &mut self,
        command: Command,
        addr: u64,
        read_into: Option<&mut [u8]>,
        write_from: Option<&[u8]>,
        delay: &mut u64,
    ) -> Status {
        let len = read_into
            .as_deref()
            .map_or_else(|| write_from.map_or(0, <[u8]>::len), <[u8]>::len);
        let mut payload = Payload::new(command, addr, len);
        payload.data = match (&read_into, write_from) {
            (_, Some(src)) => Some(src.to_vec()),
            (Some(_), _) => Some(vec![0; len]),
            _ => None,
        };
        let status = match self.route_to_memory(&mut payload, delay) {
            Ok(st) => st,
            Err(st) => st,
        };
        if let (Some(dst), Some(data)) = (read_into, payload.data.as_deref()) {
            dst.copy_from_slice(&data[..dst.len()]);
        }
        status
    }

    /// Delivers a payload straight to its memory-mapped output.
    fn route_to_memory(
        &mut self,
        payload: &mut Payload,
        delay: &mut u64,
    ) -> Result<Status, Status> {
        let idx = self.interconnect.memory_endpoint(payload.address, payload.length)?;
        Ok(self.memories[idx].transport(payload, delay))
    }

    fn interconnect_latency(&self) -> u64 {
        self.interconnect.fixed_latency()
    }

    // ── Introspection and reporting ────────────────────────────────────

    /// The cache named `name`, for probes and statistics.
    pub fn cache(&self, name: &str) -> Option<&CacheController> {
        self.caches
            .iter()
            .flatten()
            .find(|c| c.name() == name)
    }

    /// The counters of the cache named `name`.
    pub fn cache_stats(&self, name: &str) -> Option<&CacheStats> {
        self.cache(name).map(|c| &c.stats)
    }

    /// The memory target named `name`, for backdoor access in loaders and
    /// tests.
    pub fn memory_mut(&mut self, name: &str) -> Option<&mut MemoryTarget> {
        self.memories.iter_mut().find(|m| m.name() == name)
    }

    /// Registers an eviction observer on the cache named `name`.
    pub fn set_eviction_observer(
        &mut self,
        name: &str,
        observer: Box<dyn crate::cache::EvictionObserver>,
    ) {
        if let Some(cache) = self
            .caches
            .iter_mut()
            .flatten()
            .find(|c| c.name() == name)
        {
            cache.set_eviction_observer(observer);
        }
    }

    /// Closes any open contention window and prints every component's
    /// counters to the reporting stream.
    pub fn report(&mut self) {
        self.interconnect.flush();
        for cache in self.caches.iter().flatten() {
            cache.stats.print(cache.name(), cache.inclusion_lower());
        }
        self.interconnect.print_statistics("fabric");
    }
}
