//! Coherent interconnect: routing among caches, homes, and memory.
//!
//! The interconnect holds three port tables — cache outputs addressed by
//! node id, home outputs addressed by id plus address range, and
//! memory-mapped outputs addressed by range — and classifies every payload
//! into a delivery decision:
//! 1. **Direction:** downstream permission traffic pays latency outbound;
//!    acknowledgments ride the return traversal.
//! 2. **Target kind:** id-mapped for cache-bound coherence messages,
//!    address-mapped for homes and memory.
//! 3. **Delivery:** a single port by range or id, or a set of cache ports
//!    for targeted (and, on non-coherent fabrics, broadcast) messages.
//!
//! When the mesh model is enabled the decision additionally feeds the NoC
//! timing model; otherwise a fixed fabric latency applies.

use tracing::trace;

use crate::common::{Command, ConfigError, Delivery, NodeId, Payload, Status};
use crate::config::NocConfig;
use crate::noc::MeshNoc;
use crate::noc::route::MeshPos;

/// A cache output port: one upper-level cache reachable by id.
#[derive(Clone, Debug)]
struct CacheOutput {
    id: NodeId,
    endpoint: usize,
    position: MeshPos,
}

/// A home output port: a directory reachable by address range.
#[derive(Clone, Debug)]
struct HomeOutput {
    #[allow(dead_code)]
    id: NodeId,
    base: u64,
    last: u64,
    endpoint: usize,
    position: MeshPos,
}

/// A memory-mapped output port.
#[derive(Clone, Debug)]
struct MmappedOutput {
    base: u64,
    last: u64,
    endpoint: usize,
    position: MeshPos,
}

/// Where the fabric decided to deliver a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deliver {
    /// To the memory target at this arena index.
    Memory(usize),
    /// To the home cache at this arena index.
    Home(usize),
    /// To each named cache arena index in turn.
    Caches(Vec<usize>),
}

/// Routing fabric between caches, homes, and memory-mapped targets.
#[derive(Debug)]
pub struct CoherentInterconnect {
    coherent: bool,
    latency: u64,

    cache_outputs: Vec<CacheOutput>,
    home_outputs: Vec<HomeOutput>,
    mmapped_outputs: Vec<MmappedOutput>,
    cpu_positions: Vec<(NodeId, MeshPos)>,
    device_positions: Vec<(NodeId, MeshPos)>,

    interleave_length: u64,
    ram_base: u64,
    ram_last: u64,
    pub(crate) word_length: u32,
    pub(crate) flit_size: u32,

    /// Mesh timing model; `None` runs the fixed-latency fabric.
    pub mesh: Option<MeshNoc>,

    /// Bytes read per memory output port.
    pub read_bytes: Vec<u64>,
    /// Bytes written per memory output port.
    pub write_bytes: Vec<u64>,
}

impl CoherentInterconnect {
    /// Builds the fabric from the NoC configuration.
    ///
    /// # Errors
    ///
    /// Propagates mesh parameter validation.
    pub fn new(coherent: bool, config: &NocConfig) -> Result<Self, ConfigError> {
        let mesh = if config.is_mesh {
            Some(MeshNoc::new(config)?)
        } else {
            None
        };
        Ok(Self {
            coherent,
            latency: config.latency,
            cache_outputs: Vec::new(),
            home_outputs: Vec::new(),
            mmapped_outputs: Vec::new(),
            cpu_positions: Vec::new(),
            device_positions: Vec::new(),
            interleave_length: config.interleave_length,
            ram_base: config.ram_base_address,
            ram_last: config.ram_last_address,
            word_length: config.memory_word_length,
            flit_size: config.flit_size,
            mesh,
            read_bytes: Vec::new(),
            write_bytes: Vec::new(),
        })
    }

    /// Whether the fabric routes MSI coherence traffic.
    pub fn is_coherent(&self) -> bool {
        self.coherent
    }

    fn check_position(&self, name: &str, pos: MeshPos) -> Result<(), ConfigError> {
        if let Some(mesh) = &self.mesh {
            if pos.x >= mesh.mesh_x() || pos.y >= mesh.mesh_y() {
                return Err(ConfigError::PositionOutsideMesh {
                    name: name.to_string(),
                    x: pos.x,
                    y: pos.y,
                    mesh_x: mesh.mesh_x(),
                    mesh_y: mesh.mesh_y(),
                });
            }
        }
        Ok(())
    }

    /// Registers an upper-level cache reachable by id, attached at `pos`.
    ///
    /// # Errors
    ///
    /// Rejects duplicate ids and positions outside the mesh.
    pub fn add_cache_output(
        &mut self,
        name: &str,
        id: NodeId,
        endpoint: usize,
        pos: MeshPos,
    ) -> Result<(), ConfigError> {
        assert!(!id.is_none(), "cache output '{name}' with the NONE id");
        if self.cache_outputs.iter().any(|c| c.id == id) {
            return Err(ConfigError::DuplicateNodeId {
                id: id.val(),
                first: "cache output".to_string(),
                second: name.to_string(),
            });
        }
        self.check_position(name, pos)?;
        self.cache_outputs.push(CacheOutput {
            id,
            endpoint,
            position: pos,
        });
        self.cpu_positions.push((id, pos));
        Ok(())
    }

    /// Registers a home output claiming `[base, base + size)`, attached at `pos`.
    ///
    /// # Errors
    ///
    /// Rejects overlapping home ranges and positions outside the mesh.
    pub fn add_home_output(
        &mut self,
        name: &str,
        id: NodeId,
        base: u64,
        size: u64,
        endpoint: usize,
        pos: MeshPos,
    ) -> Result<(), ConfigError> {
        assert!(!id.is_none(), "home output '{name}' with the NONE id");
        let last = base + size - 1;
        if self
            .home_outputs
            .iter()
            .any(|h| base <= h.last && h.base <= last)
        {
            return Err(ConfigError::OverlappingRanges {
                first: "home output".to_string(),
                second: name.to_string(),
            });
        }
        self.check_position(name, pos)?;
        self.home_outputs.push(HomeOutput {
            id,
            base,
            last,
            endpoint,
            position: pos,
        });
        // Homes also initiate traffic (memory fills, forwards), so their
        // attachment doubles as an initiator position.
        self.cpu_positions.push((id, pos));
        Ok(())
    }

    /// Registers a memory-mapped output claiming `[base, base + size)`.
    ///
    /// # Errors
    ///
    /// Rejects overlapping memory ranges and positions outside the mesh.
    pub fn add_mmapped_output(
        &mut self,
        name: &str,
        base: u64,
        size: u64,
        endpoint: usize,
        pos: MeshPos,
    ) -> Result<(), ConfigError> {
        let last = base + size - 1;
        if self
            .mmapped_outputs
            .iter()
            .any(|m| base <= m.last && m.base <= last)
        {
            return Err(ConfigError::OverlappingRanges {
                first: "memory output".to_string(),
                second: name.to_string(),
            });
        }
        self.check_position(name, pos)?;
        self.mmapped_outputs.push(MmappedOutput {
            base,
            last,
            endpoint,
            position: pos,
        });
        self.read_bytes.push(0);
        self.write_bytes.push(0);
        Ok(())
    }

    /// Registers a DMA-capable device attached at `pos`.
    ///
    /// # Errors
    ///
    /// Rejects duplicate device ids and positions outside the mesh.
    pub fn add_device(&mut self, name: &str, id: NodeId, pos: MeshPos) -> Result<(), ConfigError> {
        if self.device_positions.iter().any(|&(d, _)| d == id) {
            return Err(ConfigError::DuplicateNodeId {
                id: id.val(),
                first: "device".to_string(),
                second: name.to_string(),
            });
        }
        self.check_position(name, pos)?;
        self.device_positions.push((id, pos));
        Ok(())
    }

    /// Classifies a cache-originated payload, applies fabric/NoC timing to
    /// `delay`, and returns the delivery decision.
    ///
    /// # Errors
    ///
    /// `AddressError` when no range covers the addressed bytes;
    /// `CommandError` for commands the fabric mode does not route.
    pub fn prepare(&mut self, payload: &Payload, delay: &mut u64) -> Result<Deliver, Status> {
        let downstream = payload.command.is_downstream();
        let id_mapped = self.is_id_mapped(payload.command);

        trace!(
            command = ?payload.command,
            addr = payload.address,
            downstream,
            id_mapped,
            "fabric"
        );

        let decision = self.decide(payload)?;

        if self.mesh.is_some() {
            let flits = self.flit_count(payload);
            let src = self.cpu_pos(payload.initiator);
            let dests = self.destinations(payload, id_mapped)?;
            if let Some(mesh) = &mut self.mesh {
                if mesh.with_contention() {
                    let ts = payload.source_timestamp + *delay as i64;
                    mesh.observe(ts, src, &dests, flits);
                    if downstream {
                        *delay += mesh.last_packet_latency();
                    }
                } else {
                    let latency = mesh.no_contention(src, &dests, payload.initiator);
                    if downstream {
                        *delay += latency;
                    }
                }
            }
        } else if downstream {
            *delay += self.latency;
        }

        if let Deliver::Memory(_) = decision {
            self.count_memory_bytes(payload);
        }
        Ok(decision)
    }

    /// Cache-bound commands address their targets by node id.
    fn is_id_mapped(&self, command: Command) -> bool {
        if self.coherent {
            matches!(
                command,
                Command::FwdGetS
                    | Command::FwdGetM
                    | Command::PutI
                    | Command::InvS
                    | Command::InvM
                    | Command::ReadBack
            )
        } else {
            matches!(command, Command::Invalidate | Command::ReadBack)
        }
    }

    /// Resolves the delivery ports for a payload.
    fn decide(&self, payload: &Payload) -> Result<Deliver, Status> {
        if self.coherent {
            match payload.command {
                Command::Read | Command::Write => {
                    Ok(Deliver::Memory(self.mmapped_port(payload.address, payload.length)?))
                }
                Command::GetS
                | Command::GetM
                | Command::PutS
                | Command::PutM
                | Command::Evict => {
                    Ok(Deliver::Home(self.home_port(payload.address, payload.length)?))
                }
                Command::FwdGetS
                | Command::FwdGetM
                | Command::PutI
                | Command::InvS
                | Command::InvM
                | Command::ReadBack => Ok(Deliver::Caches(self.cache_ports(&payload.targets))),
                Command::Invalidate => Err(Status::CommandError),
            }
        } else {
            match payload.command {
                Command::Read | Command::Write => {
                    if payload.to_home {
                        Ok(Deliver::Home(self.home_port(payload.address, payload.length)?))
                    } else {
                        Ok(Deliver::Memory(self.mmapped_port(payload.address, payload.length)?))
                    }
                }
                Command::Evict => {
                    assert!(payload.to_home, "Evict away from the home");
                    Ok(Deliver::Home(self.home_port(payload.address, payload.length)?))
                }
                Command::Invalidate | Command::ReadBack => {
                    Ok(Deliver::Caches(self.cache_ports(&payload.targets)))
                }
                _ => Err(Status::CommandError),
            }
        }
    }

    /// Flit decomposition of one payload: data-bearing commands split into
    /// `ceil(length / flit_size)` flits, everything else is one flit.
    fn flit_count(&self, payload: &Payload) -> u32 {
        if payload.command.carries_data() && self.flit_size > 0 {
            (payload.length as u32).div_ceil(self.flit_size).max(1)
        } else {
            1
        }
    }

    /// Cache arena indices for a delivery mode.
    ///
    /// A broadcast addresses every cache output; the fabric must be
    /// non-coherent for that, a coherent sender always names its targets.
    fn cache_ports(&self, targets: &Delivery) -> Vec<usize> {
        match targets {
            Delivery::Broadcast => {
                assert!(
                    !self.coherent,
                    "broadcast to caches on a coherent fabric"
                );
                self.cache_outputs.iter().map(|c| c.endpoint).collect()
            }
            Delivery::Targeted(ids) => {
                assert!(!ids.is_empty(), "cache-bound payload without targets");
                self.cache_outputs
                    .iter()
                    .filter(|c| ids.contains(&c.id))
                    .map(|c| c.endpoint)
                    .collect()
            }
        }
    }

    /// Home port covering `[addr, addr + len)`; a single home claims
    /// everything.
    fn home_port(&self, addr: u64, len: usize) -> Result<usize, Status> {
        if self.home_outputs.len() == 1 {
            return Ok(self.home_outputs[0].endpoint);
        }
        self.home_outputs
            .iter()
            .find(|h| addr >= h.base && addr + len as u64 - 1 <= h.last)
            .map(|h| h.endpoint)
            .ok_or(Status::AddressError)
    }

    /// Memory port covering `[addr, addr + len)`. Delivery is always a pure
    /// range match; interleaving striping affects only the timing position
    /// and the per-controller counters.
    fn mmapped_port(&self, addr: u64, len: usize) -> Result<usize, Status> {
        self.mmapped_outputs
            .iter()
            .find(|m| addr >= m.base && addr + len.max(1) as u64 - 1 <= m.last)
            .map(|m| m.endpoint)
            .ok_or(Status::AddressError)
    }

    /// Table index of the memory controller accounting for `addr`: striped
    /// across all registered controllers inside the interleaved RAM window,
    /// a plain range match elsewhere.
    fn mmapped_index(&self, addr: u64, len: usize) -> Result<usize, Status> {
        if self.mmapped_outputs.is_empty() {
            return Err(Status::AddressError);
        }
        if self.interleave_length > 0 && addr >= self.ram_base && addr < self.ram_last {
            let stripe = (addr - self.ram_base) / self.interleave_length;
            return Ok((stripe % self.mmapped_outputs.len() as u64) as usize);
        }
        self.mmapped_outputs
            .iter()
            .position(|m| addr >= m.base && addr + len.max(1) as u64 - 1 <= m.last)
            .ok_or(Status::AddressError)
    }

    /// Mesh position of the memory controller timing-wise responsible for
    /// `addr` (interleave-aware; also the DMA reverse-path source).
    pub(crate) fn memory_pos(&self, addr: u64, len: usize) -> Result<MeshPos, Status> {
        let idx = self.mmapped_index(addr, len)?;
        Ok(self.mmapped_outputs[idx].position)
    }

    /// Interleave-aware controller index for `addr` (counter attribution).
    pub fn controller_index(&self, addr: u64, len: usize) -> Result<usize, Status> {
        self.mmapped_index(addr, len)
    }

    /// Arena index of the memory target for `addr` (device DMA path).
    pub(crate) fn memory_endpoint(&self, addr: u64, len: usize) -> Result<usize, Status> {
        self.mmapped_port(addr, len)
    }

    /// Fixed fabric latency applied when the mesh model is off.
    pub(crate) fn fixed_latency(&self) -> u64 {
        self.latency
    }

    /// Mesh position of the initiator `id` (a cache/CPU attachment).
    ///
    /// # Panics
    ///
    /// An unregistered initiator id is a wiring fault.
    fn cpu_pos(&self, id: NodeId) -> MeshPos {
        self.cpu_positions
            .iter()
            .find(|&&(n, _)| n == id)
            .map_or_else(|| panic!("unknown initiator id {id}"), |&(_, p)| p)
    }

    /// Mesh position of the device `id`.
    ///
    /// # Panics
    ///
    /// An unregistered device id is a wiring fault.
    pub(crate) fn device_pos(&self, id: NodeId) -> MeshPos {
        self.device_positions
            .iter()
            .find(|&&(n, _)| n == id)
            .map_or_else(|| panic!("unknown device id {id}"), |&(_, p)| p)
    }

    /// Destination router positions of a payload.
    fn destinations(&self, payload: &Payload, id_mapped: bool) -> Result<Vec<MeshPos>, Status> {
        if !id_mapped {
            if payload.to_home {
                let pos = self
                    .home_outputs
                    .iter()
                    .find(|h| {
                        payload.address >= h.base
                            && payload.address + payload.length.max(1) as u64 - 1 <= h.last
                    })
                    .map(|h| h.position)
                    .or_else(|| self.home_outputs.first().map(|h| h.position))
                    .ok_or(Status::AddressError)?;
                Ok(vec![pos])
            } else {
                Ok(vec![self.memory_pos(payload.address, payload.length)?])
            }
        } else if self.coherent {
            let ids = payload
                .targets
                .targets()
                .unwrap_or_else(|| panic!("coherent cache-bound payload without targets"));
            Ok(ids.iter().map(|&id| self.cpu_pos(id)).collect())
        } else {
            // Non-coherent broadcast distance is taken over every cache
            // output, whatever the payload names.
            Ok(self.cache_outputs.iter().map(|c| c.position).collect())
        }
    }

    /// Accounts transferred bytes against the addressed memory port.
    fn count_memory_bytes(&mut self, payload: &Payload) {
        if let Ok(idx) = self.mmapped_index(payload.address, payload.length) {
            match payload.command {
                Command::Read => self.read_bytes[idx] += payload.length as u64,
                Command::Write => self.write_bytes[idx] += payload.length as u64,
                _ => {}
            }
        }
    }

    /// Finalizes any open contention window so reported totals include it.
    pub fn flush(&mut self) {
        if let Some(mesh) = &mut self.mesh {
            mesh.finalize_window();
        }
    }

    /// Prints the fabric counters to the reporting stream.
    pub fn print_statistics(&self, name: &str) {
        if let Some(mesh) = &self.mesh {
            mesh.stats.print(name, mesh.mesh_x());
        }
        for (port, (rd, wr)) in self
            .read_bytes
            .iter()
            .zip(self.write_bytes.iter())
            .enumerate()
        {
            if rd + wr > 0 {
                println!("{name}: memory port [{port}]: read {rd} B , written {wr} B");
            }
        }
    }
}
