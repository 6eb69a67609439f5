//! Generic cache controller with pluggable policies and MSI coherence.
//!
//! This module implements the configurable set-associative cache at the heart
//! of the timing model. It provides:
//! 1. **Storage:** Line slots grouped into sets with LRU/MRU/FIFO replacement.
//! 2. **Roles:** One access engine per hierarchy role — non-coherent, private
//!    (L1), intermediate (L2), and home/LLC (directory) — selected once at
//!    construction.
//! 3. **Policies:** Write-back/write-through, write-allocate/write-around,
//!    and inclusive/exclusive/NINE inclusion with both neighbors.
//! 4. **Transport:** A single `transport` entry point that dispatches the
//!    unified command set and accumulates delay.

/// Directory entries and the per-home directory table.
pub mod directory;

/// Cache line slots and MSI line states.
pub mod line;

/// Associativity-wide line groups with replacement bookkeeping.
pub mod set;

mod home;
mod intermediate;
mod noncoherent;
mod private;

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::common::{Command, Delivery, NodeId, Payload, Status};
use crate::config::{AllocationPolicy, CacheConfig, CacheLevel, InclusionPolicy, WritePolicy};
use crate::stats::CacheStats;
use crate::system::MemorySystem;
use directory::DirectoryTable;
use line::CacheLine;
use set::CacheSet;

/// Observer notified when a line with an attached handle is evicted.
///
/// Handles are opaque `u64` values supplied by the collaborator that
/// installed the line (via the payload); the cache never interprets them.
pub trait EvictionObserver {
    /// Called with the evicted line's handle.
    fn line_evicted(&mut self, handle: u64);
}

/// Access engine selected at construction from `(is_coherent, is_home, level)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Plain cache: `Read`/`Write`/`Invalidate`/`Evict`/`ReadBack` only.
    NonCoherent,
    /// Private coherent cache (L1) driven by an initiator.
    Private,
    /// Intermediate coherent cache (L2) with a local directory over its L1s.
    Intermediate,
    /// Home cache (LLC): the authoritative directory for its address range.
    Home,
}

/// Where a cache sends its downstream traffic.
#[derive(Clone, Copy, Debug)]
pub enum DownLink {
    /// Through the coherent interconnect.
    Fabric,
    /// Directly into the next private cache level.
    Cache(usize),
}

/// Where a cache sends its upstream (cache-bound) traffic.
#[derive(Clone, Debug)]
pub enum UpLink {
    /// Nothing above (an L1).
    None,
    /// Through the coherent interconnect, id-mapped.
    Fabric,
    /// Directly into the named upper caches.
    Direct(Vec<(NodeId, usize)>),
}

/// Configurable set-associative cache controller.
///
/// One controller instance plays exactly one [`Role`]; the role never changes
/// after elaboration, so the per-command dispatch contains no dead branches.
pub struct CacheController {
    name: String,
    id: NodeId,
    role: Role,
    level: CacheLevel,

    line_size: usize,
    num_sets: usize,
    offset_mask: u64,
    index_mask: u64,
    index_shift: u32,
    tag_shift: u32,

    sets: Vec<CacheSet>,
    directory: DirectoryTable,
    /// Upper-level copies per line address, maintained by the non-coherent
    /// engine for inclusive back-invalidation and exclusive read service.
    upper_sharers: HashMap<u64, BTreeSet<NodeId>>,

    write_policy: WritePolicy,
    alloc_policy: AllocationPolicy,
    inclusion_higher: InclusionPolicy,
    inclusion_lower: InclusionPolicy,
    data_support: bool,
    latency: u64,

    pub(crate) down: DownLink,
    pub(crate) up: UpLink,

    /// Access counters, live for the whole simulation.
    pub stats: CacheStats,
    observer: Option<Box<dyn EvictionObserver>>,
}

impl std::fmt::Debug for CacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("role", &self.role)
            .field("line_size", &self.line_size)
            .field("num_sets", &self.num_sets)
            .finish()
    }
}

impl CacheController {
    /// Builds a controller from its configuration.
    ///
    /// # Errors
    ///
    /// Returns a geometry error when the capacity, line size, or
    /// associativity are inconsistent, and a role error for a coherent
    /// non-home cache above level 2.
    pub fn new(config: &CacheConfig) -> Result<Self, crate::common::ConfigError> {
        use crate::common::ConfigError;

        let bad = |reason: &str| ConfigError::BadCacheGeometry {
            name: config.name.clone(),
            reason: reason.to_string(),
        };
        if config.associativity == 0 {
            return Err(bad("associativity must be at least 1"));
        }
        if config.line_size == 0 || !config.line_size.is_power_of_two() {
            return Err(bad("line size must be a power of two"));
        }
        if config.size == 0 || config.size % (config.line_size * config.associativity) != 0 {
            return Err(bad("capacity must be a multiple of line_size * associativity"));
        }
        let num_lines = config.size / config.line_size;
        let num_sets = num_lines / config.associativity;
        if !num_sets.is_power_of_two() {
            return Err(bad("set count must be a power of two"));
        }

        let role = if !config.is_coherent {
            Role::NonCoherent
        } else if config.is_home {
            Role::Home
        } else {
            match config.level {
                CacheLevel::L1 => Role::Private,
                CacheLevel::L2 => Role::Intermediate,
                CacheLevel::Llc => {
                    return Err(bad("a coherent LLC must be a home"));
                }
            }
        };

        let offset_bits = config.line_size.trailing_zeros();
        let index_bits = num_sets.trailing_zeros();

        let sets = (0..num_sets)
            .map(|_| {
                CacheSet::new(
                    config.line_size,
                    config.associativity,
                    config.repl_policy,
                    config.data_support,
                )
            })
            .collect();

        Ok(Self {
            name: config.name.clone(),
            id: NodeId::new(config.id),
            role,
            level: config.level,
            line_size: config.line_size,
            num_sets,
            offset_mask: (config.line_size as u64) - 1,
            index_mask: (num_sets as u64) - 1,
            index_shift: offset_bits,
            tag_shift: offset_bits + index_bits,
            sets,
            directory: DirectoryTable::new(),
            upper_sharers: HashMap::new(),
            write_policy: config.writing_policy,
            alloc_policy: config.allocation_policy,
            inclusion_higher: config.inclusion_higher,
            inclusion_lower: config.inclusion_lower,
            data_support: config.data_support,
            latency: config.latency,
            down: DownLink::Fabric,
            up: UpLink::None,
            stats: CacheStats::default(),
            observer: None,
        })
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// NodeId in the coherence fabric.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Role selected at construction.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Line size in bytes.
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    /// Registers the observer notified on line evictions.
    pub fn set_eviction_observer(&mut self, observer: Box<dyn EvictionObserver>) {
        self.observer = Some(observer);
    }

    /// Inclusion policy with the level below (drives report formatting).
    pub fn inclusion_lower(&self) -> InclusionPolicy {
        self.inclusion_lower
    }

    /// Directory table (home and intermediate roles).
    pub fn directory(&self) -> &DirectoryTable {
        &self.directory
    }

    /// Returns the MSI state of the line holding `addr`, if present.
    pub fn probe(&self, addr: u64) -> Option<line::CoherenceState> {
        let (_, index, tag) = self.split_address(addr);
        self.sets[index].locate(tag).map(|i| self.sets[index].line(i).state())
    }

    /// Services one transaction, mutating the payload in place and adding
    /// this cache's share of the delay.
    ///
    /// The payload's `source_timestamp` is advanced by the cache latency for
    /// every transaction this access causes downstream, matching the
    /// contention model's notion of arrival time.
    pub fn transport(
        &mut self,
        sys: &mut MemorySystem,
        payload: &mut Payload,
        delay: &mut u64,
    ) -> Status {
        let ts = payload.source_timestamp + self.latency as i64;
        let addr = payload.address;
        let len = payload.length;
        let id = payload.initiator;
        let handle = payload.evict_handle;
        let command = payload.command;

        trace!(
            cache = %self.name,
            ?command,
            addr,
            len,
            initiator = %id,
            "transport"
        );

        // The buffer is taken out of the payload for the duration of the
        // access so the engines can hold it alongside their own line borrows.
        let mut data = payload.data.take();
        let status = match self.role {
            Role::NonCoherent => {
                self.access_non_coherent(sys, command, data.as_deref_mut(), len, addr, id, delay, ts, handle)
            }
            Role::Private => {
                self.access_private(sys, command, data.as_deref_mut(), len, addr, id, delay, ts, handle)
            }
            Role::Intermediate => {
                self.access_intermediate(sys, command, data.as_deref_mut(), len, addr, id, delay, ts, handle)
            }
            Role::Home => {
                self.access_home(sys, command, data.as_deref_mut(), len, addr, id, delay, ts, handle)
            }
        };
        payload.data = data;
        payload.status = status;

        // Latency billing: permission-acquiring traversals pay on the way
        // in; writebacks and invalidations ride for free.
        match command {
            Command::Read
            | Command::GetS
            | Command::GetM
            | Command::FwdGetS
            | Command::FwdGetM
            | Command::ReadBack => *delay += self.latency,
            Command::Write => {
                if self.level == CacheLevel::L1 {
                    *delay += self.latency;
                }
            }
            _ => {}
        }
        status
    }

    /// Splits an address into `(offset, set index, tag)`.
    #[inline]
    pub(crate) fn split_address(&self, addr: u64) -> (usize, usize, u64) {
        let offset = (addr & self.offset_mask) as usize;
        let index = ((addr >> self.index_shift) & self.index_mask) as usize;
        let tag = addr >> self.tag_shift;
        (offset, index, tag)
    }

    /// Notifies the observer that a line with `handle` is being pushed out.
    pub(crate) fn notify_eviction(&mut self, handle: Option<u64>) {
        if let (Some(observer), Some(handle)) = (self.observer.as_mut(), handle) {
            observer.line_evicted(handle);
        }
    }

    /// Allocates a payload-sized scratch buffer when data is tracked.
    pub(crate) fn scratch(&self, len: usize) -> Option<Vec<u8>> {
        if self.data_support {
            Some(vec![0; len])
        } else {
            None
        }
    }

    /// Snapshots a line's contents for an outgoing data-bearing command.
    pub(crate) fn line_snapshot(&self, index: usize, slot: usize) -> Option<Vec<u8>> {
        self.sets[index].line(slot).data().map(<[u8]>::to_vec)
    }

    // ── Outgoing transactions ──────────────────────────────────────────

    /// Sends a payload through the downstream link.
    pub(crate) fn send_down(
        &mut self,
        sys: &mut MemorySystem,
        command: Command,
        addr: u64,
        len: usize,
        data: Option<Vec<u8>>,
        requester: NodeId,
        delay: &mut u64,
        ts: i64,
    ) -> (Status, Option<Vec<u8>>) {
        let mut p = Payload::new(command, addr, len);
        p.data = data;
        p.initiator = self.id;
        p.requester = requester;
        p.to_home = self.role != Role::Home;
        p.source_timestamp = ts;
        let status = match self.down {
            DownLink::Fabric => sys.route(&mut p, delay),
            DownLink::Cache(idx) => sys.transport_cache(idx, &mut p, delay),
        };
        (status, p.data)
    }

    /// Sends a cache-bound payload through the upstream link.
    pub(crate) fn send_up(
        &mut self,
        sys: &mut MemorySystem,
        command: Command,
        addr: u64,
        len: usize,
        data: Option<Vec<u8>>,
        targets: Delivery,
        requester: NodeId,
        delay: &mut u64,
        ts: i64,
    ) -> (Status, Option<Vec<u8>>) {
        if self.role != Role::NonCoherent {
            assert!(
                targets.targets().is_some_and(|t| !t.is_empty()),
                "{}: coherent {command:?} at {addr:#x} without targets",
                self.name
            );
        }
        let mut p = Payload::new(command, addr, len);
        p.data = data;
        p.initiator = self.id;
        p.requester = requester;
        p.targets = targets;
        p.to_home = self.role != Role::Home;
        p.source_timestamp = ts;
        let status = match &self.up {
            UpLink::Fabric => sys.route(&mut p, delay),
            UpLink::Direct(uppers) => {
                let uppers = uppers.clone();
                let mut status = Status::Ok;
                for (node, idx) in &uppers {
                    let wanted = match &p.targets {
                        Delivery::Broadcast => true,
                        Delivery::Targeted(ids) => ids.contains(node),
                    };
                    if wanted {
                        status = sys.transport_cache(*idx, &mut p, delay);
                    }
                }
                status
            }
            UpLink::None => panic!("{}: {command:?} with no upstream port", self.name),
        };
        (status, p.data)
    }

    /// Reads a full line from the next level into a scratch buffer.
    pub(crate) fn forward_read(
        &mut self,
        sys: &mut MemorySystem,
        addr: u64,
        len: usize,
        delay: &mut u64,
        ts: i64,
    ) -> (Status, Option<Vec<u8>>) {
        let buf = self.scratch(len);
        self.send_down(sys, Command::Read, addr, len, buf, NodeId::NONE, delay, ts)
    }

    /// Writes bytes to the next level.
    pub(crate) fn forward_write(
        &mut self,
        sys: &mut MemorySystem,
        addr: u64,
        len: usize,
        data: Option<Vec<u8>>,
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        self.send_down(sys, Command::Write, addr, len, data, NodeId::NONE, delay, ts)
            .0
    }

    /// Pushes a clean victim into an exclusive lower cache.
    pub(crate) fn forward_evict(
        &mut self,
        sys: &mut MemorySystem,
        addr: u64,
        len: usize,
        data: Option<Vec<u8>>,
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        self.send_down(sys, Command::Evict, addr, len, data, NodeId::NONE, delay, ts)
            .0
    }

    /// Invalidates upper-level copies of a victim line (non-coherent mode).
    pub(crate) fn back_invalidate(
        &mut self,
        sys: &mut MemorySystem,
        addr: u64,
        sharers: BTreeSet<NodeId>,
        delay: &mut u64,
        ts: i64,
    ) -> Status {
        self.send_up(
            sys,
            Command::Invalidate,
            addr,
            0,
            None,
            Delivery::Targeted(sharers),
            NodeId::NONE,
            delay,
            ts,
        )
        .0
    }

    /// Rereads a line from upper caches holding it (exclusive hierarchies).
    pub(crate) fn backward_read(
        &mut self,
        sys: &mut MemorySystem,
        addr: u64,
        len: usize,
        sharers: BTreeSet<NodeId>,
        delay: &mut u64,
        ts: i64,
    ) -> (Status, Option<Vec<u8>>) {
        let buf = self.scratch(len);
        self.send_up(
            sys,
            Command::ReadBack,
            addr,
            len,
            buf,
            Delivery::Targeted(sharers),
            NodeId::NONE,
            delay,
            ts,
        )
    }
}

/// Copies payload bytes into a line at `line_off`; no-op without data.
pub(crate) fn copy_payload_to_line(line: &mut CacheLine, line_off: usize, data: Option<&[u8]>) {
    if let Some(src) = data {
        line.fill(line_off, src);
    }
}

/// Copies line bytes at `line_off` into the payload; no-op without data.
pub(crate) fn copy_line_to_payload(line: &CacheLine, line_off: usize, data: Option<&mut [u8]>) {
    if let Some(dst) = data {
        line.extract(line_off, dst);
    }
}

/// Installs a fetched buffer as the new line contents; no-op without data.
pub(crate) fn install_fetched(line: &mut CacheLine, fetched: Option<Vec<u8>>) {
    if let Some(bytes) = fetched {
        line.fill(0, &bytes);
    }
}
