//! Transaction payload and the command vocabulary.
//!
//! The payload is the universal currency at every port of the memory core. It
//! is constructed by the initiator, passed downstream by mutable reference,
//! and mutated in place to return a response status and (when data tracking
//! is enabled) the transferred bytes. Timing is returned separately through
//! the accumulated-delay reference that travels alongside the payload.

use std::collections::BTreeSet;

use super::node::NodeId;

/// Commands understood by the memory hierarchy.
///
/// Two subfamilies share one enum: the plain data commands (`Read`/`Write`),
/// used by non-coherent caches and for the leaf transaction to a
/// memory-mapped backing store, and the coherence commands of the MSI
/// protocol. Keeping them in one type removes the side-band "is this a
/// coherence access" flag at every dispatch point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Plain data read (non-coherent caches, cache-to-memory leaf).
    Read,
    /// Plain data write (non-coherent caches, cache-to-memory leaf).
    Write,
    /// Request shared (read) permission from the home.
    GetS,
    /// Request modified (write) permission from the home.
    GetM,
    /// Home-to-cache redirection of a shared-permission request.
    FwdGetS,
    /// Home-to-cache redirection of a modified-permission request.
    FwdGetM,
    /// Replacement writeback of a clean line.
    PutS,
    /// Replacement writeback of a dirty line.
    PutM,
    /// Sharer invalidation issued by a directory.
    PutI,
    /// Voluntary writeback from a higher exclusive cache.
    Evict,
    /// Non-coherent back-invalidation of upper-level copies.
    Invalidate,
    /// Revocation of shared permission from a sharer.
    InvS,
    /// Revocation of modified permission from an owner.
    InvM,
    /// Home rereads a line from an upper cache in exclusive hierarchies.
    ReadBack,
}

impl Command {
    /// Returns `true` for commands whose latency is billed on the outbound
    /// (request) traversal; acknowledgments ride the return path for free.
    #[inline]
    pub fn is_downstream(&self) -> bool {
        matches!(
            self,
            Command::Read | Command::GetS | Command::GetM | Command::FwdGetS | Command::FwdGetM
        )
    }

    /// Returns `true` for commands that move a full data beat and therefore
    /// decompose into flits on the NoC.
    #[inline]
    pub fn carries_data(&self) -> bool {
        matches!(
            self,
            Command::Write | Command::PutS | Command::PutM | Command::Evict
        )
    }

    /// Returns `true` for the coherence subfamily (everything except the
    /// plain data commands).
    #[inline]
    pub fn is_coherence(&self) -> bool {
        !matches!(self, Command::Read | Command::Write)
    }
}

/// Transport-layer response status, carried back in the payload.
///
/// `Ok` is produced whenever a legal transition completes. Address-range
/// misses surface as `AddressError`; protocol violations never surface here
/// and abort the simulation instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The access completed.
    Ok,
    /// No registered range covers the addressed bytes.
    AddressError,
    /// The burst shape is not representable in one primitive access.
    BurstError,
    /// Byte enables are not supported on this path.
    ByteEnableError,
    /// The command is not legal at the receiving port.
    CommandError,
    /// The access has not been serviced yet (initial state of every payload).
    Incomplete,
    /// Any other failure.
    GenericError,
}

/// Delivery mode for cache-bound payloads.
///
/// The original encoding — "an empty target set means broadcast" — is made
/// explicit here: a non-coherent fabric may broadcast to every cache output,
/// while a coherent fabric must always name its targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Deliver to every cache output (non-coherent fabrics only).
    Broadcast,
    /// Deliver to the named nodes.
    Targeted(BTreeSet<NodeId>),
}

impl Delivery {
    /// Builds a targeted delivery to a single node.
    pub fn to(id: NodeId) -> Self {
        let mut ids = BTreeSet::new();
        let _ = ids.insert(id);
        Delivery::Targeted(ids)
    }

    /// Returns the target set, or `None` for a broadcast.
    pub fn targets(&self) -> Option<&BTreeSet<NodeId>> {
        match self {
            Delivery::Broadcast => None,
            Delivery::Targeted(ids) => Some(ids),
        }
    }
}

/// A memory transaction: the one record exchanged at every port.
///
/// The payload owns its data buffer; no borrowed pointers cross component
/// boundaries. `length` is authoritative for timing even when data tracking
/// is disabled and `data` is `None`.
#[derive(Clone, Debug)]
pub struct Payload {
    /// What the initiator wants done.
    pub command: Command,
    /// Physical byte address of the first byte covered.
    pub address: u64,
    /// Number of bytes covered.
    pub length: usize,
    /// Transferred bytes; present iff the sending component tracks data.
    pub data: Option<Vec<u8>>,
    /// Node that put this transaction on the fabric.
    pub initiator: NodeId,
    /// Node on whose behalf a forwarded transaction travels.
    pub requester: NodeId,
    /// Delivery mode for cache-bound (upstream) payloads.
    pub targets: Delivery,
    /// In non-coherent mode, selects the home rather than memory as the
    /// target of plain `Read`/`Write` commands.
    pub to_home: bool,
    /// Virtual time at which the initiator issued the transaction, in
    /// nanoseconds from simulation start.
    pub source_timestamp: i64,
    /// Stable handle delivered to the eviction observer if the line
    /// allocated for this access is later evicted.
    pub evict_handle: Option<u64>,
    /// Response status, written by the final target.
    pub status: Status,
}

impl Payload {
    /// Creates a payload with the given command, address, and length.
    ///
    /// Identities default to [`NodeId::NONE`], delivery to an empty targeted
    /// set is deliberately not representable: the default is `Broadcast`,
    /// which coherent senders must overwrite. The status starts
    /// [`Status::Incomplete`].
    pub fn new(command: Command, address: u64, length: usize) -> Self {
        Self {
            command,
            address,
            length,
            data: None,
            initiator: NodeId::NONE,
            requester: NodeId::NONE,
            targets: Delivery::Broadcast,
            to_home: false,
            source_timestamp: 0,
            evict_handle: None,
            status: Status::Incomplete,
        }
    }

    /// Attaches a data buffer; the payload length is left unchanged.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the initiating node.
    pub fn from_node(mut self, id: NodeId) -> Self {
        self.initiator = id;
        self
    }

    /// Sets the issue timestamp in nanoseconds.
    pub fn at_time(mut self, timestamp: i64) -> Self {
        self.source_timestamp = timestamp;
        self
    }
}
