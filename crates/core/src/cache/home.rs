//! Access engine for home caches (the directory authority).
//!
//! The home owns the authoritative sharing vector for its address range and
//! is the only component allowed to talk to the backing store. `GetS`/`GetM`
//! are answered from the local copy, from the current owner or sharers (via
//! `FwdGetS`/`FwdGetM`), or from memory; `PutS`/`PutM` retire upper copies.
//! Under an exclusive policy with the level above, the home does not allocate
//! on permission requests and acts as a cache-less directory plus memory
//! forwarder for the missing lines.

use crate::cache::directory::DirectoryEntry;
use crate::cache::line::CoherenceState;
use crate::cache::{CacheController, copy_line_to_payload, copy_payload_to_line, install_fetched};
use crate::common::{Command, Delivery, NodeId, Status};
use crate::config::{AllocationPolicy, InclusionPolicy, WritePolicy};
use crate::system::MemorySystem;

impl CacheController {
    /// Services one line-granular access at the directory home.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn access_home(
        &mut self,
        sys: &mut MemorySystem,
        command: Command,
        mut data: Option<&mut [u8]>,
        len: usize,
        addr: u64,
        id: NodeId,
        delay: &mut u64,
        ts: i64,
        handle: Option<u64>,
    ) -> Status {
        let (offset, index, tag) = self.split_address(addr);
        assert!(!id.is_none(), "{}: {command:?} without an initiator", self.name);
        assert!(
            offset == 0 && len == self.line_size,
            "{}: {command:?} at {addr:#x} is not line-granular",
            self.name
        );
        let mut status = Status::Ok;
        let (hit, slot) = self.sets[index].access(tag);
        let (victim_base, victim_state, victim_handle) = {
            let line = self.sets[index].line(slot);
            (line.base_address(), line.state(), line.evict_handle)
        };

        match command {
            Command::GetS => {
                if hit {
                    self.stats.hits += 1;
                } else {
                    self.stats.misses += 1;
                }
            }
            Command::GetM => {
                if hit && victim_state == CoherenceState::Modified {
                    self.stats.hits += 1;
                } else {
                    self.stats.misses += 1;
                }
            }
            _ => {}
        }
        if !hit && victim_state == CoherenceState::Shared {
            self.notify_eviction(victim_handle);
        }

        // Exclusive with the level above: permission requests that miss are
        // served without allocating a frame; the directory plus the memory
        // path stand in for the line.
        if self.inclusion_higher == InclusionPolicy::Exclusive && !hit {
            match command {
                Command::GetS => {
                    let entry = self.directory.entry_mut(addr).clone();
                    match entry.state {
                        CoherenceState::Invalid => {
                            let (st, fetched) =
                                self.forward_read(sys, addr, self.line_size, delay, ts);
                            status = st;
                            if let (Some(dst), Some(src)) =
                                (data.as_deref_mut(), fetched.as_deref())
                            {
                                dst.copy_from_slice(src);
                            }
                            *self.directory.entry_mut(addr) = DirectoryEntry::shared_by(id);
                        }
                        CoherenceState::Shared => {
                            let (st, fetched) = self.send_home_fwd(
                                sys,
                                Command::FwdGetS,
                                addr,
                                Delivery::Targeted(entry.sharers.clone()),
                                delay,
                                ts,
                            );
                            status = st;
                            if let (Some(dst), Some(src)) =
                                (data.as_deref_mut(), fetched.as_deref())
                            {
                                dst.copy_from_slice(src);
                            }
                            let _ = self.directory.entry_mut(addr).sharers.insert(id);
                        }
                        CoherenceState::Modified => {
                            if entry.owner != id {
                                let (st, fetched) = self.send_home_fwd(
                                    sys,
                                    Command::FwdGetS,
                                    addr,
                                    Delivery::to(entry.owner),
                                    delay,
                                    ts,
                                );
                                status = st;
                                if let (Some(dst), Some(src)) =
                                    (data.as_deref_mut(), fetched.as_deref())
                                {
                                    dst.copy_from_slice(src);
                                }
                            }
                            let mut next = DirectoryEntry::shared_by(id);
                            let _ = next.sharers.insert(entry.owner);
                            *self.directory.entry_mut(addr) = next;
                        }
                    }
                    self.stats.get_s += 1;
                    self.directory.assert_consistent(addr, &self.name);
                    return status;
                }
                Command::GetM => {
                    let entry = self.directory.entry_mut(addr).clone();
                    match entry.state {
                        CoherenceState::Invalid => {
                            let (st, fetched) =
                                self.forward_read(sys, addr, self.line_size, delay, ts);
                            status = st;
                            if let (Some(dst), Some(src)) =
                                (data.as_deref_mut(), fetched.as_deref())
                            {
                                dst.copy_from_slice(src);
                            }
                            *self.directory.entry_mut(addr) = DirectoryEntry::modified(id);
                        }
                        CoherenceState::Shared => {
                            let mut sharers = entry.sharers.clone();
                            let _ = sharers.remove(&id);
                            if !sharers.is_empty() {
                                let (st, _) = self.send_up(
                                    sys,
                                    Command::PutI,
                                    addr,
                                    self.line_size,
                                    None,
                                    Delivery::Targeted(sharers),
                                    NodeId::NONE,
                                    delay,
                                    ts,
                                );
                                status = st;
                            }
                            *self.directory.entry_mut(addr) = DirectoryEntry::modified(id);
                        }
                        CoherenceState::Modified => {
                            // A GetM from the registered owner is a no-op.
                            if entry.owner != id {
                                let (st, fetched) = self.send_home_fwd(
                                    sys,
                                    Command::FwdGetM,
                                    addr,
                                    Delivery::to(entry.owner),
                                    delay,
                                    ts,
                                );
                                status = st;
                                if let (Some(dst), Some(src)) =
                                    (data.as_deref_mut(), fetched.as_deref())
                                {
                                    dst.copy_from_slice(src);
                                }
                                self.directory.entry_mut(addr).owner = id;
                            }
                        }
                    }
                    self.stats.get_m += 1;
                    self.directory.assert_consistent(addr, &self.name);
                    return status;
                }
                _ => {}
            }
        }

        // Write back the dirty victim before repurposing its frame.
        if !hit
            && victim_state == CoherenceState::Modified
            && self.write_policy == WritePolicy::WBack
        {
            self.stats.write_backs += 1;
            let snapshot = self.line_snapshot(index, slot);
            status = self.forward_write(sys, victim_base, self.line_size, snapshot, delay, ts);
        }
        if !hit && self.alloc_policy == AllocationPolicy::WAllocate {
            let line = self.sets[index].line_mut(slot);
            line.set_new_line(addr, tag);
            line.evict_handle = handle;
        }

        match command {
            Command::PutS => {
                let entry = self.directory.entry_mut(addr).clone();
                assert!(
                    entry.state == CoherenceState::Shared,
                    "{}: PutS for {addr:#x} with directory state {:?}",
                    self.name,
                    entry.state
                );
                assert!(
                    self.inclusion_higher != InclusionPolicy::Exclusive || !hit,
                    "{}: exclusive home already caches PutS line {addr:#x}",
                    self.name
                );
                let mut sharers = entry.sharers;
                let _ = sharers.remove(&id);
                if sharers.is_empty() {
                    // Last sharer gone. An exclusive home adopts the clean
                    // line into the frame allocated above; elsewhere memory
                    // is already current and the data can be dropped.
                    *self.directory.entry_mut(addr) = DirectoryEntry::invalid();
                    if self.inclusion_higher == InclusionPolicy::Exclusive {
                        let line = self.sets[index].line_mut(slot);
                        copy_payload_to_line(line, 0, data.as_deref());
                        line.set_state(CoherenceState::Shared);
                    }
                } else {
                    self.directory.entry_mut(addr).sharers = sharers;
                }
                self.stats.put_s += 1;
            }
            Command::PutM => {
                let entry = self.directory.entry_mut(addr).clone();
                match entry.state {
                    CoherenceState::Invalid | CoherenceState::Shared => panic!(
                        "{}: PutM for {addr:#x} with directory state {:?}",
                        self.name, entry.state
                    ),
                    CoherenceState::Modified => {
                        assert!(
                            entry.owner == id,
                            "{}: PutM for {addr:#x} from {id}, owner is {}",
                            self.name,
                            entry.owner
                        );
                        let line = self.sets[index].line_mut(slot);
                        copy_payload_to_line(line, 0, data.as_deref());
                        line.set_state(CoherenceState::Modified);
                        *self.directory.entry_mut(addr) = DirectoryEntry::invalid();
                    }
                }
                self.stats.put_m += 1;
            }
            Command::PutI => {
                let entry = self.directory.entry_mut(addr).clone();
                assert!(
                    victim_state == CoherenceState::Shared || entry.state == CoherenceState::Shared,
                    "{}: PutI for {addr:#x} shared nowhere",
                    self.name
                );
                if entry.state == CoherenceState::Shared {
                    let (st, _) = self.send_up(
                        sys,
                        Command::PutI,
                        addr,
                        self.line_size,
                        None,
                        Delivery::Targeted(entry.sharers.clone()),
                        NodeId::NONE,
                        delay,
                        ts,
                    );
                    status = st;
                    *self.directory.entry_mut(addr) = DirectoryEntry::invalid();
                }
                let line = self.sets[index].line_mut(slot);
                if line.state() != CoherenceState::Invalid {
                    line.set_state(CoherenceState::Invalid);
                }
                self.stats.put_i += 1;
            }
            Command::GetS => {
                let entry = self.directory.entry_mut(addr).clone();
                match entry.state {
                    CoherenceState::Invalid => {
                        if !hit {
                            assert!(
                                self.inclusion_higher != InclusionPolicy::Exclusive,
                                "{}: exclusive home allocating on GetS {addr:#x}",
                                self.name
                            );
                            let (st, fetched) =
                                self.forward_read(sys, addr, self.line_size, delay, ts);
                            status = st;
                            let line = self.sets[index].line_mut(slot);
                            install_fetched(line, fetched);
                            line.set_state(CoherenceState::Shared);
                        } else if self.inclusion_higher == InclusionPolicy::Exclusive {
                            // The line migrates up; clean it first if dirty.
                            if victim_state == CoherenceState::Modified {
                                let snapshot = self.line_snapshot(index, slot);
                                status = self.forward_write(
                                    sys,
                                    victim_base,
                                    self.line_size,
                                    snapshot,
                                    delay,
                                    ts,
                                );
                            }
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                        }
                        *self.directory.entry_mut(addr) = DirectoryEntry::shared_by(id);
                    }
                    CoherenceState::Shared => {
                        if !hit {
                            assert!(
                                self.inclusion_higher != InclusionPolicy::Exclusive,
                                "{}: exclusive home allocating on GetS {addr:#x}",
                                self.name
                            );
                            let (st, fetched) = self.send_home_fwd(
                                sys,
                                Command::FwdGetS,
                                addr,
                                Delivery::Targeted(entry.sharers.clone()),
                                delay,
                                ts,
                            );
                            status = st;
                            let line = self.sets[index].line_mut(slot);
                            install_fetched(line, fetched);
                            line.set_state(CoherenceState::Shared);
                        } else if self.inclusion_higher == InclusionPolicy::Exclusive {
                            if victim_state == CoherenceState::Modified {
                                let snapshot = self.line_snapshot(index, slot);
                                status = self.forward_write(
                                    sys,
                                    victim_base,
                                    self.line_size,
                                    snapshot,
                                    delay,
                                    ts,
                                );
                            }
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                        }
                        let _ = self.directory.entry_mut(addr).sharers.insert(id);
                    }
                    CoherenceState::Modified => {
                        if entry.owner != id {
                            let (st, fetched) = self.send_home_fwd(
                                sys,
                                Command::FwdGetS,
                                addr,
                                Delivery::to(entry.owner),
                                delay,
                                ts,
                            );
                            status = st;
                            install_fetched(self.sets[index].line_mut(slot), fetched);
                        }
                        let mut next = DirectoryEntry::shared_by(id);
                        let _ = next.sharers.insert(entry.owner);
                        *self.directory.entry_mut(addr) = next;
                        if self.inclusion_higher == InclusionPolicy::Exclusive {
                            assert!(
                                hit,
                                "{}: exclusive home missed a line it forwarded {addr:#x}",
                                self.name
                            );
                            let snapshot = self.line_snapshot(index, slot);
                            status = self.forward_write(
                                sys,
                                addr,
                                self.line_size,
                                snapshot,
                                delay,
                                ts,
                            );
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                        } else {
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Modified);
                        }
                    }
                }
                copy_line_to_payload(self.sets[index].line(slot), 0, data.as_deref_mut());
                self.stats.get_s += 1;
            }
            Command::GetM => {
                let entry = self.directory.entry_mut(addr).clone();
                match entry.state {
                    CoherenceState::Invalid => {
                        if !hit {
                            assert!(
                                self.inclusion_higher != InclusionPolicy::Exclusive,
                                "{}: exclusive home allocating on GetM {addr:#x}",
                                self.name
                            );
                            let (st, fetched) =
                                self.forward_read(sys, addr, self.line_size, delay, ts);
                            status = st;
                            let line = self.sets[index].line_mut(slot);
                            install_fetched(line, fetched);
                            // Not dirty yet; the requester's copy will be.
                            line.set_state(CoherenceState::Shared);
                        } else if self.inclusion_higher == InclusionPolicy::Exclusive
                            && victim_state == CoherenceState::Modified
                        {
                            let snapshot = self.line_snapshot(index, slot);
                            status = self.forward_write(
                                sys,
                                victim_base,
                                self.line_size,
                                snapshot,
                                delay,
                                ts,
                            );
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                        }
                        *self.directory.entry_mut(addr) = DirectoryEntry::modified(id);
                    }
                    CoherenceState::Shared => {
                        if !hit {
                            assert!(
                                self.inclusion_higher != InclusionPolicy::Exclusive,
                                "{}: exclusive home allocating on GetM {addr:#x}",
                                self.name
                            );
                            let (st, fetched) = self.send_home_fwd(
                                sys,
                                Command::FwdGetS,
                                addr,
                                Delivery::Targeted(entry.sharers.clone()),
                                delay,
                                ts,
                            );
                            status = st;
                            let line = self.sets[index].line_mut(slot);
                            install_fetched(line, fetched);
                            line.set_state(CoherenceState::Shared);
                        } else if self.inclusion_higher == InclusionPolicy::Exclusive
                            && victim_state == CoherenceState::Modified
                        {
                            let snapshot = self.line_snapshot(index, slot);
                            status = self.forward_write(
                                sys,
                                victim_base,
                                self.line_size,
                                snapshot,
                                delay,
                                ts,
                            );
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                        }
                        let mut sharers = entry.sharers.clone();
                        let _ = sharers.remove(&id);
                        if !sharers.is_empty() {
                            let (st, _) = self.send_up(
                                sys,
                                Command::PutI,
                                addr,
                                self.line_size,
                                None,
                                Delivery::Targeted(sharers),
                                NodeId::NONE,
                                delay,
                                ts,
                            );
                            status = st;
                        }
                        *self.directory.entry_mut(addr) = DirectoryEntry::modified(id);
                    }
                    CoherenceState::Modified => {
                        // A GetM from the registered owner is a no-op.
                        if entry.owner != id {
                            let (st, fetched) = self.send_home_fwd(
                                sys,
                                Command::FwdGetM,
                                addr,
                                Delivery::to(entry.owner),
                                delay,
                                ts,
                            );
                            status = st;
                            install_fetched(self.sets[index].line_mut(slot), fetched);
                            self.directory.entry_mut(addr).owner = id;
                            if self.inclusion_higher == InclusionPolicy::Exclusive {
                                self.sets[index]
                                    .line_mut(slot)
                                    .set_state(CoherenceState::Invalid);
                            }
                        }
                    }
                }
                copy_line_to_payload(self.sets[index].line(slot), 0, data.as_deref_mut());
                self.stats.get_m += 1;
            }
            _ => return Status::CommandError,
        }
        self.directory.assert_consistent(addr, &self.name);
        status
    }

    /// Forwards a request to upper caches on behalf of a requester and
    /// returns the responder's data.
    fn send_home_fwd(
        &mut self,
        sys: &mut MemorySystem,
        command: Command,
        addr: u64,
        targets: Delivery,
        delay: &mut u64,
        ts: i64,
    ) -> (Status, Option<Vec<u8>>) {
        let buf = self.scratch(self.line_size);
        self.send_up(
            sys,
            command,
            addr,
            self.line_size,
            buf,
            targets,
            NodeId::NONE,
            delay,
            ts,
        )
    }
}
