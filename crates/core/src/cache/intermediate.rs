//! Access engine for intermediate coherent caches (L2).
//!
//! An intermediate cache sits between private caches and the home. It caches
//! lines locally and keeps a directory over the private caches above it, so
//! it can answer their `GetS`/`GetM` without descending, absorb their
//! `PutS`/`PutM`, and relay `FwdGetS`/`FwdGetM`/`PutI` arriving from the home
//! to whichever of its children actually hold the line. All traffic at this
//! level is line-granular.

use crate::cache::directory::DirectoryEntry;
use crate::cache::line::CoherenceState;
use crate::cache::{CacheController, copy_line_to_payload, copy_payload_to_line, install_fetched};
use crate::common::{Command, Delivery, NodeId, Status};
use crate::config::{AllocationPolicy, WritePolicy};
use crate::system::MemorySystem;

impl CacheController {
    /// Services one line-granular access to an intermediate cache.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn access_intermediate(
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

        // Commands serviced without allocating a frame.
        match command {
            Command::FwdGetS => {
                // In an exclusive lower level, readbacks arrive as FwdGetS.
                assert!(!id.is_none(), "{}: FwdGetS without an initiator", self.name);
                let entry = self.directory.entry_mut(addr).clone();
                assert!(
                    hit || entry.state != CoherenceState::Invalid,
                    "{}: FwdGetS for {addr:#x} held nowhere",
                    self.name
                );
                if hit && victim_state == CoherenceState::Modified {
                    self.sets[index].line_mut(slot).set_state(CoherenceState::Shared);
                }
                if !hit && entry.state == CoherenceState::Shared {
                    let (st, fetched) = self.send_fwd(
                        sys,
                        Command::FwdGetS,
                        addr,
                        Delivery::Targeted(entry.sharers.clone()),
                        delay,
                        ts,
                    );
                    status = st;
                    if let (Some(dst), Some(src)) = (data.as_deref_mut(), fetched.as_deref()) {
                        dst.copy_from_slice(src);
                    }
                }
                if entry.state == CoherenceState::Modified {
                    let (st, fetched) = self.send_fwd(
                        sys,
                        Command::FwdGetS,
                        addr,
                        Delivery::to(entry.owner),
                        delay,
                        ts,
                    );
                    status = st;
                    if let (Some(dst), Some(src)) = (data.as_deref_mut(), fetched.as_deref()) {
                        dst.copy_from_slice(src);
                    }
                    *self.directory.entry_mut(addr) =
                        DirectoryEntry::shared_by(entry.owner);
                }
                self.stats.fwd_get_s += 1;
                self.directory.assert_consistent(addr, &self.name);
                return status;
            }
            Command::FwdGetM => {
                assert!(!id.is_none(), "{}: FwdGetM without an initiator", self.name);
                let entry = self.directory.entry_mut(addr).clone();
                assert!(
                    (hit && victim_state == CoherenceState::Modified)
                        || entry.state == CoherenceState::Modified,
                    "{}: FwdGetM for {addr:#x} owned nowhere",
                    self.name
                );
                if hit {
                    self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                }
                match entry.state {
                    CoherenceState::Shared => {
                        let (st, _) = self.send_fwd(
                            sys,
                            Command::FwdGetM,
                            addr,
                            Delivery::Targeted(entry.sharers.clone()),
                            delay,
                            ts,
                        );
                        status = st;
                        *self.directory.entry_mut(addr) = DirectoryEntry::invalid();
                    }
                    CoherenceState::Modified => {
                        let (st, fetched) = self.send_fwd(
                            sys,
                            Command::FwdGetM,
                            addr,
                            Delivery::to(entry.owner),
                            delay,
                            ts,
                        );
                        status = st;
                        if let (Some(dst), Some(src)) = (data.as_deref_mut(), fetched.as_deref()) {
                            dst.copy_from_slice(src);
                        }
                        *self.directory.entry_mut(addr) = DirectoryEntry::invalid();
                    }
                    CoherenceState::Invalid => {}
                }
                self.stats.fwd_get_m += 1;
                self.directory.assert_consistent(addr, &self.name);
                return status;
            }
            Command::PutS => {
                // Replacement above; the line up there was Shared.
                let entry = self.directory.entry_mut(addr);
                assert!(
                    entry.state == CoherenceState::Shared,
                    "{}: PutS for {addr:#x} with directory state {:?}",
                    self.name,
                    entry.state
                );
                let _ = entry.sharers.remove(&id);
                if entry.sharers.is_empty() {
                    *entry = DirectoryEntry::invalid();
                    if !hit {
                        // The line is gone from every cache above; refresh
                        // the level below.
                        let payload_copy = data.as_deref().map(<[u8]>::to_vec);
                        let (st, _) = self.send_down(
                            sys,
                            Command::PutS,
                            addr,
                            self.line_size,
                            payload_copy,
                            NodeId::NONE,
                            delay,
                            ts,
                        );
                        status = st;
                    }
                }
                self.stats.put_s += 1;
                self.directory.assert_consistent(addr, &self.name);
                return status;
            }
            Command::PutI => {
                let entry = self.directory.entry_mut(addr).clone();
                assert!(
                    (hit && victim_state == CoherenceState::Shared)
                        || entry.state == CoherenceState::Shared,
                    "{}: PutI for {addr:#x} shared nowhere",
                    self.name
                );
                if hit {
                    self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                }
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
                self.stats.put_i += 1;
                self.directory.assert_consistent(addr, &self.name);
                return status;
            }
            Command::GetM | Command::GetS | Command::PutM => {}
            _ => return Status::CommandError,
        }

        // Write back the victim, choosing the channel from the pair of local
        // and directory states for its address.
        if !hit && victim_state != CoherenceState::Invalid && self.write_policy == WritePolicy::WBack
        {
            self.stats.write_backs += 1;
            let dir_state = self.directory.entry_mut(victim_base).state;
            let snapshot = self.line_snapshot(index, slot);
            match dir_state {
                CoherenceState::Invalid => {
                    let put = if victim_state == CoherenceState::Shared {
                        Command::PutS
                    } else {
                        Command::PutM
                    };
                    let (st, _) = self.send_down(
                        sys,
                        put,
                        victim_base,
                        self.line_size,
                        snapshot,
                        NodeId::NONE,
                        delay,
                        ts,
                    );
                    status = st;
                }
                CoherenceState::Shared => {
                    if victim_state == CoherenceState::Modified {
                        // Children still share the line; only our dirty copy
                        // leaves. Refresh the home through the read channel
                        // so it does not tear down the sharer vector.
                        let (st, _) = self.send_down(
                            sys,
                            Command::GetS,
                            victim_base,
                            self.line_size,
                            snapshot,
                            NodeId::NONE,
                            delay,
                            ts,
                        );
                        status = st;
                    }
                }
                CoherenceState::Modified => {}
            }
            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
        }

        if !hit && self.alloc_policy == AllocationPolicy::WAllocate {
            let line = self.sets[index].line_mut(slot);
            line.set_new_line(addr, tag);
            line.evict_handle = handle;
        }

        match command {
            Command::PutM => {
                // Replacement above; the line up there was Modified.
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
            Command::GetS => {
                let entry = self.directory.entry_mut(addr).clone();
                match entry.state {
                    CoherenceState::Invalid => {
                        if !hit {
                            let buf = self.scratch(self.line_size);
                            let (st, fetched) = self.send_down(
                                sys,
                                Command::GetS,
                                addr,
                                self.line_size,
                                buf,
                                id,
                                delay,
                                ts,
                            );
                            status = st;
                            let line = self.sets[index].line_mut(slot);
                            install_fetched(line, fetched);
                            line.set_state(CoherenceState::Shared);
                        }
                        *self.directory.entry_mut(addr) = DirectoryEntry::shared_by(id);
                    }
                    CoherenceState::Shared => {
                        assert!(
                            !entry.sharers.contains(&id),
                            "{}: GetS for {addr:#x} from existing sharer {id}",
                            self.name
                        );
                        if !hit {
                            let (st, fetched) = self.send_fwd(
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
                        }
                        let _ = self.directory.entry_mut(addr).sharers.insert(id);
                    }
                    CoherenceState::Modified => {
                        assert!(
                            entry.owner != id,
                            "{}: GetS for {addr:#x} from its own owner {id}",
                            self.name
                        );
                        let (st, fetched) = self.send_fwd(
                            sys,
                            Command::FwdGetS,
                            addr,
                            Delivery::to(entry.owner),
                            delay,
                            ts,
                        );
                        status = st;
                        let line = self.sets[index].line_mut(slot);
                        install_fetched(line, fetched);
                        line.set_state(CoherenceState::Modified);
                        let mut next = DirectoryEntry::shared_by(id);
                        let _ = next.sharers.insert(entry.owner);
                        *self.directory.entry_mut(addr) = next;
                    }
                }
                copy_line_to_payload(self.sets[index].line(slot), 0, data.as_deref_mut());
                self.stats.get_s += 1;
            }
            Command::GetM => {
                let entry = self.directory.entry_mut(addr).clone();
                match entry.state {
                    CoherenceState::Invalid => {
                        if self.sets[index].line(slot).state() != CoherenceState::Modified {
                            let buf = self.scratch(self.line_size);
                            let (st, fetched) = self.send_down(
                                sys,
                                Command::GetM,
                                addr,
                                self.line_size,
                                buf,
                                id,
                                delay,
                                ts,
                            );
                            status = st;
                            install_fetched(self.sets[index].line_mut(slot), fetched);
                        }
                        *self.directory.entry_mut(addr) = DirectoryEntry::modified(id);
                    }
                    CoherenceState::Shared => {
                        if self.sets[index].line(slot).state() != CoherenceState::Modified {
                            let buf = self.scratch(self.line_size);
                            let (st, fetched) = self.send_down(
                                sys,
                                Command::GetM,
                                addr,
                                self.line_size,
                                buf,
                                id,
                                delay,
                                ts,
                            );
                            status = st;
                            install_fetched(self.sets[index].line_mut(slot), fetched);
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
                        if entry.owner != id {
                            let (st, fetched) = self.send_fwd(
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
                        }
                        // A GetM from the registered owner is a no-op.
                    }
                }
                let line = self.sets[index].line_mut(slot);
                line.set_state(CoherenceState::Shared);
                copy_line_to_payload(line, 0, data.as_deref_mut());
                self.stats.get_m += 1;
            }
            _ => unreachable!(),
        }
        self.directory.assert_consistent(addr, &self.name);
        status
    }

    /// Forwards a request upstream and returns the responder's data.
    fn send_fwd(
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
