//! Access engine for private coherent caches (L1).
//!
//! Drives the MSI state machine for a cache owned by a single initiator.
//! `Read`/`Write` arrive from the initiator; the coherence commands arrive
//! from the directory below. Permission is acquired with `GetS`/`GetM`,
//! relinquished with `PutS`/`PutM` on replacement, and revoked by
//! `FwdGetS`/`FwdGetM`/`PutI`/`InvS`/`InvM` from below.

use crate::cache::line::CoherenceState;
use crate::cache::{CacheController, copy_line_to_payload, copy_payload_to_line, install_fetched};
use crate::common::{Command, NodeId, Status};
use crate::config::{AllocationPolicy, InclusionPolicy, WritePolicy};
use crate::system::MemorySystem;

impl CacheController {
    /// Services one (possibly line-spanning) access to a private cache.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn access_private(
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
        let mut status = Status::Ok;
        let (hit, slot) = self.sets[index].access(tag);
        let (line_base, line_state, victim_handle) = {
            let line = self.sets[index].line(slot);
            (line.base_address(), line.state(), line.evict_handle)
        };

        // Hit convention: a read hits in any valid state; a write hits only
        // with full (Modified) permission.
        match command {
            Command::Read => {
                if hit {
                    self.stats.hits += 1;
                } else {
                    self.stats.misses += 1;
                }
            }
            Command::Write => {
                if hit && line_state == CoherenceState::Modified {
                    self.stats.hits += 1;
                } else {
                    self.stats.misses += 1;
                }
            }
            _ => {}
        }

        if !hit && line_state == CoherenceState::Shared {
            self.notify_eviction(victim_handle);
        }

        // Non-allocating commands from the directory below.
        match command {
            Command::FwdGetS => {
                assert!(!id.is_none(), "{}: FwdGetS without an initiator", self.name);
                assert!(
                    hit,
                    "{}: FwdGetS for {addr:#x} but the line is not here",
                    self.name
                );
                let line_off = (addr - line_base) as usize;
                copy_line_to_payload(self.sets[index].line(slot), line_off, data);
                self.sets[index].line_mut(slot).set_state(CoherenceState::Shared);
                self.stats.fwd_get_s += 1;
                return status;
            }
            Command::FwdGetM => {
                assert!(!id.is_none(), "{}: FwdGetM without an initiator", self.name);
                assert!(
                    hit,
                    "{}: FwdGetM for {addr:#x} but the line is not here",
                    self.name
                );
                let line_off = (addr - line_base) as usize;
                copy_line_to_payload(self.sets[index].line(slot), line_off, data);
                self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                self.stats.fwd_get_m += 1;
                return status;
            }
            Command::PutI => {
                assert!(
                    hit && line_state == CoherenceState::Shared,
                    "{}: PutI for {addr:#x} in state {line_state:?}",
                    self.name
                );
                self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                self.stats.put_i += 1;
                return status;
            }
            Command::InvS => {
                // Revocation of shared permission.
                self.stats.total_invals += 1;
                assert!(
                    hit && line_state == CoherenceState::Shared,
                    "{}: InvS for {addr:#x} in state {line_state:?}",
                    self.name
                );
                self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                self.stats.invals += 1;
                return status;
            }
            Command::InvM => {
                // Revocation of modified permission: the dirty line leaves
                // through the normal writeback channel.
                self.stats.total_invals += 1;
                assert!(
                    hit && line_state == CoherenceState::Modified,
                    "{}: InvM for {addr:#x} in state {line_state:?}",
                    self.name
                );
                let snapshot = self.line_snapshot(index, slot);
                let (st, _) = self.send_down(
                    sys,
                    Command::PutM,
                    line_base,
                    self.line_size,
                    snapshot,
                    NodeId::NONE,
                    delay,
                    ts,
                );
                status = st;
                self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                self.stats.invals += 1;
                return status;
            }
            Command::Read | Command::Write => {}
            _ => return Status::CommandError,
        }

        // Write back the victim before repurposing its frame.
        if !hit && line_state != CoherenceState::Invalid && self.write_policy == WritePolicy::WBack {
            self.stats.write_backs += 1;
            let snapshot = self.line_snapshot(index, slot);
            let put = match line_state {
                CoherenceState::Modified => Command::PutM,
                CoherenceState::Shared => Command::PutS,
                CoherenceState::Invalid => unreachable!(),
            };
            let (st, _) = self.send_down(
                sys,
                put,
                line_base,
                self.line_size,
                snapshot,
                NodeId::NONE,
                delay,
                ts,
            );
            status = st;
            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
        }
        // Clean victim migrates into an exclusive lower level.
        if !hit
            && line_state == CoherenceState::Shared
            && self.inclusion_lower == InclusionPolicy::Exclusive
        {
            let snapshot = self.line_snapshot(index, slot);
            status = self.forward_evict(sys, line_base, self.line_size, snapshot, delay, ts);
            self.stats.evict_backs += 1;
        }

        if !hit && self.alloc_policy == AllocationPolicy::WAllocate {
            let line = self.sets[index].line_mut(slot);
            line.set_new_line(addr - offset as u64, tag);
            line.evict_handle = handle;
        }
        let line_base = addr - offset as u64;
        let access_size = len.min(self.line_size - offset);

        match command {
            Command::Read => {
                if !hit {
                    let buf = self.scratch(self.line_size);
                    let (st, fetched) = self.send_down(
                        sys,
                        Command::GetS,
                        line_base,
                        self.line_size,
                        buf,
                        NodeId::NONE,
                        delay,
                        ts,
                    );
                    status = st;
                    let line = self.sets[index].line_mut(slot);
                    install_fetched(line, fetched);
                    line.set_state(CoherenceState::Shared);
                }
                if let Some(dst) = data.as_deref_mut() {
                    copy_line_to_payload(
                        self.sets[index].line(slot),
                        offset,
                        Some(&mut dst[..access_size]),
                    );
                }
                self.stats.reads += 1;
            }
            Command::Write => {
                if self.sets[index].line(slot).state() != CoherenceState::Modified {
                    let buf = self.scratch(self.line_size);
                    let (st, fetched) = self.send_down(
                        sys,
                        Command::GetM,
                        line_base,
                        self.line_size,
                        buf,
                        NodeId::NONE,
                        delay,
                        ts,
                    );
                    status = st;
                    let line = self.sets[index].line_mut(slot);
                    install_fetched(line, fetched);
                    line.set_state(CoherenceState::Modified);
                }
                copy_payload_to_line(
                    self.sets[index].line_mut(slot),
                    offset,
                    data.as_deref().map(|d| &d[..access_size]),
                );
                self.stats.writes += 1;
            }
            _ => unreachable!(),
        }

        if len > access_size {
            let rest = data.map(|d| &mut d[access_size..]);
            status = self.access_private(
                sys,
                command,
                rest,
                len - access_size,
                addr + access_size as u64,
                id,
                delay,
                ts,
                handle,
            );
        }
        status
    }
}
