//! Access engine for non-coherent caches.
//!
//! Services plain `Read`/`Write` traffic plus the three maintenance commands
//! a non-coherent hierarchy uses: `Invalidate` (back-invalidation from an
//! inclusive lower level), `Evict` (voluntary writeback from a higher
//! exclusive cache), and `ReadBack` (a lower level rereading a line it does
//! not hold in an exclusive hierarchy). Requests that span a line boundary
//! are split into per-line sub-accesses, each re-entering the engine.

use crate::cache::line::CoherenceState;
use crate::cache::{CacheController, copy_line_to_payload, copy_payload_to_line, install_fetched};
use crate::common::{Command, NodeId, Status};
use crate::config::{AllocationPolicy, CacheLevel, InclusionPolicy, WritePolicy};
use crate::system::MemorySystem;

impl CacheController {
    /// Services one (possibly line-spanning) non-coherent access.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn access_non_coherent(
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
        let (victim_base, victim_state, victim_handle) = {
            let line = self.sets[index].line(slot);
            (line.base_address(), line.state(), line.evict_handle)
        };

        assert!(
            !hit || victim_state != CoherenceState::Invalid,
            "{}: hit on an Invalid slot at {addr:#x}",
            self.name
        );

        let counted = matches!(command, Command::Read)
            || (self.level == CacheLevel::L1 && command == Command::Write);
        if counted {
            if hit {
                self.stats.hits += 1;
            } else {
                self.stats.misses += 1;
            }
        }
        if !hit && victim_state == CoherenceState::Shared {
            self.notify_eviction(victim_handle);
        }

        if command == Command::Invalidate {
            // Back-invalidation from below; never allocates.
            self.stats.total_invals += 1;
            if hit {
                if victim_state == CoherenceState::Modified {
                    let snapshot = self.line_snapshot(index, slot);
                    status = self.forward_write(sys, victim_base, self.line_size, snapshot, delay, ts);
                }
                self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                self.stats.invals += 1;
            }
            return status;
        }

        if command == Command::ReadBack {
            assert!(hit, "{}: ReadBack miss at {addr:#x}", self.name);
            self.stats.read_backs += 1;
            let line_off = (addr - victim_base) as usize;
            copy_line_to_payload(self.sets[index].line(slot), line_off, data);
            return status;
        }

        if !hit && self.inclusion_higher == InclusionPolicy::Exclusive && command == Command::Read {
            // Exclusive with the level above: the line lives up there, not
            // here. Serve from the sharers when any exist, else from below,
            // and do not allocate. `addr` is a line base at this level.
            assert!(
                self.level != CacheLevel::L1,
                "{}: an L1 cannot be exclusive with the level above",
                self.name
            );
            self.stats.reads += 1;
            let sharers = self
                .upper_sharers
                .get(&addr)
                .filter(|s| !s.is_empty())
                .cloned();
            let fetched = if let Some(sharers) = sharers {
                let (st, fetched) = self.backward_read(sys, addr, self.line_size, sharers, delay, ts);
                status = st;
                fetched
            } else {
                let (st, fetched) = self.forward_read(sys, addr, self.line_size, delay, ts);
                status = st;
                fetched
            };
            if let (Some(dst), Some(src)) = (data.as_deref_mut(), fetched.as_deref()) {
                dst.copy_from_slice(&src[..dst.len()]);
            }
            let _ = self.upper_sharers.entry(addr).or_default().insert(id);
            return status;
        }

        // Write back the dirty victim before repurposing its slot.
        if !hit && victim_state == CoherenceState::Modified && self.write_policy == WritePolicy::WBack
        {
            self.stats.write_backs += 1;
            let snapshot = self.line_snapshot(index, slot);
            status = self.forward_write(sys, victim_base, self.line_size, snapshot, delay, ts);
            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
        }
        // Push a clean victim into an exclusive lower level.
        if !hit
            && victim_state == CoherenceState::Shared
            && self.inclusion_lower == InclusionPolicy::Exclusive
        {
            let snapshot = self.line_snapshot(index, slot);
            status = self.forward_evict(sys, victim_base, self.line_size, snapshot, delay, ts);
            self.stats.evict_backs += 1;
        }
        // Inclusive with the level above: upper copies of the victim must go.
        if self.inclusion_higher == InclusionPolicy::Inclusive && !hit {
            let sharers = self
                .upper_sharers
                .get(&victim_base)
                .filter(|s| !s.is_empty())
                .cloned();
            if let Some(sharers) = sharers {
                status = self.back_invalidate(sys, victim_base, sharers, delay, ts);
                if let Some(entry) = self.upper_sharers.get_mut(&victim_base) {
                    entry.clear();
                }
                self.stats.back_invals += 1;
            }
        }

        let allocated = !hit && self.alloc_policy == AllocationPolicy::WAllocate;
        if allocated {
            let line = self.sets[index].line_mut(slot);
            line.set_new_line(addr - offset as u64, tag);
            line.evict_handle = handle;
        }

        // Resolve a cross-line span into the per-line portion.
        let access_size = len.min(self.line_size - offset);
        let line_base = addr - offset as u64;

        match command {
            Command::Read => {
                if !hit && !allocated {
                    // Write-around victim left untouched; stream from below.
                    let (st, fetched) =
                        self.forward_read(sys, addr, access_size, delay, ts);
                    status = st;
                    if let (Some(dst), Some(src)) = (data.as_deref_mut(), fetched.as_deref()) {
                        dst[..access_size].copy_from_slice(src);
                    }
                } else {
                    assert!(
                        self.inclusion_higher != InclusionPolicy::Exclusive || hit,
                        "{}: exclusive-above read miss reached the allocating path",
                        self.name
                    );
                    let _ = self.upper_sharers.entry(line_base).or_default().insert(id);
                    if !hit {
                        let (st, fetched) =
                            self.forward_read(sys, line_base, self.line_size, delay, ts);
                        status = st;
                        let line = self.sets[index].line_mut(slot);
                        install_fetched(line, fetched);
                        line.set_state(CoherenceState::Shared);
                    } else if self.inclusion_higher == InclusionPolicy::Exclusive {
                        // The copy migrates upward; drop ours.
                        self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                    }
                    if let Some(dst) = data.as_deref_mut() {
                        copy_line_to_payload(
                            self.sets[index].line(slot),
                            offset,
                            Some(&mut dst[..access_size]),
                        );
                    }
                }
                self.stats.reads += 1;
            }
            Command::Write => {
                if !hit && !allocated {
                    // Write-around: forward the slice, touch nothing local.
                    let portion = data
                        .as_deref()
                        .map(|d| d[..access_size].to_vec());
                    status = self.forward_write(sys, addr, access_size, portion, delay, ts);
                } else {
                    if let Some(entry) = self.upper_sharers.get_mut(&line_base) {
                        let _ = entry.remove(&id);
                    }
                    if self.inclusion_higher == InclusionPolicy::Exclusive && !hit {
                        let held_above = self
                            .upper_sharers
                            .get(&line_base)
                            .is_some_and(|s| !s.is_empty());
                        if held_above {
                            self.sets[index].line_mut(slot).set_state(CoherenceState::Invalid);
                        } else {
                            let (st, fetched) =
                                self.forward_read(sys, line_base, self.line_size, delay, ts);
                            status = st;
                            let line = self.sets[index].line_mut(slot);
                            install_fetched(line, fetched);
                            copy_payload_to_line(
                                line,
                                offset,
                                data.as_deref().map(|d| &d[..access_size]),
                            );
                            line.set_state(CoherenceState::Modified);
                        }
                    } else if self.write_policy == WritePolicy::WThrough {
                        copy_payload_to_line(
                            self.sets[index].line_mut(slot),
                            offset,
                            data.as_deref().map(|d| &d[..access_size]),
                        );
                        let portion = data.as_deref().map(|d| d[..access_size].to_vec());
                        status = self.forward_write(sys, addr, access_size, portion, delay, ts);
                    } else {
                        if !hit {
                            let (st, fetched) =
                                self.forward_read(sys, line_base, self.line_size, delay, ts);
                            status = st;
                            install_fetched(self.sets[index].line_mut(slot), fetched);
                        }
                        let line = self.sets[index].line_mut(slot);
                        copy_payload_to_line(
                            line,
                            offset,
                            data.as_deref().map(|d| &d[..access_size]),
                        );
                        line.set_state(CoherenceState::Modified);
                    }
                    // Inclusive below: push the updated line down to keep the
                    // lower copy current.
                    if self.inclusion_lower == InclusionPolicy::Inclusive {
                        let snapshot = self.line_snapshot(index, slot);
                        status =
                            self.forward_write(sys, line_base, self.line_size, snapshot, delay, ts);
                    }
                }
                self.stats.writes += 1;
            }
            Command::Evict => {
                // Voluntary writeback from a higher exclusive cache.
                assert!(
                    self.inclusion_higher == InclusionPolicy::Exclusive,
                    "{}: Evict received without an exclusive upper level",
                    self.name
                );
                assert!(
                    !hit || victim_state == CoherenceState::Modified,
                    "{}: Evict hit a non-Modified line at {addr:#x}",
                    self.name
                );
                copy_payload_to_line(
                    self.sets[index].line_mut(slot),
                    offset,
                    data.as_deref().map(|d| &d[..access_size]),
                );
                if let Some(entry) = self.upper_sharers.get_mut(&line_base) {
                    let _ = entry.remove(&id);
                }
                let still_above = self
                    .upper_sharers
                    .get(&line_base)
                    .is_some_and(|s| !s.is_empty());
                let line = self.sets[index].line_mut(slot);
                if still_above {
                    line.set_state(CoherenceState::Invalid);
                } else {
                    line.set_state(CoherenceState::Shared);
                }
                self.stats.evictions += 1;
            }
            _ => return Status::CommandError,
        }

        if len > access_size {
            let rest = data.map(|d| &mut d[access_size..]);
            status = self.access_non_coherent(
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
