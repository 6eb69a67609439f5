//! Memory-mapped backing stores and their latency models.
//!
//! This module provides:
//! 1. **`MemoryController`:** A pluggable latency model per target —
//!    `SimpleController` (fixed latency) and `DramController` (row-buffer
//!    CAS/RAS/precharge timing).
//! 2. **`MemoryTarget`:** A byte store behind an address range; the leaf of
//!    every transport chain and the source of truth for data round-trips.

use crate::common::{Command, Payload, Status};
use crate::config::{MemoryConfig, MemoryModel};

/// Trait for memory latency models reporting access time in nanoseconds.
pub trait MemoryController {
    /// Returns the time in nanoseconds an access to `addr` takes.
    fn access_latency(&mut self, addr: u64) -> u64;
}

/// Fixed-latency model; every access takes the same time.
#[derive(Debug)]
pub struct SimpleController {
    latency: u64,
}

impl SimpleController {
    /// Creates a model with the given fixed latency in nanoseconds.
    pub fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl MemoryController for SimpleController {
    fn access_latency(&mut self, _addr: u64) -> u64 {
        self.latency
    }
}

/// DRAM-style model with a row buffer; models CAS, RAS, and precharge.
#[derive(Debug)]
pub struct DramController {
    last_row: Option<u64>,
    t_cas: u64,
    t_ras: u64,
    t_pre: u64,
    row_mask: u64,
}

impl DramController {
    /// Creates a model with the given timing parameters (nanoseconds).
    pub fn new(t_cas: u64, t_ras: u64, t_pre: u64) -> Self {
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !2047,
        }
    }
}

impl MemoryController for DramController {
    fn access_latency(&mut self, addr: u64) -> u64 {
        let row = addr & self.row_mask;
        match self.last_row {
            Some(open_row) if open_row == row => self.t_cas,
            Some(_) => {
                self.last_row = Some(row);
                self.t_pre + self.t_ras + self.t_cas
            }
            None => {
                self.last_row = Some(row);
                self.t_ras + self.t_cas
            }
        }
    }
}

/// A memory-mapped backing store: the terminal target of the hierarchy.
pub struct MemoryTarget {
    name: String,
    base: u64,
    size: u64,
    store: Vec<u8>,
    controller: Box<dyn MemoryController>,
}

impl std::fmt::Debug for MemoryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTarget")
            .field("name", &self.name)
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &self.size)
            .finish()
    }
}

impl MemoryTarget {
    /// Builds a target from its configuration, zero-filled.
    pub fn new(config: &MemoryConfig) -> Self {
        let controller: Box<dyn MemoryController> = match config.model {
            MemoryModel::Simple => Box::new(SimpleController::new(config.latency)),
            MemoryModel::Dram => {
                Box::new(DramController::new(config.t_cas, config.t_ras, config.t_pre))
            }
        };
        Self {
            name: config.name.clone(),
            base: config.range.base,
            size: config.range.size,
            store: vec![0; config.range.size as usize],
            controller,
        }
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Services a leaf `Read`/`Write`, adding the model's latency.
    pub fn transport(&mut self, payload: &mut Payload, delay: &mut u64) -> Status {
        let addr = payload.address;
        let len = payload.length;
        if addr < self.base || addr + len as u64 > self.base + self.size {
            payload.status = Status::AddressError;
            return Status::AddressError;
        }
        *delay += self.controller.access_latency(addr);
        let offset = (addr - self.base) as usize;
        let status = match payload.command {
            Command::Read => {
                if let Some(buf) = payload.data.as_deref_mut() {
                    buf[..len].copy_from_slice(&self.store[offset..offset + len]);
                }
                Status::Ok
            }
            Command::Write => {
                if let Some(buf) = payload.data.as_deref() {
                    self.store[offset..offset + len].copy_from_slice(&buf[..len]);
                }
                Status::Ok
            }
            _ => Status::CommandError,
        };
        payload.status = status;
        status
    }

    /// Direct backdoor read for loaders and test harnesses.
    pub fn peek(&self, addr: u64, buf: &mut [u8]) {
        let offset = (addr - self.base) as usize;
        buf.copy_from_slice(&self.store[offset..offset + buf.len()]);
    }

    /// Direct backdoor write for loaders and test harnesses.
    pub fn poke(&mut self, addr: u64, data: &[u8]) {
        let offset = (addr - self.base) as usize;
        self.store[offset..offset + data.len()].copy_from_slice(data);
    }
}
