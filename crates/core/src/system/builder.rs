//! Platform assembly from configuration.
//!
//! Elaboration happens once, before any transaction: caches and memories are
//! created, ports and address ranges registered with the fabric, direct
//! links wired between private cache levels, and every user-facing
//! constraint of the description checked. Everything that can be rejected is
//! rejected here; the transport path assumes a well-formed platform.

use std::collections::HashMap;

use crate::cache::{CacheController, DownLink, Role, UpLink};
use crate::common::{ConfigError, NodeId};
use crate::config::PlatformConfig;
use crate::interconnect::CoherentInterconnect;
use crate::noc::route::MeshPos;
use crate::system::MemorySystem;
use crate::system::memory::MemoryTarget;

impl MemorySystem {
    /// Elaborates a platform from its configuration.
    ///
    /// # Errors
    ///
    /// Any violated construction-time constraint: bad cache geometry,
    /// duplicate node ids, unknown `below` references, homes without
    /// ranges, overlapping ranges, or mesh positions outside the grid.
    pub fn build(config: &PlatformConfig) -> Result<Self, ConfigError> {
        let mut interconnect = CoherentInterconnect::new(config.coherent, &config.noc)?;

        let mut memories = Vec::with_capacity(config.memories.len());
        for (idx, mem) in config.memories.iter().enumerate() {
            interconnect.add_mmapped_output(
                &mem.name,
                mem.range.base,
                mem.range.size,
                idx,
                MeshPos::new(mem.position.x, mem.position.y),
            )?;
            memories.push(MemoryTarget::new(mem));
        }

        // Create the controllers and index them by name for wiring.
        let mut caches = Vec::with_capacity(config.caches.len());
        let mut by_name = HashMap::new();
        let mut by_id: HashMap<u32, String> = HashMap::new();
        for (idx, cc) in config.caches.iter().enumerate() {
            if let Some(first) = by_id.insert(cc.id, cc.name.clone()) {
                return Err(ConfigError::DuplicateNodeId {
                    id: cc.id,
                    first,
                    second: cc.name.clone(),
                });
            }
            let _ = by_name.insert(cc.name.clone(), idx);
            caches.push(Some(CacheController::new(cc)?));
        }

        // Wire direct links: a cache naming `below` talks straight to it,
        // and becomes one of its upstream children.
        let mut children: HashMap<usize, Vec<(NodeId, usize)>> = HashMap::new();
        for (idx, cc) in config.caches.iter().enumerate() {
            if let Some(below) = &cc.below {
                let Some(&below_idx) = by_name.get(below) else {
                    return Err(ConfigError::UnknownDownstream {
                        name: cc.name.clone(),
                        below: below.clone(),
                    });
                };
                if let Some(cache) = caches[idx].as_mut() {
                    cache.down = DownLink::Cache(below_idx);
                }
                children
                    .entry(below_idx)
                    .or_default()
                    .push((NodeId::new(cc.id), idx));
            }
        }

        // Register fabric ports. Homes claim their ranges; every cache that
        // faces the fabric from above is a cache output the directories can
        // reach by id.
        let mut initiators = Vec::new();
        for (idx, cc) in config.caches.iter().enumerate() {
            let pos = MeshPos::new(cc.position.x, cc.position.y);
            let id = NodeId::new(cc.id);
            if cc.is_home {
                let Some(range) = cc.range else {
                    return Err(ConfigError::HomeWithoutRange {
                        name: cc.name.clone(),
                    });
                };
                interconnect.add_home_output(&cc.name, id, range.base, range.size, idx, pos)?;
            } else if cc.below.is_none() {
                interconnect.add_cache_output(&cc.name, id, idx, pos)?;
            }
            let up = if let Some(kids) = children.remove(&idx) {
                UpLink::Direct(kids)
            } else if cc.is_home {
                UpLink::Fabric
            } else {
                UpLink::None
            };
            if let Some(cache) = caches[idx].as_mut() {
                cache.up = up;
                if matches!(cache.role(), Role::Private)
                    || (cache.role() == Role::NonCoherent
                        && cc.level == crate::config::CacheLevel::L1)
                {
                    initiators.push((id, idx));
                }
            }
        }

        for dev in &config.devices {
            interconnect.add_device(&dev.name, NodeId::new(dev.id), MeshPos::new(dev.position.x, dev.position.y))?;
        }

        Ok(Self {
            caches,
            memories,
            interconnect,
            initiators,
        })
    }
}
