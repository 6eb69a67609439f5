//! Configuration parsing and validation.

use vpsim_core::MemorySystem;
use vpsim_core::common::ConfigError;
use vpsim_core::config::{
    CacheLevel, InclusionPolicy, NocConfig, PlatformConfig, ReplacementPolicy, WritePolicy,
};

use crate::common::harness;

#[test]
fn json_platform_deserializes_with_aliases() {
    let json = r#"{
        "coherent": true,
        "caches": [
            { "name": "l1_0", "id": 0, "size": 1024, "line_size": 64,
              "repl_policy": "MRU", "writing_policy": "WThrough",
              "inclusion_lower": "NINE",
              "is_coherent": true, "level": "1", "data_support": true },
            { "name": "llc", "id": 8, "size": 16384, "associativity": 4,
              "repl_policy": "LRU",
              "is_coherent": true, "is_home": true, "level": "LLC",
              "range": { "base": 2147483648, "size": 65536 } }
        ],
        "memories": [
            { "name": "ram0",
              "range": { "base": 2147483648, "size": 65536 },
              "model": "DRAM" }
        ],
        "noc": { "is_mesh": true, "mesh_x": 2, "mesh_y": 2,
                 "virtual_channels": 2, "buffer_size": 4 }
    }"#;

    let config: PlatformConfig = serde_json::from_str(json).unwrap();
    assert!(config.coherent);
    assert_eq!(config.caches[0].repl_policy, ReplacementPolicy::Mru);
    assert_eq!(config.caches[0].writing_policy, WritePolicy::WThrough);
    assert_eq!(config.caches[0].inclusion_lower, InclusionPolicy::Nine);
    assert_eq!(config.caches[0].level, CacheLevel::L1);
    assert_eq!(config.caches[1].level, CacheLevel::Llc);
    // Defaults fill what the description omits.
    assert_eq!(config.caches[0].associativity, 1);
    assert_eq!(config.noc.flit_size, 8);

    // And the whole thing elaborates.
    assert!(MemorySystem::build(&config).is_ok());
}

#[test]
fn non_power_of_two_line_size_is_rejected() {
    let mut cache = harness::cache_template("bad", 0);
    cache.line_size = 48;
    cache.is_home = true;
    cache.range = Some(vpsim_core::config::AddressRange {
        base: harness::RAM_BASE,
        size: harness::RAM_SIZE,
    });
    let config = PlatformConfig {
        coherent: false,
        caches: vec![cache],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::BadCacheGeometry { .. })
    ));
}

#[test]
fn zero_associativity_is_rejected() {
    let mut cache = harness::cache_template("bad", 0);
    cache.associativity = 0;
    let config = PlatformConfig {
        coherent: false,
        caches: vec![cache],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::BadCacheGeometry { .. })
    ));
}

#[test]
fn duplicate_cache_ids_are_rejected() {
    let config = PlatformConfig {
        coherent: true,
        caches: vec![harness::l1("a", 3), harness::l1("b", 3), harness::llc(8)],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::DuplicateNodeId { id: 3, .. })
    ));
}

#[test]
fn home_without_range_is_rejected() {
    let mut home = harness::llc(8);
    home.range = None;
    let config = PlatformConfig {
        coherent: true,
        caches: vec![harness::l1("l1_0", 0), home],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::HomeWithoutRange { .. })
    ));
}

#[test]
fn unknown_downstream_is_rejected() {
    let mut cache = harness::cache_template("upper", 0);
    cache.below = Some("nope".to_string());
    let config = PlatformConfig {
        coherent: false,
        caches: vec![cache],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc: NocConfig::default(),
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::UnknownDownstream { .. })
    ));
}

#[test]
fn zero_virtual_channels_is_rejected() {
    let noc = NocConfig {
        is_mesh: true,
        virtual_channels: 0,
        ..NocConfig::default()
    };
    let config = PlatformConfig {
        coherent: false,
        caches: vec![],
        memories: vec![harness::ram("ram0")],
        devices: vec![],
        noc,
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::BadNocParameter { .. })
    ));
}

#[test]
fn position_outside_mesh_is_rejected() {
    let noc = NocConfig {
        is_mesh: true,
        mesh_x: 2,
        mesh_y: 2,
        ..NocConfig::default()
    };
    let mut mem = harness::ram("ram0");
    mem.position = vpsim_core::config::Position { x: 5, y: 0 };
    let config = PlatformConfig {
        coherent: false,
        caches: vec![],
        memories: vec![mem],
        devices: vec![],
        noc,
    };
    assert!(matches!(
        MemorySystem::build(&config),
        Err(ConfigError::PositionOutsideMesh { .. })
    ));
}
