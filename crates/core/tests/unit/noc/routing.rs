//! XY dimension-ordered routing.
//!
//! Routes resolve the X dimension first, then Y, and always end with the
//! local port at the destination router.

use proptest::prelude::*;
use vpsim_core::noc::route::{Hop, MeshPos, Port, manhattan, xy_route};

/// 3x3 mesh, (0,0) to (2,1): two hops East, one South, then local.
#[test]
fn route_east_then_south() {
    let route = xy_route(MeshPos::new(0, 0), MeshPos::new(2, 1));
    assert_eq!(
        route,
        vec![
            Hop { x: 0, y: 0, port: Port::East },
            Hop { x: 1, y: 0, port: Port::East },
            Hop { x: 2, y: 0, port: Port::South },
            Hop { x: 2, y: 1, port: Port::Local },
        ]
    );
    assert_eq!(manhattan(MeshPos::new(0, 0), MeshPos::new(2, 1)), 3);
}

/// Westward and northward travel use the opposite ports.
#[test]
fn route_west_then_north() {
    let route = xy_route(MeshPos::new(2, 2), MeshPos::new(0, 1));
    assert_eq!(
        route,
        vec![
            Hop { x: 2, y: 2, port: Port::West },
            Hop { x: 1, y: 2, port: Port::West },
            Hop { x: 0, y: 2, port: Port::North },
            Hop { x: 0, y: 1, port: Port::Local },
        ]
    );
}

/// Source equal to destination produces the single local hop.
#[test]
fn route_to_self_is_local_only() {
    let route = xy_route(MeshPos::new(1, 1), MeshPos::new(1, 1));
    assert_eq!(route, vec![Hop { x: 1, y: 1, port: Port::Local }]);
}

proptest! {
    /// For any pair of routers the route visits `(sx..dx, sy)` then
    /// `(dx, sy..dy)` exactly once, ends with a local port at the
    /// destination, and has Manhattan-distance-plus-one entries.
    #[test]
    fn xy_route_is_dimension_ordered(sx in 0u32..8, sy in 0u32..8, dx in 0u32..8, dy in 0u32..8) {
        let src = MeshPos::new(sx, sy);
        let dst = MeshPos::new(dx, dy);
        let route = xy_route(src, dst);

        prop_assert_eq!(route.len() as u64, manhattan(src, dst) + 1);
        let last = route.last().unwrap();
        prop_assert_eq!((last.x, last.y, last.port), (dx, dy, Port::Local));

        // X phase strictly precedes the Y phase.
        let mut y_seen = false;
        for hop in &route {
            match hop.port {
                Port::East | Port::West => {
                    prop_assert!(!y_seen, "X travel after Y travel");
                    prop_assert_eq!(hop.y, sy);
                }
                Port::North | Port::South => {
                    y_seen = true;
                    prop_assert_eq!(hop.x, dx);
                }
                Port::Local => {}
            }
        }

        // Each router appears at most once.
        let mut seen = std::collections::HashSet::new();
        for hop in &route {
            prop_assert!(seen.insert((hop.x, hop.y)), "router visited twice");
        }
    }
}
