//! Mesh coordinates and XY dimension-ordered routing.
//!
//! Routes are computed X-first, then Y, which is deadlock-free by
//! construction on a 2D mesh. A route lists every router the packet
//! traverses together with the output port it leaves through, and always
//! ends with the local (`L`) port at the destination router.

use serde::Deserialize;

/// Output port of a mesh router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    /// Toward decreasing y.
    North,
    /// Toward increasing y.
    South,
    /// Toward increasing x.
    East,
    /// Toward decreasing x.
    West,
    /// Ejection to the attached component.
    Local,
}

impl Port {
    /// Dense index used for per-router buffer arrays.
    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            Port::North => 0,
            Port::South => 1,
            Port::East => 2,
            Port::West => 3,
            Port::Local => 4,
        }
    }
}

/// Coordinates of a router in the mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct MeshPos {
    /// Column, in `[0, mesh_x)`.
    pub x: u32,
    /// Row, in `[0, mesh_y)`.
    pub y: u32,
}

impl MeshPos {
    /// Creates a position.
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// One step of a route: the router traversed and the port left through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hop {
    /// Router column.
    pub x: u32,
    /// Router row.
    pub y: u32,
    /// Output port taken at this router.
    pub port: Port,
}

/// An XY route through the mesh, ending with the destination's local port.
pub type Route = Vec<Hop>;

/// Manhattan distance between two routers.
#[inline]
pub fn manhattan(src: MeshPos, dst: MeshPos) -> u64 {
    (u64::from(src.x.max(dst.x)) - u64::from(src.x.min(dst.x)))
        + (u64::from(src.y.max(dst.y)) - u64::from(src.y.min(dst.y)))
}

/// Computes the strict XY dimension-ordered route from `src` to `dst`.
///
/// The X dimension is resolved first (West or East), then Y (North or
/// South), then the local port. `src == dst` yields the single-hop route
/// `[(dst, L)]`.
pub fn xy_route(src: MeshPos, dst: MeshPos) -> Route {
    let mut path = Route::with_capacity(manhattan(src, dst) as usize + 1);
    if dst.x < src.x {
        let mut x = src.x;
        while x > dst.x {
            path.push(Hop { x, y: src.y, port: Port::West });
            x -= 1;
        }
    } else {
        let mut x = src.x;
        while x < dst.x {
            path.push(Hop { x, y: src.y, port: Port::East });
            x += 1;
        }
    }
    if dst.y < src.y {
        let mut y = src.y;
        while y > dst.y {
            path.push(Hop { x: dst.x, y, port: Port::North });
            y -= 1;
        }
    } else {
        let mut y = src.y;
        while y < dst.y {
            path.push(Hop { x: dst.x, y, port: Port::South });
            y += 1;
        }
    }
    path.push(Hop { x: dst.x, y: dst.y, port: Port::Local });
    path
}
