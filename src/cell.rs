//! Cell algebra on top of the `s2` hierarchical grid.
//!
//! Cells are identified by a 64-bit id along a space-filling curve over the
//! six cube faces; a cell at level `l` spans the contiguous id interval
//! `[range_min, range_max]` of all its descendants. The `s2` crate supplies
//! the curve itself (lat/lng to leaf id, parent navigation, corner
//! geometry); the interval arithmetic lives here.

use s2::cell::Cell;
use s2::cellid::CellID;
use s2::latlng::LatLng;

use crate::predicates::UnitVec;

/// Deepest subdivision level of the grid.
pub const MAX_LEVEL: u8 = 30;

/// Number of top-level face cells.
pub const NUM_FACES: u8 = 6;

/// Leaf cell (level 30) containing the given location.
pub fn leaf_from_degrees(lat: f64, lng: f64) -> CellID {
    CellID::from(LatLng::from_degrees(lat, lng))
}

/// Leaf cell containing a unit-sphere point.
pub fn leaf_from_point(p: UnitVec) -> CellID {
    let (lat, lng) = p.to_degrees();
    leaf_from_degrees(lat, lng)
}

/// The six level-0 face cells, in face order.
pub fn face_cells() -> [CellID; NUM_FACES as usize] {
    let mut faces = [CellID(0); NUM_FACES as usize];
    for (face, slot) in faces.iter_mut().enumerate() {
        *slot = CellID(((face as u64) << 61) | (1u64 << 60));
    }
    faces
}

/// Subdivision level of `c`, derived from the position of its lowest set bit.
pub fn level(c: CellID) -> u8 {
    MAX_LEVEL - (c.0.trailing_zeros() / 2) as u8
}

/// True when `b` lies inside the id interval spanned by `a`.
pub fn contains(a: CellID, b: CellID) -> bool {
    a.range_min().0 <= b.0 && b.0 <= a.range_max().0
}

/// Ancestor of `c` at `target_level` (callers ensure `target_level <= level(c)`).
pub fn parent(c: CellID, target_level: u8) -> CellID {
    c.parent(u64::from(target_level))
}

/// The four children of a non-leaf cell, in curve order.
pub fn children(c: CellID) -> [CellID; 4] {
    debug_assert!(level(c) < MAX_LEVEL);
    let lsb = c.0 & c.0.wrapping_neg();
    let child_lsb = lsb >> 2;
    let base = c.0 - lsb;
    [
        CellID(base + child_lsb),
        CellID(base + 3 * child_lsb),
        CellID(base + 5 * child_lsb),
        CellID(base + 7 * child_lsb),
    ]
}

/// The four corner vertices of a cell, as unit vectors in CCW order. Cell
/// edges are geodesic arcs between consecutive corners.
pub fn corners(c: CellID) -> [UnitVec; 4] {
    let cell = Cell::from(&c);
    let mut out = [UnitVec::new(0.0, 0.0, 0.0); 4];
    for (k, slot) in out.iter_mut().enumerate() {
        let v = cell.vertex(k);
        *slot = UnitVec::new(v.0.x, v.0.y, v.0.z).normalized();
    }
    out
}
