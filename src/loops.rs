//! Closed geodesic rings and the authoritative point-in-polygon test.
//!
//! A [`Loop`] is an ordered ring of at least three unit-sphere points whose
//! edges are geodesic arcs; the interior is the region on the left when
//! walking the vertices in order. Containment is decided by counting edge
//! crossings of the arc from a fixed reference point to the query point, so
//! every loop records at build time whether it contains that reference
//! point — and rings that do are rejected as invalid input, together with
//! empty and degenerate rings.

use bytes::{Buf, BufMut};

use crate::error::{FenceError, Result};
use crate::predicates::{edge_or_vertex_crossing, ordered_ccw, UnitVec};

/// Fixed point assumed to lie outside every indexed ring. Kept well away
/// from common data (near the north pole, off any meridian or face axis).
pub(crate) fn reference_point() -> UnitVec {
    UnitVec::new(0.0068, -0.0051, 1.0).normalized()
}

/// First byte of the binary loop encoding.
const ENCODING_VERSION: u8 = 1;

/// A closed ring of unit-sphere points.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    vertices: Vec<UnitVec>,
    /// Whether the fixed reference point lies inside this ring; the crossing
    /// parity in [`Loop::contains_point`] starts from this.
    ref_inside: bool,
}

impl Loop {
    /// Builds a loop from interleaved `[lng, lat, lng, lat, …]` degrees
    /// forming a closed ring. A trailing vertex equal to the first is
    /// stripped. Rejects rings with fewer than three distinct points, an odd
    /// coordinate count, or a ring that contains the reference point.
    pub fn from_flat_coords(coords: &[f64]) -> Result<Loop> {
        if coords.len() % 2 != 0 {
            return Err(FenceError::InvalidGeometry(
                "odd coordinate count".to_string(),
            ));
        }
        if coords.len() < 6 {
            return Err(FenceError::InvalidGeometry(
                "closed ring needs at least 3 points".to_string(),
            ));
        }
        let mut vertices: Vec<UnitVec> = coords
            .chunks_exact(2)
            .map(|c| UnitVec::from_degrees(c[1], c[0]))
            .collect();
        if vertices.len() > 1 && vertices[0] == vertices[vertices.len() - 1] {
            vertices.pop();
        }
        Self::from_vertices(vertices)
    }

    /// Builds a loop from unit-sphere vertices (no closing duplicate).
    pub fn from_vertices(vertices: Vec<UnitVec>) -> Result<Loop> {
        if vertices.len() < 3 {
            return Err(FenceError::InvalidGeometry(
                "ring degenerates to fewer than 3 distinct points".to_string(),
            ));
        }
        let mut l = Loop {
            vertices,
            ref_inside: false,
        };
        l.init_ref_inside();
        if l.ref_inside {
            return Err(FenceError::InvalidGeometry(
                "ring contains the reference point".to_string(),
            ));
        }
        Ok(l)
    }

    /// Determines whether the reference point is inside the ring.
    ///
    /// Vertex 1 is tested twice: once locally, by checking whether the
    /// interior wedge at vertex 1 contains an arbitrary orthogonal
    /// direction, and once globally by crossing parity assuming the
    /// reference point is outside. If the two disagree, the reference point
    /// is inside.
    fn init_ref_inside(&mut self) {
        let v0 = self.vertices[0];
        let v1 = self.vertices[1];
        let v2 = self.vertices[2];
        let wedge_inside = ordered_ccw(v1.ortho(), v0, v2, v1);
        self.ref_inside = false;
        if wedge_inside != self.contains_point(v1) {
            self.ref_inside = true;
        }
    }

    /// Number of vertices in the ring.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[UnitVec] {
        &self.vertices
    }

    /// Exact point-in-loop test: parity of geodesic crossings between the
    /// arc `reference → p` and the ring's edges.
    pub fn contains_point(&self, p: UnitVec) -> bool {
        let anchor = reference_point();
        let mut inside = self.ref_inside;
        let n = self.vertices.len();
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            if edge_or_vertex_crossing(anchor, p, a, b) {
                inside = !inside;
            }
        }
        inside
    }

    /// True when `p` is bitwise equal to one of the ring's vertices. Used by
    /// the shape strategy to implement the open vertex model.
    pub fn has_vertex(&self, p: UnitVec) -> bool {
        self.vertices.iter().any(|v| *v == p)
    }

    /// Stable binary encoding: version byte, big-endian vertex count, then
    /// little-endian xyz doubles. Bitwise round-trip with [`Loop::decode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 4 + self.vertices.len() * 24);
        buf.put_u8(ENCODING_VERSION);
        buf.put_u32(self.vertices.len() as u32);
        for v in &self.vertices {
            buf.put_f64_le(v.x);
            buf.put_f64_le(v.y);
            buf.put_f64_le(v.z);
        }
        buf
    }

    /// Decodes a blob produced by [`Loop::encode`].
    pub fn decode(mut data: &[u8]) -> Result<Loop> {
        if data.len() < 5 {
            return Err(FenceError::Corruption("loop blob truncated".to_string()));
        }
        let version = data.get_u8();
        if version != ENCODING_VERSION {
            return Err(FenceError::Corruption(format!(
                "unsupported loop encoding version {version}"
            )));
        }
        let count = data.get_u32() as usize;
        if data.len() != count * 24 {
            return Err(FenceError::Corruption(format!(
                "loop blob length mismatch: {} vertices, {} bytes",
                count,
                data.len()
            )));
        }
        let mut vertices = Vec::with_capacity(count);
        for _ in 0..count {
            let x = data.get_f64_le();
            let y = data.get_f64_le();
            let z = data.get_f64_le();
            vertices.push(UnitVec::new(x, y, z));
        }
        Loop::from_vertices(vertices)
    }

    /// Ring as interleaved `[lng, lat, …]` degrees with the first vertex
    /// repeated as the last, suitable for GeoJSON-style output.
    pub fn coordinates(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity((self.vertices.len() + 1) * 2);
        for v in &self.vertices {
            let (lat, lng) = v.to_degrees();
            out.push(lng);
            out.push(lat);
        }
        out.push(out[0]);
        out.push(out[1]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lng0: f64, lat0: f64, lng1: f64, lat1: f64) -> Vec<f64> {
        vec![lng0, lat0, lng1, lat0, lng1, lat1, lng0, lat1, lng0, lat0]
    }

    #[test]
    fn rejects_odd_coordinate_count() {
        let err = Loop::from_flat_coords(&[0.0, 0.0, 1.0, 0.0, 1.0]).unwrap_err();
        assert!(matches!(err, FenceError::InvalidGeometry(_)));
    }

    #[test]
    fn rejects_too_few_points() {
        let err = Loop::from_flat_coords(&[0.0, 0.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, FenceError::InvalidGeometry(_)));
    }

    #[test]
    fn rejects_ring_collapsing_to_two_points() {
        // Three input pairs, but the last equals the first.
        let err = Loop::from_flat_coords(&[0.0, 0.0, 1.0, 0.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, FenceError::InvalidGeometry(_)));
    }

    #[test]
    fn strips_closing_duplicate() {
        let l = Loop::from_flat_coords(&square(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert_eq!(l.num_vertices(), 4);
    }

    #[test]
    fn contains_center_of_unit_square() {
        let l = Loop::from_flat_coords(&square(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert!(l.contains_point(UnitVec::from_degrees(0.5, 0.5)));
        assert!(!l.contains_point(UnitVec::from_degrees(2.0, 2.0)));
        assert!(!l.contains_point(UnitVec::from_degrees(-0.5, 0.5)));
    }

    #[test]
    fn contains_works_across_the_antimeridian() {
        // Ring straddling lng = 180.
        let coords = vec![
            179.0, -1.0, //
            -179.0, -1.0, //
            -179.0, 1.0, //
            179.0, 1.0, //
            179.0, -1.0,
        ];
        let l = Loop::from_flat_coords(&coords).unwrap();
        assert!(l.contains_point(UnitVec::from_degrees(0.0, 180.0)));
        assert!(l.contains_point(UnitVec::from_degrees(0.5, 179.5)));
        assert!(l.contains_point(UnitVec::from_degrees(0.5, -179.5)));
        assert!(!l.contains_point(UnitVec::from_degrees(0.0, 178.0)));
        assert!(!l.contains_point(UnitVec::from_degrees(0.0, 0.0)));
    }

    #[test]
    fn southern_hemisphere_ring() {
        let l = Loop::from_flat_coords(&square(10.0, -45.0, 12.0, -43.0)).unwrap();
        assert!(l.contains_point(UnitVec::from_degrees(-44.0, 11.0)));
        assert!(!l.contains_point(UnitVec::from_degrees(44.0, 11.0)));
    }

    #[test]
    fn clockwise_ring_containing_reference_is_rejected() {
        // Reversing the vertex order turns the small square inside-out; the
        // interior then covers nearly the whole sphere including the
        // reference point.
        let mut coords = square(0.0, 0.0, 1.0, 1.0);
        let pairs: Vec<[f64; 2]> = coords.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        coords = pairs.iter().rev().flatten().copied().collect();
        let err = Loop::from_flat_coords(&coords).unwrap_err();
        assert!(matches!(err, FenceError::InvalidGeometry(_)));
    }

    #[test]
    fn encode_decode_round_trip_is_bitwise() {
        let l = Loop::from_flat_coords(&square(-73.99, 40.73, -73.97, 40.75)).unwrap();
        let blob = l.encode();
        let back = Loop::decode(&blob).unwrap();
        assert_eq!(l, back);
        assert_eq!(blob, back.encode());
    }

    #[test]
    fn decode_rejects_truncated_blob() {
        let l = Loop::from_flat_coords(&square(0.0, 0.0, 1.0, 1.0)).unwrap();
        let blob = l.encode();
        let err = Loop::decode(&blob[..blob.len() - 3]).unwrap_err();
        assert!(matches!(err, FenceError::Corruption(_)));
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let l = Loop::from_flat_coords(&square(0.0, 0.0, 1.0, 1.0)).unwrap();
        let mut blob = l.encode();
        blob[0] = 9;
        let err = Loop::decode(&blob).unwrap_err();
        assert!(matches!(err, FenceError::Corruption(_)));
    }

    #[test]
    fn coordinates_close_the_ring() {
        let l = Loop::from_flat_coords(&square(0.0, 0.0, 1.0, 1.0)).unwrap();
        let coords = l.coordinates();
        assert_eq!(coords.len(), 10);
        assert_eq!(coords[0], coords[8]);
        assert_eq!(coords[1], coords[9]);
    }

    #[test]
    fn vertex_membership() {
        let l = Loop::from_flat_coords(&square(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert!(l.has_vertex(UnitVec::from_degrees(0.0, 0.0)));
        assert!(!l.has_vertex(UnitVec::from_degrees(0.5, 0.5)));
    }
}
