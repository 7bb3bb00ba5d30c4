//! Hierarchical cell coverings of loops.
//!
//! Two covering flavors drive the index:
//!
//! * **interior** — cells entirely inside the loop; a point in any of them is
//!   inside the polygon with no further test.
//! * **exterior** — cells whose union contains the loop; a point outside all
//!   of them is outside the polygon.
//!
//! Both are produced by the same breadth-first subdivision from the six face
//! cells. A cell disjoint from the loop is discarded, a cell fully inside is
//! emitted (interior) or emitted without descent (exterior), and a cell
//! crossing the boundary is subdivided until `max_level` or the cell budget
//! is reached. The traversal order is fixed, so identical inputs yield
//! identical coverings.

use std::collections::VecDeque;

use s2::cellid::CellID;
use serde::{Deserialize, Serialize};

use crate::cell;
use crate::loops::Loop;
use crate::predicates::crossing_sign;

/// Parameters for one covering pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverConfig {
    /// Coarsest level a cover cell may have.
    pub min_level: u8,
    /// Finest level a cover cell may have.
    pub max_level: u8,
    /// Approximate upper bound on the number of cover cells.
    pub max_cells: usize,
}

impl CoverConfig {
    /// Default parameters for interior covers.
    pub fn interior_default() -> Self {
        Self {
            min_level: 0,
            max_level: 16,
            max_cells: 16,
        }
    }

    /// Default parameters for exterior covers.
    pub fn exterior_default() -> Self {
        Self {
            min_level: 0,
            max_level: 13,
            max_cells: 16,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_level > cell::MAX_LEVEL {
            return Err(format!("max_level must be <= {}", cell::MAX_LEVEL));
        }
        if self.min_level > self.max_level {
            return Err("min_level must be <= max_level".to_string());
        }
        if self.max_cells == 0 {
            return Err("max_cells must be > 0".to_string());
        }
        Ok(())
    }
}

/// How a cell relates to a loop's interior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellRelation {
    Disjoint,
    Intersects,
    Contained,
}

/// Classifies `c` against the loop. Degenerate edge configurations count as
/// boundary crossings, which can only demote `Contained`/`Disjoint` to
/// `Intersects`; both covering flavors stay sound under that demotion.
fn relate(l: &Loop, c: CellID) -> CellRelation {
    let corners = cell::corners(c);
    let mut corners_inside = 0;
    for corner in corners {
        if l.contains_point(corner) {
            corners_inside += 1;
        }
    }

    // Any loop vertex inside the cell means the boundary enters it.
    let vertex_in_cell = l
        .vertices()
        .iter()
        .any(|v| cell::contains(c, cell::leaf_from_point(*v)));

    let mut boundary_crossing = vertex_in_cell;
    if !boundary_crossing {
        let verts = l.vertices();
        let n = verts.len();
        'edges: for k in 0..4 {
            let ca = corners[k];
            let cb = corners[(k + 1) % 4];
            for i in 0..n {
                if crossing_sign(ca, cb, verts[i], verts[(i + 1) % n]) != -1 {
                    boundary_crossing = true;
                    break 'edges;
                }
            }
        }
    }

    if boundary_crossing {
        CellRelation::Intersects
    } else if corners_inside == 4 {
        CellRelation::Contained
    } else if corners_inside == 0 {
        CellRelation::Disjoint
    } else {
        // Mixed corners without a detected crossing: numerically marginal,
        // treat as a boundary cell.
        CellRelation::Intersects
    }
}

/// Cells whose union contains the loop. Never empty for a valid loop.
pub fn exterior_cover(l: &Loop, cfg: CoverConfig) -> Vec<CellID> {
    cover(l, cfg, false)
}

/// Cells entirely inside the loop. May be empty when the budget runs out
/// before any cell fits.
pub fn interior_cover(l: &Loop, cfg: CoverConfig) -> Vec<CellID> {
    cover(l, cfg, true)
}

fn cover(l: &Loop, cfg: CoverConfig, interior: bool) -> Vec<CellID> {
    let mut result: Vec<CellID> = Vec::new();
    let mut queue: VecDeque<CellID> = cell::face_cells().into_iter().collect();

    while let Some(c) = queue.pop_front() {
        let lvl = cell::level(c);
        match relate(l, c) {
            CellRelation::Disjoint => {}
            CellRelation::Contained => {
                if lvl < cfg.min_level {
                    queue.extend(cell::children(c));
                } else {
                    result.push(c);
                }
            }
            CellRelation::Intersects => {
                if interior {
                    // Boundary cells never enter an interior cover; descend
                    // while depth and budget allow, otherwise give up on
                    // this branch.
                    if lvl < cfg.max_level && result.len() + queue.len() + 3 <= cfg.max_cells {
                        queue.extend(cell::children(c));
                    }
                } else if lvl >= cfg.max_level
                    || (lvl >= cfg.min_level
                        && result.len() + queue.len() + 3 > cfg.max_cells)
                {
                    // Exterior covers must keep every boundary cell to stay
                    // complete; stop refining when out of depth or budget.
                    result.push(c);
                } else {
                    queue.extend(cell::children(c));
                }
            }
        }
    }

    result.sort_by_key(|c| c.0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::UnitVec;

    fn square(lng0: f64, lat0: f64, lng1: f64, lat1: f64) -> Loop {
        Loop::from_flat_coords(&[
            lng0, lat0, lng1, lat0, lng1, lat1, lng0, lat1, lng0, lat0,
        ])
        .unwrap()
    }

    #[test]
    fn exterior_cover_is_never_empty_and_bounded() {
        let l = square(0.0, 0.0, 1.0, 1.0);
        let cfg = CoverConfig::exterior_default();
        let cov = exterior_cover(&l, cfg);
        assert!(!cov.is_empty());
        assert!(cov.len() <= cfg.max_cells + 4);
        for c in &cov {
            assert!(cell::level(*c) <= cfg.max_level);
        }
    }

    #[test]
    fn exterior_cover_contains_every_interior_sample() {
        let l = square(0.0, 0.0, 1.0, 1.0);
        let cov = exterior_cover(&l, CoverConfig::exterior_default());
        for (lat, lng) in [(0.5, 0.5), (0.05, 0.05), (0.95, 0.95), (0.5, 0.01)] {
            let leaf = cell::leaf_from_degrees(lat, lng);
            assert!(
                cov.iter().any(|c| cell::contains(*c, leaf)),
                "point ({lat}, {lng}) not covered"
            );
        }
    }

    #[test]
    fn interior_cover_cells_lie_inside_the_loop() {
        let l = square(0.0, 0.0, 4.0, 4.0);
        let cov = interior_cover(
            &l,
            CoverConfig {
                min_level: 0,
                max_level: 12,
                max_cells: 32,
            },
        );
        assert!(!cov.is_empty());
        for c in &cov {
            for corner in cell::corners(*c) {
                assert!(l.contains_point(corner));
            }
        }
    }

    #[test]
    fn interior_region_is_within_the_exterior_cover() {
        let l = square(0.0, 0.0, 4.0, 4.0);
        let icov = interior_cover(
            &l,
            CoverConfig {
                min_level: 0,
                max_level: 12,
                max_cells: 32,
            },
        );
        let ocov = exterior_cover(&l, CoverConfig::exterior_default());
        for c in icov {
            let leaf = CellID(c.range_min().0);
            assert!(ocov.iter().any(|o| cell::contains(*o, leaf)));
        }
    }

    #[test]
    fn disjoint_region_is_not_covered() {
        let l = square(0.0, 0.0, 1.0, 1.0);
        let cov = exterior_cover(&l, CoverConfig::exterior_default());
        // A far-away point must not fall into a *max-level* cover cell; the
        // budget may leave coarse boundary cells near the loop, so test a
        // point on the opposite side of the planet.
        let leaf = cell::leaf_from_degrees(-40.0, -170.0);
        assert!(!cov.iter().any(|c| cell::contains(*c, leaf)));
    }

    #[test]
    fn covering_is_deterministic() {
        let l = square(7.0, 44.0, 9.0, 46.0);
        let cfg = CoverConfig::exterior_default();
        assert_eq!(exterior_cover(&l, cfg), exterior_cover(&l, cfg));
        let icfg = CoverConfig::interior_default();
        assert_eq!(interior_cover(&l, icfg), interior_cover(&l, icfg));
    }

    #[test]
    fn antimeridian_loop_is_covered_on_both_sides() {
        let l = Loop::from_flat_coords(&[
            179.0, -1.0, -179.0, -1.0, -179.0, 1.0, 179.0, 1.0, 179.0, -1.0,
        ])
        .unwrap();
        let cov = exterior_cover(&l, CoverConfig::exterior_default());
        let east = cell::leaf_from_degrees(0.0, 179.5);
        let west = cell::leaf_from_degrees(0.0, -179.5);
        assert!(cov.iter().any(|c| cell::contains(*c, east)));
        assert!(cov.iter().any(|c| cell::contains(*c, west)));
        assert!(l.contains_point(UnitVec::from_degrees(0.0, 179.5)));
    }

    #[test]
    fn min_level_is_honored() {
        let l = square(0.0, 0.0, 1.0, 1.0);
        let cov = exterior_cover(
            &l,
            CoverConfig {
                min_level: 4,
                max_level: 13,
                max_cells: 64,
            },
        );
        for c in cov {
            assert!(cell::level(c) >= 4);
        }
    }

    #[test]
    fn config_validation() {
        assert!(CoverConfig::interior_default().validate().is_ok());
        assert!(CoverConfig {
            min_level: 5,
            max_level: 4,
            max_cells: 8
        }
        .validate()
        .is_err());
        assert!(CoverConfig {
            min_level: 0,
            max_level: 31,
            max_cells: 8
        }
        .validate()
        .is_err());
        assert!(CoverConfig {
            min_level: 0,
            max_level: 10,
            max_cells: 0
        }
        .validate()
        .is_err());
    }
}
