//! Shape-index strategy.
//!
//! All rings are decoded into memory at open time; containment is decided
//! by the exact point-in-loop test, so `maybe_inside` is always empty. A
//! coarse cell-to-candidates map keeps each stab from scanning every ring;
//! it is built lazily on the first query behind a single-initializer
//! barrier, since the build is not reentrant while queries are.
//!
//! Vertex model is **open**: a query point exactly equal to a ring vertex
//! is reported as not inside.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::cell;
use crate::cover::{self, CoverConfig};
use crate::error::Result;
use crate::loops::Loop;
use crate::predicates::UnitVec;
use crate::storage::Store;
use crate::types::{IndexResponse, PolygonRef};

/// Cover parameters for the candidate prefilter; coarse on purpose, the
/// exact test runs on every candidate anyway.
const PREFILTER_COVER: CoverConfig = CoverConfig {
    min_level: 0,
    max_level: 8,
    max_cells: 16,
};

struct PointQuery {
    /// Cover cell id to indexes into `shapes`.
    candidates: FxHashMap<u64, Vec<u32>>,
    /// Levels that actually occur in the map, ascending.
    levels: Vec<u8>,
}

/// The `shapeindex` strategy.
pub struct ShapeStrategy {
    shapes: Vec<(PolygonRef, Loop)>,
    query: OnceLock<PointQuery>,
}

impl ShapeStrategy {
    /// Decodes every ring of every `'F'` record.
    pub fn open(store: &Store) -> Result<ShapeStrategy> {
        let mut shapes = Vec::new();
        store.load_all_features(|id, stored| {
            for (pos, blob) in stored.loops.iter().enumerate() {
                let l = Loop::decode(blob)?;
                shapes.push((
                    PolygonRef {
                        feature_id: id,
                        polygon: pos as u16,
                    },
                    l,
                ));
            }
            Ok(())
        })?;
        Ok(ShapeStrategy {
            shapes,
            query: OnceLock::new(),
        })
    }

    /// Number of indexed rings.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    fn point_query(&self) -> &PointQuery {
        self.query.get_or_init(|| {
            let mut candidates: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
            let mut levels: Vec<u8> = Vec::new();
            for (idx, (_, l)) in self.shapes.iter().enumerate() {
                for c in cover::exterior_cover(l, PREFILTER_COVER) {
                    candidates.entry(c.0).or_default().push(idx as u32);
                    let lvl = cell::level(c);
                    if !levels.contains(&lvl) {
                        levels.push(lvl);
                    }
                }
            }
            levels.sort_unstable();
            PointQuery { candidates, levels }
        })
    }

    pub fn stab(&self, lat: f64, lng: f64) -> IndexResponse {
        let mut resp = IndexResponse::default();
        if self.shapes.is_empty() {
            return resp;
        }
        let query = self.point_query();
        let leaf = cell::leaf_from_degrees(lat, lng);
        let p = UnitVec::from_degrees(lat, lng);

        let mut hits: Vec<u32> = Vec::new();
        for lvl in &query.levels {
            let ancestor = cell::parent(leaf, *lvl);
            if let Some(found) = query.candidates.get(&ancestor.0) {
                hits.extend_from_slice(found);
            }
        }
        hits.sort_unstable();
        hits.dedup();

        for idx in hits {
            let (r, l) = &self.shapes[idx as usize];
            if l.has_vertex(p) {
                // Open vertex model: boundary vertices are outside.
                continue;
            }
            if l.contains_point(p) {
                resp.inside.push(*r);
            }
        }
        resp.inside.sort_unstable();
        resp.inside.dedup();
        resp
    }
}
