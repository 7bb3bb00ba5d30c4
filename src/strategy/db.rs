//! On-disk strategy.
//!
//! Keeps no geometry or index in memory. Each stab derives the query's leaf
//! cell, lifts it to the ancestor at the minimum cover level recorded in
//! the info record, and range-scans the interior and exterior posting keys
//! inside that ancestor's id range. Sibling cells share the range, so every
//! scanned key is re-checked for actual containment of the leaf before its
//! postings count.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::cell;
use crate::error::Result;
use crate::keys;
use crate::storage::Store;
use crate::strategy::StrategyOptions;
use crate::types::{IndexResponse, PolygonRef};

/// The `db` strategy.
pub struct DbStrategy {
    store: Arc<Store>,
    opts: StrategyOptions,
    min_cover_level: u8,
}

impl DbStrategy {
    /// Reads `min_cover_level` from the info record; an unsealed store is
    /// rejected here.
    pub fn open(store: Arc<Store>, opts: StrategyOptions) -> Result<DbStrategy> {
        let infos = store.load_index_infos()?;
        Ok(DbStrategy {
            store,
            opts,
            min_cover_level: infos.min_cover_level,
        })
    }

    pub fn stab(&self, lat: f64, lng: f64) -> Result<IndexResponse> {
        let mut resp = IndexResponse::default();
        let leaf = cell::leaf_from_degrees(lat, lng);
        let lookup = cell::parent(leaf, self.min_cover_level);

        let mut inside: FxHashSet<PolygonRef> = FxHashSet::default();
        let (lo, hi) = keys::inside_range(lookup);
        for (key, value) in self.store.iter_range(&lo, &hi) {
            let stored = keys::cell_from_key(key)?;
            if !cell::contains(stored, leaf) {
                continue;
            }
            for r in keys::decode_postings(value)? {
                if self.opts.stop_on_inside_found {
                    resp.inside.push(r);
                    return Ok(resp);
                }
                inside.insert(r);
            }
        }
        resp.inside.extend(inside.iter().copied());
        resp.inside.sort_unstable();

        let mut maybe: FxHashSet<PolygonRef> = FxHashSet::default();
        let (lo, hi) = keys::outside_range(lookup);
        for (key, value) in self.store.iter_range(&lo, &hi) {
            let stored = keys::cell_from_key(key)?;
            if !cell::contains(stored, leaf) {
                continue;
            }
            for r in keys::decode_postings(value)? {
                if !inside.contains(&r) {
                    maybe.insert(r);
                }
            }
        }
        resp.maybe_inside.extend(maybe.iter().copied());
        resp.maybe_inside.sort_unstable();

        Ok(resp)
    }
}
