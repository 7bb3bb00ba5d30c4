//! Offline index build: feature stream in, sealed store out.
//!
//! For every accepted feature the indexer writes, atomically, the interior
//! and exterior posting records of each polygon, the feature blob, and the
//! cover-cell blob. Per-feature geometry problems are logged and skipped;
//! polygons whose cover blows past the warning threshold are dropped
//! individually. Sealing writes the terminal info record and compacts the
//! store, after which it is read-only.

use std::time::SystemTime;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use s2::cellid::CellID;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cover::{self, CoverConfig};
use crate::error::{FenceError, Result};
use crate::keys;
use crate::loops::Loop;
use crate::storage::{encode_cbor, Store, WriteBatch};
use crate::types::{IndexInfos, InputFeature, PolygonRef, StoredCells, StoredFeature};

/// Build-time configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Interior coverer parameters.
    pub inside: CoverConfig,
    /// Exterior coverer parameters.
    pub outside: CoverConfig,
    /// A polygon whose cover exceeds this many cells is dropped from the
    /// index with a diagnostic. Zero disables the check.
    pub warn_cells: usize,
    /// Origin filename recorded in the info record.
    pub filename: String,
    /// Free-form version tag recorded in the info record.
    pub indexer_version: String,
}

impl IndexerConfig {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            inside: CoverConfig::interior_default(),
            outside: CoverConfig::exterior_default(),
            warn_cells: 1000,
            filename: filename.into(),
            indexer_version: crate::VERSION.to_string(),
        }
    }

    pub fn with_inside(mut self, cfg: CoverConfig) -> Self {
        self.inside = cfg;
        self
    }

    pub fn with_outside(mut self, cfg: CoverConfig) -> Self {
        self.outside = cfg;
        self
    }

    pub fn with_warn_cells(mut self, warn_cells: usize) -> Self {
        self.warn_cells = warn_cells;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.indexer_version = version.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.inside
            .validate()
            .and_then(|()| self.outside.validate())
            .map_err(FenceError::InvalidGeometry)
    }
}

/// Counters reported after sealing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    /// Features written, which is also the number of assigned ids.
    pub indexed: u32,
    /// Features rejected outright (bad geometry, or every polygon dropped).
    pub skipped: u64,
    /// Individual polygons dropped for oversize covers.
    pub polygons_dropped: u64,
}

/// Streams features into a store.
pub struct Indexer {
    store: Store,
    cfg: IndexerConfig,
    next_id: u32,
    stats: IndexStats,
}

impl Indexer {
    pub fn new(store: Store, cfg: IndexerConfig) -> Result<Indexer> {
        cfg.validate()?;
        if store.is_read_only() {
            return Err(FenceError::ReadOnly);
        }
        Ok(Indexer {
            store,
            cfg,
            next_id: 0,
            stats: IndexStats::default(),
        })
    }

    /// Indexes one feature. Returns `true` when the feature was accepted and
    /// assigned an id; geometry rejections return `false` and do not advance
    /// the id counter. Storage failures abort the build.
    pub fn add_feature(&mut self, feature: &InputFeature) -> Result<bool> {
        if self.next_id == u32::MAX {
            return Err(FenceError::Encode(
                "feature id space exhausted".to_string(),
            ));
        }
        let id = self.next_id;

        let loops = match self.build_loops(feature) {
            Ok(loops) => loops,
            Err(e) => {
                warn!(feature = id, error = %e, "skipping feature with invalid geometry");
                self.stats.skipped += 1;
                return Ok(false);
            }
        };

        let mut cover_in: Vec<Vec<CellID>> = Vec::with_capacity(loops.len());
        let mut cover_out: Vec<Vec<CellID>> = Vec::with_capacity(loops.len());
        let mut kept = 0usize;
        for (pos, l) in loops.iter().enumerate() {
            let cin = cover::interior_cover(l, self.cfg.inside);
            let cout = cover::exterior_cover(l, self.cfg.outside);
            let oversize = self.cfg.warn_cells != 0
                && (cin.len() > self.cfg.warn_cells || cout.len() > self.cfg.warn_cells);
            if oversize {
                warn!(
                    feature = id,
                    polygon = pos,
                    inside_cells = cin.len(),
                    outside_cells = cout.len(),
                    limit = self.cfg.warn_cells,
                    "cover too big, dropping polygon"
                );
                self.stats.polygons_dropped += 1;
                // Keep positions aligned with the ring order.
                cover_in.push(Vec::new());
                cover_out.push(Vec::new());
                continue;
            }
            kept += 1;
            cover_in.push(cin);
            cover_out.push(cout);
        }

        if kept == 0 {
            warn!(feature = id, "every polygon dropped, skipping feature");
            self.stats.skipped += 1;
            return Ok(false);
        }

        let batch = self.build_batch(id, feature, &loops, &cover_in, &cover_out)?;
        self.store.apply(batch)?;

        self.next_id += 1;
        self.stats.indexed += 1;
        debug!(feature = id, polygons = loops.len(), kept, "indexed feature");
        Ok(true)
    }

    fn build_loops(&self, feature: &InputFeature) -> Result<Vec<Loop>> {
        if feature.polygons.is_empty() {
            return Err(FenceError::InvalidGeometry("no polygons".to_string()));
        }
        if feature.polygons.len() > usize::from(u16::MAX) + 1 {
            return Err(FenceError::InvalidGeometry(format!(
                "{} polygons exceed the per-feature limit",
                feature.polygons.len()
            )));
        }
        feature
            .polygons
            .iter()
            .map(|ring| Loop::from_flat_coords(ring))
            .collect()
    }

    /// Stages all records of one feature. Posting appends within the batch
    /// are accumulated locally so several polygons of the same feature can
    /// share a cover cell.
    fn build_batch(
        &self,
        id: u32,
        feature: &InputFeature,
        loops: &[Loop],
        cover_in: &[Vec<CellID>],
        cover_out: &[Vec<CellID>],
    ) -> Result<WriteBatch> {
        let mut postings: FxHashMap<Vec<u8>, Vec<u8>> = FxHashMap::default();
        let mut append = |store: &Store, key: Vec<u8>, r: PolygonRef| {
            let value = postings
                .entry(key.clone())
                .or_insert_with(|| store.get(&key).map(|v| v.to_vec()).unwrap_or_default());
            keys::push_posting(value, r);
        };

        for (pos, cin) in cover_in.iter().enumerate() {
            let r = PolygonRef {
                feature_id: id,
                polygon: pos as u16,
            };
            for c in cin {
                append(&self.store, keys::inside_key(*c).to_vec(), r);
            }
            // Cells already claimed by the interior cover carry no extra
            // information in the exterior postings.
            for c in &cover_out[pos] {
                if cin.binary_search_by_key(&c.0, |x| x.0).is_ok() {
                    continue;
                }
                append(&self.store, keys::outside_key(*c).to_vec(), r);
            }
        }

        let mut batch = WriteBatch::new();
        for (key, value) in postings {
            batch.put(key, Bytes::from(value));
        }

        let stored = StoredFeature {
            properties: primitive_properties(id, feature),
            loops: loops.iter().map(Loop::encode).collect(),
        };
        batch.put(
            keys::feature_key(id).to_vec(),
            Bytes::from(encode_cbor(&stored)?),
        );

        let cells = StoredCells {
            cover_in: cover_in
                .iter()
                .map(|cu| cu.iter().map(|c| c.0).collect())
                .collect(),
            cover_out: cover_out
                .iter()
                .map(|cu| cu.iter().map(|c| c.0).collect())
                .collect(),
        };
        batch.put(
            keys::cells_key(id).to_vec(),
            Bytes::from(encode_cbor(&cells)?),
        );

        Ok(batch)
    }

    /// Writes the terminal info record, compacts, and hands the sealed store
    /// back together with the build counters.
    pub fn seal(mut self) -> Result<(Store, IndexStats)> {
        let infos = IndexInfos {
            filename: self.cfg.filename.clone(),
            index_time: SystemTime::now(),
            indexer_version: self.cfg.indexer_version.clone(),
            feature_count: self.next_id,
            min_cover_level: self.cfg.inside.min_level.min(self.cfg.outside.min_level),
        };
        let mut batch = WriteBatch::new();
        batch.put(
            keys::info_key().to_vec(),
            Bytes::from(encode_cbor(&infos)?),
        );
        self.store.apply(batch)?;
        self.store.compact()?;
        info!(
            indexed = self.stats.indexed,
            skipped = self.stats.skipped,
            polygons_dropped = self.stats.polygons_dropped,
            "sealed index: {infos}"
        );
        Ok((self.store, self.stats))
    }
}

/// Keeps only primitive property values (bool, number, string, null);
/// anything nested is dropped with a diagnostic.
fn primitive_properties(id: u32, feature: &InputFeature) -> crate::types::Properties {
    let mut out = crate::types::Properties::new();
    for (k, v) in &feature.properties {
        match v {
            Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Null => {
                out.insert(k.clone(), v.clone());
            }
            _ => {
                warn!(feature = id, key = %k, "dropping non-primitive property");
            }
        }
    }
    out
}
