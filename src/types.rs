//! Shared data model: persisted blobs, in-memory features, index responses.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::loops::Loop;

/// Property bag attached to a feature. Values are restricted to JSON
/// primitives (bool, number, string, null) by the input layer.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Reference to one polygon of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolygonRef {
    /// Dense id assigned in input order.
    pub feature_id: u32,
    /// Position of the ring for multipolygon features.
    pub polygon: u16,
}

/// What a strategy returns for one stab: polygons that certainly contain the
/// query point, and polygons that still need an exact test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexResponse {
    pub inside: Vec<PolygonRef>,
    pub maybe_inside: Vec<PolygonRef>,
}

/// One feature as fed to the indexer: a property bag plus one flat
/// `[lng, lat, …]` ring per polygon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFeature {
    #[serde(default)]
    pub properties: Properties,
    pub polygons: Vec<Vec<f64>>,
}

/// Persisted feature blob (`'F'` records): properties and the encoded rings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFeature {
    pub properties: Properties,
    pub loops: Vec<Vec<u8>>,
}

/// Persisted cover blob (`'C'` records): per-polygon interior and exterior
/// cover cells, kept separate from the geometry so the tree strategy can
/// open without decoding any ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCells {
    pub cover_in: Vec<Vec<u64>>,
    pub cover_out: Vec<Vec<u64>>,
}

/// Terminal record written once after the last feature; a store without it
/// does not open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfos {
    pub filename: String,
    pub index_time: SystemTime,
    pub indexer_version: String,
    pub feature_count: u32,
    /// Minimum `min_level` of the two coverers; the db strategy sizes its
    /// lookup cell with it.
    pub min_cover_level: u8,
}

impl fmt::Display for IndexInfos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filename: {}, version: {}, features: {}, min cover level: {}",
            self.filename, self.indexer_version, self.feature_count, self.min_cover_level
        )
    }
}

/// Feature decoded into memory: one [`Loop`] per polygon plus properties.
#[derive(Debug, Clone)]
pub struct Feature {
    pub loops: Vec<Loop>,
    pub properties: Properties,
}

impl Feature {
    /// Decodes a stored blob, rebuilding every ring.
    pub fn from_stored(stored: &StoredFeature) -> Result<Feature> {
        let mut loops = Vec::with_capacity(stored.loops.len());
        for blob in &stored.loops {
            loops.push(Loop::decode(blob)?);
        }
        Ok(Feature {
            loops,
            properties: stored.properties.clone(),
        })
    }
}

/// One feature in a `within`/`get` reply.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureResponse {
    pub feature_id: u32,
    pub polygon: u16,
    pub properties: Properties,
    /// Closed `[lng, lat, …]` ring; omitted when the caller asked geometries
    /// to be removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<f64>>,
}

/// Reply of the `within` operation.
#[derive(Debug, Clone, Serialize)]
pub struct WithinResponse {
    pub lat: f64,
    pub lng: f64,
    pub responses: Vec<FeatureResponse>,
}
