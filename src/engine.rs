//! Query engine: one strategy, the feature cache, and the `within`/`get`
//! operations.
//!
//! The engine is built once over a sealed store and is safe to share across
//! query threads: the strategy state is immutable after open, the store is
//! read-only, and the cache takes sharded locks internally.

use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheStats, FeatureCache};
use crate::error::{FenceError, Result};
use crate::predicates::UnitVec;
use crate::storage::Store;
use crate::strategy::{Strategy, StrategyKind, StrategyOptions};
use crate::types::{Feature, FeatureResponse, IndexInfos, PolygonRef, WithinResponse};

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub strategy: StrategyKind,
    /// Forwarded to the tree and db strategies.
    pub stop_on_inside_found: bool,
    /// Order `within` responses by ascending numeric `admin_level` property
    /// (administrative-geography convention). Off by default.
    pub sort_by_admin_level: bool,
    /// Decoded-feature cache capacity; zero disables the cache.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::InsideTree,
            stop_on_inside_found: false,
            sort_by_admin_level: false,
            cache_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_stop_on_inside_found(mut self, stop: bool) -> Self {
        self.stop_on_inside_found = stop;
        self
    }

    pub fn with_sort_by_admin_level(mut self, sort: bool) -> Self {
        self.sort_by_admin_level = sort;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Per-query options.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Omit coordinate arrays from the reply.
    pub remove_geometries: bool,
    /// Abandon the query once this instant has passed.
    pub deadline: Option<Instant>,
}

/// A read-only query engine over a sealed store.
pub struct Engine {
    store: Arc<Store>,
    strategy: Strategy,
    cache: Option<FeatureCache>,
    infos: IndexInfos,
    sort_by_admin_level: bool,
}

impl Engine {
    /// Validates the info record, builds the configured strategy, and wires
    /// the cache.
    pub fn open(store: Arc<Store>, cfg: EngineConfig) -> Result<Engine> {
        let infos = store.load_index_infos()?;
        info!(strategy = cfg.strategy.as_str(), "opening index: {infos}");

        let strategy = Strategy::open(
            cfg.strategy,
            Arc::clone(&store),
            StrategyOptions {
                stop_on_inside_found: cfg.stop_on_inside_found,
            },
        )?;
        let cache = if cfg.cache_capacity > 0 {
            Some(FeatureCache::new(cfg.cache_capacity))
        } else {
            None
        };

        Ok(Engine {
            store,
            strategy,
            cache,
            infos,
            sort_by_admin_level: cfg.sort_by_admin_level,
        })
    }

    pub fn infos(&self) -> &IndexInfos {
        &self.infos
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(FeatureCache::stats)
    }

    /// Every feature containing the point, in one round trip: certain hits
    /// straight from the index, uncertain ones verified with the exact
    /// point-in-loop test. Out-of-range coordinates yield an empty reply.
    pub fn within(&self, lat: f64, lng: f64, opts: QueryOptions) -> Result<WithinResponse> {
        let mut resp = WithinResponse {
            lat,
            lng,
            responses: Vec::new(),
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Ok(resp);
        }

        let idx = self.strategy.stab(lat, lng)?;
        debug!(
            lat,
            lng,
            inside = idx.inside.len(),
            maybe = idx.maybe_inside.len(),
            "stab"
        );

        let p = UnitVec::from_degrees(lat, lng);
        let mut emitted: FxHashSet<PolygonRef> = FxHashSet::default();

        for r in idx.inside {
            check_deadline(&opts)?;
            if !emitted.insert(r) {
                continue;
            }
            let feature = self.load_indexed(r.feature_id)?;
            let l = ring(&feature, r)?;
            resp.responses.push(FeatureResponse {
                feature_id: r.feature_id,
                polygon: r.polygon,
                properties: feature.properties.clone(),
                geometry: (!opts.remove_geometries).then(|| l.coordinates()),
            });
        }

        for r in idx.maybe_inside {
            check_deadline(&opts)?;
            if emitted.contains(&r) {
                continue;
            }
            let feature = self.load_indexed(r.feature_id)?;
            let l = ring(&feature, r)?;
            if !l.contains_point(p) {
                continue;
            }
            emitted.insert(r);
            resp.responses.push(FeatureResponse {
                feature_id: r.feature_id,
                polygon: r.polygon,
                properties: feature.properties.clone(),
                geometry: (!opts.remove_geometries).then(|| l.coordinates()),
            });
        }

        if self.sort_by_admin_level {
            resp.responses
                .sort_by(|a, b| admin_level(a).total_cmp(&admin_level(b)));
        }
        Ok(resp)
    }

    /// One feature's ring and properties. Unknown ids and out-of-range
    /// polygon indexes surface as typed not-found results.
    pub fn get(&self, feature_id: u32, polygon: u16) -> Result<FeatureResponse> {
        let feature = self.load(feature_id)?;
        if usize::from(polygon) >= feature.loops.len() {
            return Err(FenceError::PolygonOutOfRange {
                feature_id,
                polygon,
            });
        }
        Ok(FeatureResponse {
            feature_id,
            polygon,
            properties: feature.properties.clone(),
            geometry: Some(feature.loops[usize::from(polygon)].coordinates()),
        })
    }

    /// Loads a feature through the cache.
    fn load(&self, id: u32) -> Result<Arc<Feature>> {
        let store = &self.store;
        let load = || store.load_feature(id);
        match &self.cache {
            Some(cache) => cache.get_or_load(id, load),
            None => load().map(Arc::new),
        }
    }

    /// Like [`Engine::load`], for ids handed out by the index itself: a
    /// missing feature record is store corruption, not a lookup miss.
    fn load_indexed(&self, id: u32) -> Result<Arc<Feature>> {
        match self.load(id) {
            Err(FenceError::FeatureNotFound(id)) => Err(FenceError::Corruption(format!(
                "index references feature {id} with no feature record"
            ))),
            other => other,
        }
    }
}

fn check_deadline(opts: &QueryOptions) -> Result<()> {
    if let Some(deadline) = opts.deadline {
        if Instant::now() > deadline {
            return Err(FenceError::DeadlineExceeded);
        }
    }
    Ok(())
}

fn ring<'f>(feature: &'f Feature, r: PolygonRef) -> Result<&'f crate::loops::Loop> {
    feature.loops.get(usize::from(r.polygon)).ok_or_else(|| {
        FenceError::Corruption(format!(
            "index references polygon {} of feature {}, blob has {}",
            r.polygon,
            r.feature_id,
            feature.loops.len()
        ))
    })
}

fn admin_level(resp: &FeatureResponse) -> f64 {
    resp.properties
        .get("admin_level")
        .and_then(Value::as_f64)
        .unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Indexer, IndexerConfig};
    use crate::types::{InputFeature, Properties};
    use serde_json::json;
    use std::time::Duration;

    fn square(lng0: f64, lat0: f64, lng1: f64, lat1: f64) -> Vec<f64> {
        vec![lng0, lat0, lng1, lat0, lng1, lat1, lng0, lat1, lng0, lat0]
    }

    fn feature(polygons: Vec<Vec<f64>>, properties: Properties) -> InputFeature {
        InputFeature {
            properties,
            polygons,
        }
    }

    fn engine_with(features: &[InputFeature], cfg: EngineConfig) -> Engine {
        let mut indexer = Indexer::new(Store::memory(), IndexerConfig::new("test")).unwrap();
        for f in features {
            indexer.add_feature(f).unwrap();
        }
        let (store, _) = indexer.seal().unwrap();
        Engine::open(Arc::new(store), cfg).unwrap()
    }

    #[test]
    fn open_requires_info_record() {
        let mut store = Store::memory();
        store.compact().unwrap();
        assert!(matches!(
            Engine::open(Arc::new(store), EngineConfig::default()),
            Err(FenceError::Corruption(_))
        ));
    }

    #[test]
    fn out_of_range_coordinates_yield_empty_response() {
        let engine = engine_with(
            &[feature(vec![square(0.0, 0.0, 1.0, 1.0)], Properties::new())],
            EngineConfig::default(),
        );
        for (lat, lng) in [(91.0, 0.0), (-91.0, 0.0), (0.0, 181.0), (0.0, -181.0)] {
            let resp = engine.within(lat, lng, QueryOptions::default()).unwrap();
            assert!(resp.responses.is_empty());
        }
    }

    #[test]
    fn remove_geometries_drops_coordinates() {
        let engine = engine_with(
            &[feature(vec![square(0.0, 0.0, 1.0, 1.0)], Properties::new())],
            EngineConfig::default(),
        );
        let resp = engine
            .within(
                0.5,
                0.5,
                QueryOptions {
                    remove_geometries: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(resp.responses.len(), 1);
        assert!(resp.responses[0].geometry.is_none());

        let with_geom = engine.within(0.5, 0.5, QueryOptions::default()).unwrap();
        assert!(with_geom.responses[0].geometry.is_some());
    }

    #[test]
    fn admin_level_sort_is_opt_in_and_ascending() {
        let mut outer_props = Properties::new();
        outer_props.insert("admin_level".to_string(), json!(2));
        let mut inner_props = Properties::new();
        inner_props.insert("admin_level".to_string(), json!(4));
        let features = [
            // Inserted inner-first so id order disagrees with level order.
            feature(vec![square(0.0, 0.0, 1.0, 1.0)], inner_props),
            feature(vec![square(-1.0, -1.0, 2.0, 2.0)], outer_props),
        ];
        let engine = engine_with(
            &features,
            EngineConfig::default().with_sort_by_admin_level(true),
        );
        let resp = engine.within(0.5, 0.5, QueryOptions::default()).unwrap();
        assert_eq!(resp.responses.len(), 2);
        assert_eq!(resp.responses[0].feature_id, 1);
        assert_eq!(resp.responses[1].feature_id, 0);
    }

    #[test]
    fn expired_deadline_cancels_the_query() {
        let engine = engine_with(
            &[feature(vec![square(0.0, 0.0, 1.0, 1.0)], Properties::new())],
            EngineConfig::default(),
        );
        let opts = QueryOptions {
            remove_geometries: false,
            deadline: Some(Instant::now() - Duration::from_millis(1)),
        };
        assert!(matches!(
            engine.within(0.5, 0.5, opts),
            Err(FenceError::DeadlineExceeded)
        ));
    }

    #[test]
    fn get_returns_typed_not_found() {
        let engine = engine_with(
            &[feature(vec![square(0.0, 0.0, 1.0, 1.0)], Properties::new())],
            EngineConfig::default(),
        );
        assert!(engine.get(0, 0).is_ok());
        assert!(matches!(
            engine.get(7, 0),
            Err(FenceError::FeatureNotFound(7))
        ));
        assert!(matches!(
            engine.get(0, 3),
            Err(FenceError::PolygonOutOfRange {
                feature_id: 0,
                polygon: 3
            })
        ));
    }

    #[test]
    fn works_with_cache_disabled() {
        let engine = engine_with(
            &[feature(vec![square(0.0, 0.0, 1.0, 1.0)], Properties::new())],
            EngineConfig::default().with_cache_capacity(0),
        );
        assert!(engine.cache_stats().is_none());
        let resp = engine.within(0.5, 0.5, QueryOptions::default()).unwrap();
        assert_eq!(resp.responses.len(), 1);
    }

    #[test]
    fn cache_counts_hits_after_repeat_queries() {
        let engine = engine_with(
            &[feature(vec![square(0.0, 0.0, 1.0, 1.0)], Properties::new())],
            EngineConfig::default(),
        );
        engine.within(0.5, 0.5, QueryOptions::default()).unwrap();
        engine.within(0.5, 0.5, QueryOptions::default()).unwrap();
        let stats = engine.cache_stats().unwrap();
        assert!(stats.hits >= 1);
        assert_eq!(stats.misses, 1);
    }
}

