//! Point-in-polygon queries over a mostly-static corpus of geographic
//! polygons, backed by a two-stage hierarchical cell index.
//!
//! The indexer computes, per polygon, a strict interior cell cover and a
//! broader exterior cell cover and persists both in an ordered key-value
//! store. At query time one of three interchangeable strategies turns a
//! latitude/longitude into candidate polygons, and the engine finishes with
//! exact point-in-loop tests where the covers alone cannot decide.
//!
//! ```
//! use std::sync::Arc;
//! use polyfence::{Engine, EngineConfig, Indexer, IndexerConfig, InputFeature, QueryOptions, Store};
//!
//! let mut indexer = Indexer::new(Store::memory(), IndexerConfig::new("example"))?;
//! indexer.add_feature(&InputFeature {
//!     properties: Default::default(),
//!     polygons: vec![vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0]],
//! })?;
//! let (store, _stats) = indexer.seal()?;
//!
//! let engine = Engine::open(Arc::new(store), EngineConfig::default())?;
//! let resp = engine.within(0.5, 0.5, QueryOptions::default())?;
//! assert_eq!(resp.responses.len(), 1);
//! # Ok::<(), polyfence::FenceError>(())
//! ```

pub mod cache;
pub mod cell;
pub mod cover;
pub mod engine;
pub mod error;
pub mod index;
pub mod keys;
pub mod loops;
pub mod predicates;
pub mod storage;
pub mod strategy;
pub mod types;

pub use cache::{CacheStats, FeatureCache};
pub use cover::CoverConfig;
pub use engine::{Engine, EngineConfig, QueryOptions};
pub use error::{FenceError, Result};
pub use index::{IndexStats, Indexer, IndexerConfig};
pub use loops::Loop;
pub use predicates::UnitVec;
pub use storage::{Store, WriteBatch};
pub use strategy::{Strategy, StrategyKind, StrategyOptions};
pub use types::{
    Feature, FeatureResponse, IndexInfos, IndexResponse, InputFeature, PolygonRef, Properties,
    WithinResponse,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports.
pub mod prelude {
    pub use crate::{
        Engine, EngineConfig, FenceError, Indexer, IndexerConfig, InputFeature, QueryOptions,
        Result, Store, StrategyKind,
    };
}
