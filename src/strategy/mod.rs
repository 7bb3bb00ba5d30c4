//! Lookup strategies sharing one contract: `stab(lat, lng)` returns the
//! polygons that certainly contain the point and the polygons that still
//! need an exact test.
//!
//! The strategy is chosen when the store is opened and never changes, so
//! dispatch is an enum rather than a trait object.

mod db;
mod shape;
mod tree;

use std::str::FromStr;
use std::sync::Arc;

pub use db::DbStrategy;
pub use shape::ShapeStrategy;
pub use tree::TreeStrategy;

use crate::error::{FenceError, Result};
use crate::storage::Store;
use crate::types::IndexResponse;

/// Which lookup strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// In-memory interval trees over cover-cell id ranges.
    InsideTree,
    /// In-memory decoded rings with exact containment.
    ShapeIndex,
    /// On-disk range scans, no heap geometry.
    Db,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::InsideTree,
        StrategyKind::ShapeIndex,
        StrategyKind::Db,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::InsideTree => "insidetree",
            StrategyKind::ShapeIndex => "shapeindex",
            StrategyKind::Db => "db",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = FenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "insidetree" => Ok(StrategyKind::InsideTree),
            "shapeindex" => Ok(StrategyKind::ShapeIndex),
            "db" => Ok(StrategyKind::Db),
            other => Err(FenceError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Strategy-level options.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyOptions {
    /// Return as soon as one certain hit is known. Useful when the corpus
    /// does not overlap (countries): the first interior-cover hit is the
    /// whole answer.
    pub stop_on_inside_found: bool,
}

/// A constructed strategy bound to a store.
pub enum Strategy {
    Tree(TreeStrategy),
    Shape(ShapeStrategy),
    Db(DbStrategy),
}

impl Strategy {
    /// Builds the chosen strategy from a sealed store.
    pub fn open(kind: StrategyKind, store: Arc<Store>, opts: StrategyOptions) -> Result<Strategy> {
        match kind {
            StrategyKind::InsideTree => Ok(Strategy::Tree(TreeStrategy::open(&store, opts)?)),
            StrategyKind::ShapeIndex => Ok(Strategy::Shape(ShapeStrategy::open(&store)?)),
            StrategyKind::Db => Ok(Strategy::Db(DbStrategy::open(store, opts)?)),
        }
    }

    /// Stabs the index at a location.
    pub fn stab(&self, lat: f64, lng: f64) -> Result<IndexResponse> {
        match self {
            Strategy::Tree(s) => Ok(s.stab(lat, lng)),
            Strategy::Shape(s) => Ok(s.stab(lat, lng)),
            Strategy::Db(s) => s.stab(lat, lng),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Tree(_) => StrategyKind::InsideTree,
            Strategy::Shape(_) => StrategyKind::ShapeIndex,
            Strategy::Db(_) => StrategyKind::Db,
        }
    }
}
