//! Error types for polyfence.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, FenceError>;

/// All errors surfaced by the index, storage, and query layers.
#[derive(Debug, Error)]
pub enum FenceError {
    /// Malformed polygon input: odd coordinate count, too few points, or a
    /// ring that degenerates on the sphere.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Underlying file I/O failed.
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record failed to decode. Fatal on open or first touch.
    #[error("corrupted store: {0}")]
    Corruption(String),

    /// The store was opened read-only and a write was attempted.
    #[error("store is read-only")]
    ReadOnly,

    /// No feature with this id exists in the store.
    #[error("feature {0} not found")]
    FeatureNotFound(u32),

    /// The feature exists but has no polygon at the requested index.
    #[error("polygon {polygon} out of range for feature {feature_id}")]
    PolygonOutOfRange { feature_id: u32, polygon: u16 },

    /// The caller's deadline elapsed while the query was running.
    #[error("query deadline exceeded")]
    DeadlineExceeded,

    /// Strategy name did not match `insidetree`, `shapeindex` or `db`.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Catch-all for encoding failures while writing blobs.
    #[error("encode: {0}")]
    Encode(String),
}

impl FenceError {
    /// True for the typed lookup misses that are reported to callers but not
    /// logged as errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FenceError::FeatureNotFound(_) | FenceError::PolygonOutOfRange { .. }
        )
    }
}
