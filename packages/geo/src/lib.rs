#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Polygon-to-base-unit area resolution.
//!
//! Turns an arbitrary user-drawn polygon into an explainable set of
//! statistical base units: which units it covers, how completely, and
//! which municipality dominates the selection. The actual geometry work
//! (intersection, nearest-unit lookup) is delegated to a [`SpatialStore`].

pub mod resolver;

use async_trait::async_trait;
use demoscope_geo_models::{NearestUnit, Overlap};
use geo::{Point, Polygon};
use thiserror::Error;

/// Errors reported by a spatial store implementation.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The store holds no units at all, so even the nearest-unit
    /// fallback cannot produce a result.
    #[error("Spatial store contains no units")]
    NoUnits,

    /// The backing store failed (I/O, corrupt boundary data, ...).
    #[error("Spatial store error: {message}")]
    Store {
        /// Description of what went wrong.
        message: String,
    },
}

/// Errors that can occur during area resolution.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The spatial store failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The polygon has no computable centroid (empty or degenerate).
    #[error("Polygon is degenerate and has no centroid")]
    DegeneratePolygon,
}

/// Spatial query primitives consumed by the resolver.
///
/// Implementations own the boundary data and the geometry math; the
/// resolver only interprets their output. Both queries either return
/// fully or error, no streaming.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Every base unit whose boundary intersects `polygon`, each
    /// annotated with its overlap ratio and absolute overlap area.
    /// Result order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backing store fails.
    async fn intersecting(&self, polygon: &Polygon<f64>) -> Result<Vec<Overlap>, SpatialError>;

    /// The single unit whose centroid is closest to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::NoUnits`] if the store is empty, or
    /// [`SpatialError::Store`] if the backing store fails.
    async fn nearest(&self, point: Point<f64>) -> Result<NearestUnit, SpatialError>;
}
