#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index of base unit boundaries.
//!
//! Loads unit polygons from `GeoJSON` at startup, builds an R-tree, and
//! answers the two queries the area resolver needs: polygon intersection
//! with overlap measurement, and nearest unit by centroid distance.
//! Built once, read-only afterwards.
//!
//! Coordinates are expected in a planar projection (e.g. SWEREF 99 TM)
//! so that areas and distances are meaningful in ordinary units.

use async_trait::async_trait;
use demoscope_geo::{SpatialError, SpatialStore};
use demoscope_geo_models::{NearestUnit, Overlap, UnitCode};
use geo::{Area, BooleanOps, BoundingRect, Centroid, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use thiserror::Error;

/// Errors that can occur while building the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    Geojson(#[from] geojson::Error),

    /// The `GeoJSON` document is not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotAFeatureCollection,

    /// A feature is missing a required property.
    #[error("Feature {index} is missing property '{property}'")]
    MissingProperty {
        /// Position of the feature in the collection.
        index: usize,
        /// Name of the missing property.
        property: &'static str,
    },

    /// A unit polygon is degenerate (zero area or no centroid).
    #[error("Unit {unit} has a degenerate boundary")]
    DegenerateBoundary {
        /// Code of the offending unit.
        unit: String,
    },
}

/// One base unit as supplied to the index builder.
#[derive(Debug, Clone)]
pub struct UnitBoundary {
    /// Code of the unit.
    pub unit: UnitCode,
    /// Parent (municipality) code.
    pub parent_code: String,
    /// Boundary polygon(s).
    pub polygon: MultiPolygon<f64>,
}

/// A unit boundary stored in the R-tree with precomputed geometry.
struct IndexEntry {
    unit: UnitCode,
    parent_code: String,
    polygon: MultiPolygon<f64>,
    area: f64,
    centroid: Point<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexEntry {
    // Nearest-unit queries rank by centroid distance, not boundary
    // distance.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.centroid.x() - point[0];
        let dy = self.centroid.y() - point[1];
        dx * dx + dy * dy
    }
}

/// Pre-built spatial index over all base units.
///
/// Implements [`SpatialStore`] for the area resolver. Intended for batch
/// jobs and tests; a production deployment would typically point the
/// resolver at a `PostGIS`-backed store instead.
pub struct UnitIndex {
    units: RTree<IndexEntry>,
}

impl UnitIndex {
    /// Builds the index from prepared unit boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DegenerateBoundary`] if a unit's polygon has
    /// zero area or no centroid.
    pub fn from_units(boundaries: Vec<UnitBoundary>) -> Result<Self, IndexError> {
        let mut entries = Vec::with_capacity(boundaries.len());

        for boundary in boundaries {
            let area = boundary.polygon.unsigned_area();
            let centroid = boundary.polygon.centroid();
            let Some(centroid) = centroid.filter(|_| area > 0.0) else {
                return Err(IndexError::DegenerateBoundary {
                    unit: boundary.unit.to_string(),
                });
            };

            entries.push(IndexEntry {
                envelope: compute_envelope(&boundary.polygon),
                unit: boundary.unit,
                parent_code: boundary.parent_code,
                polygon: boundary.polygon,
                area,
                centroid,
            });
        }

        let units = RTree::bulk_load(entries);
        log::info!("Loaded {} base units into spatial index", units.size());

        Ok(Self { units })
    }

    /// Parses a `GeoJSON` `FeatureCollection` and builds the index.
    ///
    /// Each feature must carry a `unitCode` property; `parentCode` is
    /// optional and defaults to the unit code's parent prefix. Features
    /// with non-polygon geometry are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if parsing fails, a feature lacks its unit
    /// code, or a boundary is degenerate.
    pub fn from_geojson(geojson_str: &str) -> Result<Self, IndexError> {
        let geojson: GeoJson = geojson_str.parse()?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(IndexError::NotAFeatureCollection);
        };

        let mut boundaries = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let unit_code = feature
                .properties
                .as_ref()
                .and_then(|p| p.get("unitCode"))
                .and_then(|v| v.as_str())
                .ok_or(IndexError::MissingProperty {
                    index,
                    property: "unitCode",
                })?
                .to_string();

            let unit = UnitCode::new(&unit_code);
            let parent_code = feature
                .properties
                .as_ref()
                .and_then(|p| p.get("parentCode"))
                .and_then(|v| v.as_str())
                .map_or_else(
                    || unit.parent_prefix().unwrap_or_default().to_string(),
                    ToString::to_string,
                );

            let Some(polygon) = feature.geometry.and_then(to_multipolygon) else {
                log::warn!("Skipping unit {unit_code}: geometry is not a polygon");
                continue;
            };

            boundaries.push(UnitBoundary {
                unit,
                parent_code,
                polygon,
            });
        }

        Self::from_units(boundaries)
    }

    /// Number of indexed units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.size()
    }

    /// `true` when the index holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.size() == 0
    }
}

#[async_trait]
impl SpatialStore for UnitIndex {
    async fn intersecting(&self, polygon: &Polygon<f64>) -> Result<Vec<Overlap>, SpatialError> {
        let Some(rect) = polygon.bounding_rect() else {
            return Ok(Vec::new());
        };
        let query_env =
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let mut overlaps = Vec::new();
        for entry in self.units.locate_in_envelope_intersecting(&query_env) {
            let intersection = entry.polygon.intersection(polygon);
            let overlap_area = intersection.unsigned_area();
            if overlap_area <= 0.0 {
                // Envelope hit but boundaries only touch.
                continue;
            }

            overlaps.push(Overlap {
                unit: entry.unit.clone(),
                parent_code: entry.parent_code.clone(),
                overlap_ratio: (overlap_area / entry.area).min(1.0),
                overlap_area,
            });
        }

        log::debug!("Polygon intersects {} units", overlaps.len());
        Ok(overlaps)
    }

    async fn nearest(&self, point: Point<f64>) -> Result<NearestUnit, SpatialError> {
        let entry = self
            .units
            .nearest_neighbor(&[point.x(), point.y()])
            .ok_or(SpatialError::NoUnits)?;

        Ok(NearestUnit {
            unit: entry.unit.clone(),
            parent_code: entry.parent_code.clone(),
            distance: entry.distance_2(&[point.x(), point.y()]).sqrt(),
        })
    }
}

/// Accepts both `Polygon` and `MultiPolygon` geometry.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
