#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Polygon-to-statistical-profile orchestration.
//!
//! Glues the area resolver and the aggregation engine into the one call
//! an HTTP handler, CLI, or batch job needs: draw a polygon, get back
//! which units it covers and one combined metric bundle with the
//! majority municipality as baseline.

use demoscope_geo::{GeoError, SpatialStore, resolver};
use demoscope_geo_models::{MatchResult, ResolveOptions};
use demoscope_metrics::{AggregationError, MetricProvider, ParentLookup, engine};
use demoscope_metrics_models::CompositeBundle;
use geo::Polygon;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Area resolution failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Aggregation failed.
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// A resolved area together with its combined statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaProfile {
    /// How the polygon mapped onto base units.
    pub match_result: MatchResult,
    /// Combined metrics for the selected units.
    pub composite: CompositeBundle,
}

/// Resolves `polygon` and aggregates the resolved units in one step.
///
/// Resolver warnings stay on `match_result`, aggregation warnings on
/// `composite`; presentation layers typically surface both.
///
/// # Errors
///
/// Returns [`ProfileError`] if the spatial store fails, the polygon is
/// degenerate, or the aggregation has no usable units.
pub async fn profile(
    store: &dyn SpatialStore,
    provider: &dyn MetricProvider,
    parents: &dyn ParentLookup,
    polygon: &Polygon<f64>,
    options: &ResolveOptions,
) -> Result<AreaProfile, ProfileError> {
    let match_result = resolver::resolve(store, polygon, options).await?;
    log::debug!(
        "Resolved polygon to {} units (coverage {:.0}%)",
        match_result.units.len(),
        match_result.coverage_percentage * 100.0
    );

    let composite = engine::aggregate(provider, parents, &match_result.units).await?;

    Ok(AreaProfile {
        match_result,
        composite,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use demoscope_geo_models::UnitCode;
    use demoscope_metrics::{PrefixParentLookup, ProviderError};
    use demoscope_metrics_models::{Distribution, IncomeMetrics, MetricBundle, PopulationMetrics};
    use demoscope_spatial::{UnitBoundary, UnitIndex};
    use geo::{MultiPolygon, polygon};

    use super::*;

    struct FakeProvider;

    fn unit_bundle() -> MetricBundle {
        let mut bundle = MetricBundle::empty("0114A0010");
        bundle.population = Some(PopulationMetrics {
            total: 2_400,
            age_bands: Distribution::new(),
            historical: BTreeMap::new(),
            growth_rate_pct: Some(1.2),
        });
        bundle.income = Some(IncomeMetrics {
            median_income: 289_000.0,
            quartiles: Distribution::new(),
            total_persons: 1_900,
        });
        bundle
    }

    fn parent_bundle() -> MetricBundle {
        let mut bundle = MetricBundle::empty("0114");
        bundle.population = Some(PopulationMetrics {
            total: 48_000,
            age_bands: Distribution::new(),
            historical: BTreeMap::new(),
            growth_rate_pct: Some(0.8),
        });
        bundle
    }

    #[async_trait]
    impl MetricProvider for FakeProvider {
        async fn fetch_unit(&self, unit: &UnitCode) -> Result<MetricBundle, ProviderError> {
            if unit.as_str() == "0114A0010" {
                Ok(unit_bundle())
            } else {
                Err(ProviderError::UnknownCode {
                    code: unit.to_string(),
                })
            }
        }

        async fn fetch_parent(&self, parent_code: &str) -> Result<MetricBundle, ProviderError> {
            if parent_code == "0114" {
                Ok(parent_bundle())
            } else {
                Err(ProviderError::UnknownCode {
                    code: parent_code.to_string(),
                })
            }
        }
    }

    #[tokio::test]
    async fn polygon_inside_one_unit_end_to_end() {
        let index = UnitIndex::from_units(vec![UnitBoundary {
            unit: UnitCode::from("0114A0010"),
            parent_code: "0114".to_string(),
            polygon: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ]]),
        }])
        .unwrap();

        // The polygon covers the whole unit and nothing else.
        let query = polygon![
            (x: -1.0, y: -1.0),
            (x: 11.0, y: -1.0),
            (x: 11.0, y: 11.0),
            (x: -1.0, y: 11.0),
        ];

        let area_profile = profile(
            &index,
            &FakeProvider,
            &PrefixParentLookup::default(),
            &query,
            &ResolveOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            area_profile.match_result.units,
            vec![UnitCode::from("0114A0010")]
        );
        assert!((area_profile.match_result.coverage_percentage - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            area_profile.match_result.majority_parent.as_deref(),
            Some("0114")
        );
        assert!(area_profile.match_result.warnings.is_empty());

        // Single-unit fast path: the unit's bundle passes through
        // exactly, with the municipality baseline attached.
        let expected = unit_bundle();
        let income = area_profile.composite.income.unwrap();
        assert_eq!(Some(income.value), expected.income);
        let population = area_profile.composite.population.unwrap();
        assert_eq!(Some(population.value), expected.population);
        assert_eq!(population.parent_comparison, parent_bundle().population);
        assert_eq!(area_profile.composite.total_population, 2_400);
    }

    #[tokio::test]
    async fn distant_polygon_profiles_nearest_unit() {
        let index = UnitIndex::from_units(vec![UnitBoundary {
            unit: UnitCode::from("0114A0010"),
            parent_code: "0114".to_string(),
            polygon: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ]]),
        }])
        .unwrap();

        let query = polygon![
            (x: 100.0, y: 100.0),
            (x: 101.0, y: 100.0),
            (x: 101.0, y: 101.0),
            (x: 100.0, y: 101.0),
        ];

        let area_profile = profile(
            &index,
            &FakeProvider,
            &PrefixParentLookup::default(),
            &query,
            &ResolveOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            area_profile.match_result.units,
            vec![UnitCode::from("0114A0010")]
        );
        assert!(area_profile.match_result.coverage_percentage.abs() < f64::EPSILON);
        assert_eq!(
            area_profile.match_result.warnings,
            vec!["no intersecting units; used nearest unit".to_string()]
        );
        assert_eq!(area_profile.composite.total_population, 2_400);
    }
}
