//! The aggregation engine: unit codes in, one composite bundle out.
//!
//! Fans out one fetch per unit (fork-join; every reduction is
//! commutative, so completion order is irrelevant), tolerates unit
//! failures individually, recomputes the majority municipality over the
//! actual input set, and combines each family with its declared
//! reduction rule.

#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use demoscope_geo_models::UnitCode;
use demoscope_metrics_models::{
    BuildingAgeMetrics, CompositeBundle, CompositeFamily, EarnedIncomeMetrics,
    EconomicStandardMetrics, EducationMetrics, HouseholdMetrics, HousingTypeMetrics,
    IncomeMetrics, MetricBundle, MigrationMetrics, OriginMetrics, PopulationMetrics,
    TenureMetrics, VehicleMetrics,
};
use futures::future::join_all;

use crate::{AggregationError, MetricProvider, ParentLookup, reduce};

/// Combines the bundles of `units` into one [`CompositeBundle`].
///
/// The majority parent is recomputed here rather than reused from the
/// resolver's output: callers may pass an edited subset of the resolved
/// units (a user unchecking areas in a selection list), and the
/// comparison baseline must reflect the actual aggregation input.
///
/// # Errors
///
/// Returns [`AggregationError`] only when the whole operation is
/// meaningless: no input units, every per-unit fetch failed, or the
/// surviving units sum to zero population. Individual unit failures and
/// a failed baseline fetch degrade to warnings.
pub async fn aggregate(
    provider: &dyn MetricProvider,
    parents: &dyn ParentLookup,
    units: &[UnitCode],
) -> Result<CompositeBundle, AggregationError> {
    match units {
        [] => Err(AggregationError::NoUnits),
        [unit] => single_unit(provider, parents, unit).await,
        _ => multi_unit(provider, parents, units).await,
    }
}

/// Fast path: one unit needs no reduction, so its bundle is returned
/// verbatim (avoiding spurious precision loss from a one-element
/// weighted average) with the parent baseline attached.
async fn single_unit(
    provider: &dyn MetricProvider,
    parents: &dyn ParentLookup,
    unit: &UnitCode,
) -> Result<CompositeBundle, AggregationError> {
    let bundle = match provider.fetch_unit(unit).await {
        Ok(bundle) => bundle,
        Err(e) => {
            log::warn!("Metric fetch failed for unit {unit}: {e}");
            return Err(AggregationError::AllUnitsFailed { count: 1 });
        }
    };

    let total_population = bundle.population.as_ref().map_or(0, |p| p.total);
    if total_population == 0 {
        return Err(AggregationError::ZeroPopulation);
    }

    let mut warnings = Vec::new();
    let majority_parent = parents.parent_of(unit);
    let parent_bundle =
        fetch_parent_bundle(provider, majority_parent.as_deref(), &mut warnings).await;

    Ok(compose(
        vec![unit.clone()],
        total_population,
        majority_parent,
        warnings,
        bundle,
        parent_bundle,
    ))
}

async fn multi_unit(
    provider: &dyn MetricProvider,
    parents: &dyn ParentLookup,
    units: &[UnitCode],
) -> Result<CompositeBundle, AggregationError> {
    // Fork-join fan-out: all fetches issued concurrently, all observed
    // (succeeded or failed) before any reduction starts. Dropping the
    // joined future cancels whatever is still in flight.
    let results = join_all(units.iter().map(|unit| async move {
        (unit.clone(), provider.fetch_unit(unit).await)
    }))
    .await;

    let mut warnings = Vec::new();
    let mut surviving: Vec<(UnitCode, MetricBundle)> = Vec::new();
    for (unit, result) in results {
        match result {
            Ok(bundle) => surviving.push((unit, bundle)),
            Err(e) => {
                log::warn!("Dropping unit {unit} from aggregation: {e}");
                warnings.push(format!("metrics unavailable for unit {unit}"));
            }
        }
    }

    if surviving.is_empty() {
        return Err(AggregationError::AllUnitsFailed { count: units.len() });
    }

    // Deterministic reduction and tie-break order.
    surviving.sort_by(|a, b| a.0.cmp(&b.0));

    let total_population: u64 = surviving.iter().map(|(_, b)| population_of(b)).sum();
    if total_population == 0 {
        return Err(AggregationError::ZeroPopulation);
    }

    let majority_parent = majority_parent(parents, &surviving, &mut warnings);
    let parent_bundle =
        fetch_parent_bundle(provider, majority_parent.as_deref(), &mut warnings).await;

    let combined = reduce_families(&surviving);

    Ok(compose(
        surviving.into_iter().map(|(unit, _)| unit).collect(),
        total_population,
        majority_parent,
        warnings,
        combined,
        parent_bundle,
    ))
}

fn population_of(bundle: &MetricBundle) -> u64 {
    bundle.population.as_ref().map_or(0, |p| p.total)
}

/// Municipality with the highest population-weighted representation
/// among the surviving units. Parents are visited in code order and only
/// a strictly greater weight replaces the pick, so ties resolve to the
/// smallest code.
fn majority_parent(
    parents: &dyn ParentLookup,
    surviving: &[(UnitCode, MetricBundle)],
    warnings: &mut Vec<String>,
) -> Option<String> {
    let mut weights: BTreeMap<String, u64> = BTreeMap::new();
    for (unit, bundle) in surviving {
        if let Some(parent) = parents.parent_of(unit) {
            *weights.entry(parent).or_insert(0) += population_of(bundle);
        } else {
            log::warn!("No parent derivable for unit {unit}");
        }
    }

    if weights.is_empty() {
        warnings.push("no comparison baseline: unit parents unknown".to_string());
        return None;
    }

    let mut best: Option<(String, u64)> = None;
    for (parent, weight) in weights {
        match &best {
            None => best = Some((parent, weight)),
            Some((_, best_weight)) if weight > *best_weight => best = Some((parent, weight)),
            _ => {}
        }
    }
    best.map(|(parent, _)| parent)
}

/// Fetches the majority parent's bundle once. A failure degrades to "no
/// comparison" with a warning; the composite itself is still valid.
async fn fetch_parent_bundle(
    provider: &dyn MetricProvider,
    parent_code: Option<&str>,
    warnings: &mut Vec<String>,
) -> Option<MetricBundle> {
    let code = parent_code?;
    match provider.fetch_parent(code).await {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            log::warn!("Baseline fetch failed for municipality {code}: {e}");
            warnings.push(format!(
                "comparison baseline unavailable for municipality {code}"
            ));
            None
        }
    }
}

/// Weight used for population-weighted means: the owning unit's resident
/// count (0 when the unit's population family is missing, which excludes
/// it from the weighted part of the mean).
fn unit_weight(bundle: &MetricBundle) -> f64 {
    population_of(bundle) as f64
}

/// Applies the per-family reduction rules over whichever units carry
/// each family. A family no unit returned stays `None`: "no data" must
/// remain distinguishable from "zero".
fn reduce_families(surviving: &[(UnitCode, MetricBundle)]) -> MetricBundle {
    let mut combined = MetricBundle::empty("composite");

    let population: Vec<&PopulationMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.population.as_ref())
        .collect();
    if !population.is_empty() {
        combined.population = Some(reduce::population(&population));
    }

    let income: Vec<(f64, &IncomeMetrics)> = surviving
        .iter()
        .filter_map(|(_, b)| b.income.as_ref().map(|m| (unit_weight(b), m)))
        .collect();
    if !income.is_empty() {
        combined.income = Some(reduce::income(&income));
    }

    let education: Vec<&EducationMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.education.as_ref())
        .collect();
    if !education.is_empty() {
        combined.education = Some(reduce::education(&education));
    }

    let origin: Vec<&OriginMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.origin.as_ref())
        .collect();
    if !origin.is_empty() {
        combined.origin = Some(reduce::origin(&origin));
    }

    let household: Vec<(f64, &HouseholdMetrics)> = surviving
        .iter()
        .filter_map(|(_, b)| b.household.as_ref().map(|m| (unit_weight(b), m)))
        .collect();
    if !household.is_empty() {
        combined.household = Some(reduce::household(&household));
    }

    let housing_type: Vec<&HousingTypeMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.housing_type.as_ref())
        .collect();
    if !housing_type.is_empty() {
        combined.housing_type = Some(reduce::housing_type(&housing_type));
    }

    let tenure: Vec<&TenureMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.tenure.as_ref())
        .collect();
    if !tenure.is_empty() {
        combined.tenure = Some(reduce::tenure(&tenure));
    }

    let economic_standard: Vec<&EconomicStandardMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.economic_standard.as_ref())
        .collect();
    if !economic_standard.is_empty() {
        combined.economic_standard = Some(reduce::economic_standard(&economic_standard));
    }

    let earned_income: Vec<&EarnedIncomeMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.earned_income.as_ref())
        .collect();
    if !earned_income.is_empty() {
        combined.earned_income = Some(reduce::earned_income(&earned_income));
    }

    let vehicles: Vec<&VehicleMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.vehicles.as_ref())
        .collect();
    if !vehicles.is_empty() {
        combined.vehicles = Some(reduce::vehicles(&vehicles));
    }

    let building_age: Vec<&BuildingAgeMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.building_age.as_ref())
        .collect();
    if !building_age.is_empty() {
        combined.building_age = Some(reduce::building_age(&building_age));
    }

    let migration: Vec<&MigrationMetrics> = surviving
        .iter()
        .filter_map(|(_, b)| b.migration.as_ref())
        .collect();
    if !migration.is_empty() {
        combined.migration = Some(reduce::migration(&migration));
    }

    combined
}

fn wrap<T>(value: Option<T>, parent: Option<T>) -> Option<CompositeFamily<T>> {
    value.map(|value| CompositeFamily {
        value,
        parent_comparison: parent,
    })
}

fn compose(
    units: Vec<UnitCode>,
    total_population: u64,
    majority_parent: Option<String>,
    warnings: Vec<String>,
    combined: MetricBundle,
    parent: Option<MetricBundle>,
) -> CompositeBundle {
    let parent = parent.unwrap_or_else(|| MetricBundle::empty(""));

    CompositeBundle {
        units,
        total_population,
        majority_parent,
        warnings,
        population: wrap(combined.population, parent.population),
        income: wrap(combined.income, parent.income),
        education: wrap(combined.education, parent.education),
        origin: wrap(combined.origin, parent.origin),
        household: wrap(combined.household, parent.household),
        housing_type: wrap(combined.housing_type, parent.housing_type),
        tenure: wrap(combined.tenure, parent.tenure),
        economic_standard: wrap(combined.economic_standard, parent.economic_standard),
        earned_income: wrap(combined.earned_income, parent.earned_income),
        vehicles: wrap(combined.vehicles, parent.vehicles),
        building_age: wrap(combined.building_age, parent.building_age),
        migration: wrap(combined.migration, parent.migration),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, HashSet};

    use async_trait::async_trait;
    use demoscope_metrics_models::Distribution;

    use super::*;
    use crate::{PrefixParentLookup, ProviderError};

    struct FakeProvider {
        units: HashMap<String, MetricBundle>,
        parents: HashMap<String, MetricBundle>,
        failing: HashSet<String>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                units: HashMap::new(),
                parents: HashMap::new(),
                failing: HashSet::new(),
            }
        }

        fn with_unit(mut self, bundle: MetricBundle) -> Self {
            self.units.insert(bundle.code.clone(), bundle);
            self
        }

        fn with_parent(mut self, bundle: MetricBundle) -> Self {
            self.parents.insert(bundle.code.clone(), bundle);
            self
        }

        fn with_failing(mut self, code: &str) -> Self {
            self.failing.insert(code.to_string());
            self
        }
    }

    #[async_trait]
    impl MetricProvider for FakeProvider {
        async fn fetch_unit(&self, unit: &UnitCode) -> Result<MetricBundle, ProviderError> {
            if self.failing.contains(unit.as_str()) {
                return Err(ProviderError::Fetch {
                    code: unit.to_string(),
                    message: "upstream timeout".to_string(),
                });
            }
            self.units
                .get(unit.as_str())
                .cloned()
                .ok_or_else(|| ProviderError::UnknownCode {
                    code: unit.to_string(),
                })
        }

        async fn fetch_parent(&self, parent_code: &str) -> Result<MetricBundle, ProviderError> {
            if self.failing.contains(parent_code) {
                return Err(ProviderError::Fetch {
                    code: parent_code.to_string(),
                    message: "upstream timeout".to_string(),
                });
            }
            self.parents
                .get(parent_code)
                .cloned()
                .ok_or_else(|| ProviderError::UnknownCode {
                    code: parent_code.to_string(),
                })
        }
    }

    fn population(total: u64) -> PopulationMetrics {
        PopulationMetrics {
            total,
            age_bands: Distribution::new(),
            historical: BTreeMap::new(),
            growth_rate_pct: None,
        }
    }

    fn origin(total: u64, foreign: u64) -> OriginMetrics {
        OriginMetrics {
            total,
            foreign_background: foreign,
            swedish_background: total - foreign,
            pct_foreign_background: foreign as f64 / total as f64 * 100.0,
        }
    }

    fn bundle(code: &str, pop: u64) -> MetricBundle {
        let mut bundle = MetricBundle::empty(code);
        bundle.population = Some(population(pop));
        bundle
    }

    fn lookup() -> PrefixParentLookup {
        PrefixParentLookup::default()
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let provider = FakeProvider::new();

        let result = aggregate(&provider, &lookup(), &[]).await;

        assert!(matches!(result, Err(AggregationError::NoUnits)));
    }

    #[tokio::test]
    async fn single_unit_returns_bundle_verbatim() {
        let mut unit = bundle("0114A0010", 1_500);
        unit.income = Some(IncomeMetrics {
            median_income: 312_400.0,
            quartiles: Distribution::new(),
            total_persons: 1_100,
        });
        let provider = FakeProvider::new()
            .with_unit(unit.clone())
            .with_parent(bundle("0114", 48_000));

        let composite = aggregate(&provider, &lookup(), &[UnitCode::from("0114A0010")])
            .await
            .unwrap();

        // No reduction: the values pass through exactly.
        let income = composite.income.unwrap();
        assert_eq!(Some(income.value), unit.income);
        assert_eq!(composite.total_population, 1_500);
        assert_eq!(composite.majority_parent.as_deref(), Some("0114"));
        assert!(composite.warnings.is_empty());
        assert_eq!(
            composite.population.unwrap().parent_comparison,
            Some(population(48_000))
        );
    }

    #[tokio::test]
    async fn percentages_recomputed_across_units() {
        let mut a = bundle("0114A0010", 100);
        a.origin = Some(origin(100, 20));
        let mut b = bundle("0114A0020", 900);
        b.origin = Some(origin(900, 450));
        let provider = FakeProvider::new()
            .with_unit(a)
            .with_unit(b)
            .with_parent(bundle("0114", 48_000));

        let composite = aggregate(
            &provider,
            &lookup(),
            &[UnitCode::from("0114A0010"), UnitCode::from("0114A0020")],
        )
        .await
        .unwrap();

        let origin = composite.origin.unwrap().value;
        assert!((origin.pct_foreign_background - 47.0).abs() < 1e-9);
        assert_eq!(composite.total_population, 1_000);
    }

    #[tokio::test]
    async fn partial_fetch_failure_is_tolerated() {
        let provider = FakeProvider::new()
            .with_unit(bundle("0114A0010", 800))
            .with_unit(bundle("0114A0020", 1_200))
            .with_failing("0114A0030")
            .with_parent(bundle("0114", 48_000));

        let composite = aggregate(
            &provider,
            &lookup(),
            &[
                UnitCode::from("0114A0010"),
                UnitCode::from("0114A0020"),
                UnitCode::from("0114A0030"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(composite.total_population, 2_000);
        assert_eq!(
            composite.units,
            vec![UnitCode::from("0114A0010"), UnitCode::from("0114A0020")]
        );
        assert_eq!(
            composite.warnings,
            vec!["metrics unavailable for unit 0114A0030".to_string()]
        );
    }

    #[tokio::test]
    async fn all_failed_is_an_error() {
        let provider = FakeProvider::new()
            .with_failing("0114A0010")
            .with_failing("0114A0020");

        let result = aggregate(
            &provider,
            &lookup(),
            &[UnitCode::from("0114A0010"), UnitCode::from("0114A0020")],
        )
        .await;

        assert!(matches!(
            result,
            Err(AggregationError::AllUnitsFailed { count: 2 })
        ));
    }

    #[tokio::test]
    async fn zero_population_is_an_error() {
        let provider = FakeProvider::new()
            .with_unit(bundle("0114A0010", 0))
            .with_unit(bundle("0114A0020", 0));

        let result = aggregate(
            &provider,
            &lookup(),
            &[UnitCode::from("0114A0010"), UnitCode::from("0114A0020")],
        )
        .await;

        assert!(matches!(result, Err(AggregationError::ZeroPopulation)));
    }

    #[tokio::test]
    async fn majority_parent_weighted_by_population() {
        // One big unit in 0114 against two small ones in 0180.
        let provider = FakeProvider::new()
            .with_unit(bundle("0114A0010", 9_000))
            .with_unit(bundle("0180C1090", 500))
            .with_unit(bundle("0180C1100", 500))
            .with_parent(bundle("0114", 48_000));

        let composite = aggregate(
            &provider,
            &lookup(),
            &[
                UnitCode::from("0114A0010"),
                UnitCode::from("0180C1090"),
                UnitCode::from("0180C1100"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(composite.majority_parent.as_deref(), Some("0114"));
    }

    #[tokio::test]
    async fn parent_fetch_failure_degrades_to_warning() {
        let provider = FakeProvider::new()
            .with_unit(bundle("0114A0010", 800))
            .with_unit(bundle("0114A0020", 1_200))
            .with_failing("0114");

        let composite = aggregate(
            &provider,
            &lookup(),
            &[UnitCode::from("0114A0010"), UnitCode::from("0114A0020")],
        )
        .await
        .unwrap();

        assert_eq!(composite.majority_parent.as_deref(), Some("0114"));
        assert_eq!(
            composite.warnings,
            vec!["comparison baseline unavailable for municipality 0114".to_string()]
        );
        let population = composite.population.unwrap();
        assert!(population.parent_comparison.is_none());
    }

    #[tokio::test]
    async fn family_missing_everywhere_stays_null() {
        // Neither unit reports vehicles: the composite must say "no
        // data" (None), never a zero-valued family.
        let mut a = bundle("0114A0010", 100);
        a.origin = Some(origin(100, 20));
        let b = bundle("0114A0020", 900);
        let provider = FakeProvider::new()
            .with_unit(a)
            .with_unit(b)
            .with_parent(bundle("0114", 48_000));

        let composite = aggregate(
            &provider,
            &lookup(),
            &[UnitCode::from("0114A0010"), UnitCode::from("0114A0020")],
        )
        .await
        .unwrap();

        assert!(composite.vehicles.is_none());
        // Origin came from one unit only and is still reduced over it.
        let origin = composite.origin.unwrap().value;
        assert_eq!(origin.foreign_background, 20);
    }
}
