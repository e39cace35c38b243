#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Metric family value objects and composite bundle types.
//!
//! A [`MetricBundle`] holds one value object per metric family for a
//! single base unit or municipality. Every family slot is optional: a
//! missing family means "no data", which is distinct from a present
//! family with zero values. Each family's docs declare how its fields
//! combine across units (count, recomputed ratio, weighted mean, labeled
//! distribution); the aggregation engine applies those declarations
//! explicitly and never infers them from structure.

use std::collections::BTreeMap;

use demoscope_geo_models::UnitCode;
use serde::{Deserialize, Serialize};

/// One labeled slice of a categorical distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledShare {
    /// Persons/dwellings/buildings in this category.
    pub count: u64,
    /// Share of the family's own base, in percent (0–100).
    pub percentage: f64,
}

/// Categorical distribution keyed by label (age band, tenure form,
/// construction period, ...). `BTreeMap` keeps label order deterministic.
pub type Distribution = BTreeMap<String, LabeledShare>;

/// Population counts and structure.
///
/// `total` and every age-band count are counts (summed across units);
/// age-band percentages are recomputed from the summed counts;
/// `historical` is a year-keyed series unioned by year; `growth_rate_pct`
/// is a rate, combined as a simple unweighted mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationMetrics {
    /// Resident persons.
    pub total: u64,
    /// Persons per age band (e.g. "0-5", "6-15", ..., "80+").
    pub age_bands: Distribution,
    /// Resident persons per calendar year (e.g. "2019" → 2834).
    pub historical: BTreeMap<String, u64>,
    /// Year-over-year population growth, in percent.
    pub growth_rate_pct: Option<f64>,
}

/// Disposable income statistics.
///
/// `median_income` is population-weighted across units; quartile person
/// counts are summed and their percentages recomputed against the summed
/// `total_persons` base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeMetrics {
    /// Median disposable income, SEK per year.
    pub median_income: f64,
    /// Persons per national income quartile ("q1".."q4").
    pub quartiles: Distribution,
    /// Persons included in the income statistics.
    pub total_persons: u64,
}

/// Educational attainment for the 25–64 population.
///
/// Level counts are summed; level percentages are recomputed against the
/// summed `total_persons` base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationMetrics {
    /// Persons per attainment level ("preSecondary", "secondary",
    /// "postSecondary").
    pub levels: Distribution,
    /// Persons aged 25–64 in the education statistics.
    pub total_persons: u64,
}

/// Swedish/foreign background split.
///
/// All three counts are summed; `pct_foreign_background` is recomputed as
/// `Σ foreign_background / Σ total`, never averaged across units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginMetrics {
    /// Persons with known background.
    pub total: u64,
    /// Persons with foreign background.
    pub foreign_background: u64,
    /// Persons with Swedish background.
    pub swedish_background: u64,
    /// Foreign-background share, in percent (0–100).
    pub pct_foreign_background: f64,
}

/// Household counts and size.
///
/// `total_households` is summed; `avg_household_size` is a
/// population-weighted mean (not recomputable from these fields alone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdMetrics {
    /// Households.
    pub total_households: u64,
    /// Mean persons per household.
    pub avg_household_size: f64,
}

/// Dwelling stock by house type.
///
/// Counts are summed; `pct_smahus` is recomputed from the summed counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HousingTypeMetrics {
    /// Dwellings in småhus (one/two-family houses).
    pub smahus: u64,
    /// Dwellings in flerbostadshus (apartment buildings).
    pub flerbostadshus: u64,
    /// Dwellings in other buildings (special housing etc.).
    pub other: u64,
    /// All dwellings.
    pub total_dwellings: u64,
    /// Småhus share of all dwellings, in percent (0–100).
    pub pct_smahus: f64,
}

/// Dwelling stock by tenure form.
///
/// Per-form counts are summed; per-form percentages are recomputed
/// against the summed `total_dwellings` base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenureMetrics {
    /// Dwellings per tenure form ("hyresratt", "bostadsratt",
    /// "aganderatt").
    pub forms: Distribution,
    /// All dwellings with known tenure.
    pub total_dwellings: u64,
}

/// Equivalized economic standard.
///
/// `median` and `mean` are weighted by this family's own `total_persons`
/// (the income-statistics person base, which excludes some residents by
/// age or residency rules), not by the population total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicStandardMetrics {
    /// Median economic standard, SEK per consumption unit and year.
    pub median: f64,
    /// Mean economic standard, SEK per consumption unit and year.
    pub mean: f64,
    /// Persons in the economic-standard statistics.
    pub total_persons: u64,
}

/// Earned income (förvärvsinkomst).
///
/// Weighted like [`EconomicStandardMetrics`]: by this family's own
/// `total_persons` base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedIncomeMetrics {
    /// Median earned income, SEK per year.
    pub median: f64,
    /// Mean earned income, SEK per year.
    pub mean: f64,
    /// Persons in the earned-income statistics.
    pub total_persons: u64,
}

/// Registered vehicles.
///
/// Both counts are summed; `vehicles_per_household` is recomputed as
/// `Σ total_vehicles / Σ total_households`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMetrics {
    /// Registered passenger vehicles.
    pub total_vehicles: u64,
    /// Households, as counted by the vehicle statistics.
    pub total_households: u64,
    /// Vehicles per household.
    pub vehicles_per_household: f64,
}

/// Building stock by construction period.
///
/// Period counts are summed; period percentages are recomputed against
/// the summed `total_buildings` base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingAgeMetrics {
    /// Buildings per construction-period band (e.g. "1941-1960").
    pub periods: Distribution,
    /// All buildings with a known construction period.
    pub total_buildings: u64,
}

/// Migration flows over the latest year.
///
/// Both flows are summed; `net_migration` is recomputed from the summed
/// flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMetrics {
    /// Persons who moved into the area.
    pub moved_in: u64,
    /// Persons who moved out of the area.
    pub moved_out: u64,
    /// `moved_in - moved_out`.
    pub net_migration: i64,
}

/// All metric families for one base unit or municipality.
///
/// Family slots are independently nullable: the provider may fail per
/// family, and a `None` slot is excluded from that family's reduction
/// rather than substituted with placeholder values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBundle {
    /// Code of the unit (or municipality) this bundle describes.
    pub code: String,
    /// Population counts and structure.
    pub population: Option<PopulationMetrics>,
    /// Disposable income.
    pub income: Option<IncomeMetrics>,
    /// Educational attainment.
    pub education: Option<EducationMetrics>,
    /// Swedish/foreign background.
    pub origin: Option<OriginMetrics>,
    /// Household counts and size.
    pub household: Option<HouseholdMetrics>,
    /// Dwelling stock by house type.
    pub housing_type: Option<HousingTypeMetrics>,
    /// Dwelling stock by tenure form.
    pub tenure: Option<TenureMetrics>,
    /// Equivalized economic standard.
    pub economic_standard: Option<EconomicStandardMetrics>,
    /// Earned income.
    pub earned_income: Option<EarnedIncomeMetrics>,
    /// Registered vehicles.
    pub vehicles: Option<VehicleMetrics>,
    /// Building stock by construction period.
    pub building_age: Option<BuildingAgeMetrics>,
    /// Migration flows.
    pub migration: Option<MigrationMetrics>,
}

/// A combined family value plus the majority parent's own value for the
/// same family, fetched once and never aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFamily<T> {
    /// The combined value across selected units.
    pub value: T,
    /// The majority parent's own value, as the comparison baseline.
    pub parent_comparison: Option<T>,
}

/// One metric bundle representing several base units combined.
///
/// Counts are sums over units, percentages are recomputed from summed
/// counts, and each family carries the majority parent's baseline. A
/// `None` family means no surviving unit returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeBundle {
    /// Units that contributed to the composite, sorted by code.
    pub units: Vec<UnitCode>,
    /// Summed resident persons across contributing units.
    pub total_population: u64,
    /// Municipality used as the comparison baseline.
    pub majority_parent: Option<String>,
    /// Dropped units and degraded comparisons.
    pub warnings: Vec<String>,
    /// Combined population, with the municipality baseline.
    pub population: Option<CompositeFamily<PopulationMetrics>>,
    /// Combined disposable income.
    pub income: Option<CompositeFamily<IncomeMetrics>>,
    /// Combined educational attainment.
    pub education: Option<CompositeFamily<EducationMetrics>>,
    /// Combined background split.
    pub origin: Option<CompositeFamily<OriginMetrics>>,
    /// Combined household statistics.
    pub household: Option<CompositeFamily<HouseholdMetrics>>,
    /// Combined house-type stock.
    pub housing_type: Option<CompositeFamily<HousingTypeMetrics>>,
    /// Combined tenure-form stock.
    pub tenure: Option<CompositeFamily<TenureMetrics>>,
    /// Combined economic standard.
    pub economic_standard: Option<CompositeFamily<EconomicStandardMetrics>>,
    /// Combined earned income.
    pub earned_income: Option<CompositeFamily<EarnedIncomeMetrics>>,
    /// Combined vehicle statistics.
    pub vehicles: Option<CompositeFamily<VehicleMetrics>>,
    /// Combined construction-period stock.
    pub building_age: Option<CompositeFamily<BuildingAgeMetrics>>,
    /// Combined migration flows.
    pub migration: Option<CompositeFamily<MigrationMetrics>>,
}

impl MetricBundle {
    /// An all-`None` bundle for `code`, to be filled in per family.
    #[must_use]
    pub fn empty(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            population: None,
            income: None,
            education: None,
            origin: None,
            household: None,
            housing_type: None,
            tenure: None,
            economic_standard: None,
            earned_income: None,
            vehicles: None,
            building_age: None,
            migration: None,
        }
    }
}
