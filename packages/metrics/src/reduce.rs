//! Per-family reduction rules.
//!
//! Each function combines one metric family across units according to
//! the kinds its fields declare: counts are summed, percentages are
//! recomputed from the summed counts, medians/means are weighted by the
//! relevant person base, labeled distributions are unioned by label.
//! Averaging per-unit percentages would silently corrupt results
//! whenever unit sizes differ, which is the common case, so every ratio
//! here is rederived after summation instead.
//!
//! All functions expect a non-empty slice; the engine only calls them
//! for families at least one surviving unit returned.

#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use demoscope_metrics_models::{
    BuildingAgeMetrics, Distribution, EarnedIncomeMetrics, EconomicStandardMetrics,
    EducationMetrics, HouseholdMetrics, HousingTypeMetrics, IncomeMetrics, LabeledShare,
    MigrationMetrics, OriginMetrics, PopulationMetrics, TenureMetrics, VehicleMetrics,
};

/// `part / whole` in percent, 0 when the base is empty.
fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Weighted mean of `(weight, value)` pairs. Falls back to the plain
/// mean when every weight is zero, so a value never silently vanishes.
fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut weight_sum = 0.0;
    let mut weighted = 0.0;
    let mut plain = 0.0;
    let mut n = 0usize;

    for (weight, value) in pairs {
        weight_sum += weight;
        weighted += weight * value;
        plain += value;
        n += 1;
    }

    if weight_sum > 0.0 {
        weighted / weight_sum
    } else if n > 0 {
        plain / n as f64
    } else {
        0.0
    }
}

/// Union label counts across distributions.
fn sum_labels<'a>(dists: impl Iterator<Item = &'a Distribution>) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for dist in dists {
        for (label, share) in dist {
            *counts.entry(label.clone()).or_insert(0) += share.count;
        }
    }
    counts
}

/// Rederive each label's share from summed counts against `base`.
fn rederive(counts: BTreeMap<String, u64>, base: u64) -> Distribution {
    counts
        .into_iter()
        .map(|(label, count)| {
            let percentage = pct(count, base);
            (label, LabeledShare { count, percentage })
        })
        .collect()
}

pub(crate) fn population(parts: &[&PopulationMetrics]) -> PopulationMetrics {
    let total: u64 = parts.iter().map(|p| p.total).sum();

    let band_counts = sum_labels(parts.iter().map(|p| &p.age_bands));
    let band_base: u64 = band_counts.values().sum();
    let age_bands = rederive(band_counts, band_base);

    // Union by year; a year missing in some units simply does not
    // contribute for those units.
    let mut historical: BTreeMap<String, u64> = BTreeMap::new();
    for part in parts {
        for (year, count) in &part.historical {
            *historical.entry(year.clone()).or_insert(0) += count;
        }
    }

    // Growth is a rate, not a stock: simple unweighted mean.
    let rates: Vec<f64> = parts.iter().filter_map(|p| p.growth_rate_pct).collect();
    let growth_rate_pct = if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    };

    PopulationMetrics {
        total,
        age_bands,
        historical,
        growth_rate_pct,
    }
}

/// `parts` pairs each unit's income family with that unit's population
/// total, the weight for the median.
pub(crate) fn income(parts: &[(f64, &IncomeMetrics)]) -> IncomeMetrics {
    let median_income = weighted_mean(parts.iter().map(|(w, p)| (*w, p.median_income)));
    let total_persons: u64 = parts.iter().map(|(_, p)| p.total_persons).sum();
    let quartiles = rederive(
        sum_labels(parts.iter().map(|(_, p)| &p.quartiles)),
        total_persons,
    );

    IncomeMetrics {
        median_income,
        quartiles,
        total_persons,
    }
}

pub(crate) fn education(parts: &[&EducationMetrics]) -> EducationMetrics {
    let total_persons: u64 = parts.iter().map(|p| p.total_persons).sum();
    let levels = rederive(sum_labels(parts.iter().map(|p| &p.levels)), total_persons);

    EducationMetrics {
        levels,
        total_persons,
    }
}

pub(crate) fn origin(parts: &[&OriginMetrics]) -> OriginMetrics {
    let total: u64 = parts.iter().map(|p| p.total).sum();
    let foreign_background: u64 = parts.iter().map(|p| p.foreign_background).sum();
    let swedish_background: u64 = parts.iter().map(|p| p.swedish_background).sum();

    OriginMetrics {
        total,
        foreign_background,
        swedish_background,
        pct_foreign_background: pct(foreign_background, total),
    }
}

/// Weighted by unit population, like [`income`].
pub(crate) fn household(parts: &[(f64, &HouseholdMetrics)]) -> HouseholdMetrics {
    HouseholdMetrics {
        total_households: parts.iter().map(|(_, p)| p.total_households).sum(),
        avg_household_size: weighted_mean(parts.iter().map(|(w, p)| (*w, p.avg_household_size))),
    }
}

pub(crate) fn housing_type(parts: &[&HousingTypeMetrics]) -> HousingTypeMetrics {
    let smahus: u64 = parts.iter().map(|p| p.smahus).sum();
    let flerbostadshus: u64 = parts.iter().map(|p| p.flerbostadshus).sum();
    let other: u64 = parts.iter().map(|p| p.other).sum();
    let total_dwellings: u64 = parts.iter().map(|p| p.total_dwellings).sum();

    HousingTypeMetrics {
        smahus,
        flerbostadshus,
        other,
        total_dwellings,
        pct_smahus: pct(smahus, total_dwellings),
    }
}

pub(crate) fn tenure(parts: &[&TenureMetrics]) -> TenureMetrics {
    let total_dwellings: u64 = parts.iter().map(|p| p.total_dwellings).sum();
    let forms = rederive(sum_labels(parts.iter().map(|p| &p.forms)), total_dwellings);

    TenureMetrics {
        forms,
        total_dwellings,
    }
}

/// Weighted by the family's own person base, not the population total:
/// income statistics exclude some residents by age and residency rules.
pub(crate) fn economic_standard(parts: &[&EconomicStandardMetrics]) -> EconomicStandardMetrics {
    let weight = |p: &EconomicStandardMetrics| p.total_persons as f64;

    EconomicStandardMetrics {
        median: weighted_mean(parts.iter().map(|p| (weight(p), p.median))),
        mean: weighted_mean(parts.iter().map(|p| (weight(p), p.mean))),
        total_persons: parts.iter().map(|p| p.total_persons).sum(),
    }
}

/// Weighted like [`economic_standard`].
pub(crate) fn earned_income(parts: &[&EarnedIncomeMetrics]) -> EarnedIncomeMetrics {
    let weight = |p: &EarnedIncomeMetrics| p.total_persons as f64;

    EarnedIncomeMetrics {
        median: weighted_mean(parts.iter().map(|p| (weight(p), p.median))),
        mean: weighted_mean(parts.iter().map(|p| (weight(p), p.mean))),
        total_persons: parts.iter().map(|p| p.total_persons).sum(),
    }
}

pub(crate) fn vehicles(parts: &[&VehicleMetrics]) -> VehicleMetrics {
    let total_vehicles: u64 = parts.iter().map(|p| p.total_vehicles).sum();
    let total_households: u64 = parts.iter().map(|p| p.total_households).sum();
    let vehicles_per_household = if total_households == 0 {
        0.0
    } else {
        total_vehicles as f64 / total_households as f64
    };

    VehicleMetrics {
        total_vehicles,
        total_households,
        vehicles_per_household,
    }
}

pub(crate) fn building_age(parts: &[&BuildingAgeMetrics]) -> BuildingAgeMetrics {
    let total_buildings: u64 = parts.iter().map(|p| p.total_buildings).sum();
    let periods = rederive(
        sum_labels(parts.iter().map(|p| &p.periods)),
        total_buildings,
    );

    BuildingAgeMetrics {
        periods,
        total_buildings,
    }
}

pub(crate) fn migration(parts: &[&MigrationMetrics]) -> MigrationMetrics {
    MigrationMetrics {
        moved_in: parts.iter().map(|p| p.moved_in).sum(),
        moved_out: parts.iter().map(|p| p.moved_out).sum(),
        // Per-unit nets are already in - out, so summing them equals
        // recomputing from the summed flows.
        net_migration: parts.iter().map(|p| p.net_migration).sum(),
    }
}
