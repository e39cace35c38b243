//! Resolves a polygon to the base units it covers.
//!
//! The hard part is policy, not geometry: which grazed units count as
//! "selected", what to do when a polygon touches nothing or is smaller
//! than every unit's threshold, and which municipality serves as the
//! comparison baseline when the selection spans several.

use std::collections::BTreeMap;

use demoscope_geo_models::{MatchResult, Overlap, ResolveOptions};
use geo::{Centroid, Polygon};

use crate::{GeoError, SpatialStore};

/// Resolves `polygon` to a [`MatchResult`].
///
/// Always produces at least one unit: when nothing intersects, the
/// nearest unit by centroid distance is substituted with coverage 0 and a
/// warning; when every intersection is below the selection threshold, the
/// best-covered candidate is kept with a warning. Candidates are sorted
/// by unit code before any tie-sensitive choice, so equal overlap ratios
/// resolve deterministically rather than by store result order.
///
/// # Errors
///
/// Returns [`GeoError`] if the spatial store fails or the polygon has no
/// computable centroid.
pub async fn resolve(
    store: &dyn SpatialStore,
    polygon: &Polygon<f64>,
    options: &ResolveOptions,
) -> Result<MatchResult, GeoError> {
    let mut candidates = store.intersecting(polygon).await?;

    if candidates.is_empty() {
        let centroid = polygon.centroid().ok_or(GeoError::DegeneratePolygon)?;
        let nearest = store.nearest(centroid).await?;
        log::debug!(
            "No units intersect polygon; using nearest unit {} at distance {:.1}",
            nearest.unit,
            nearest.distance
        );
        return Ok(MatchResult {
            units: vec![nearest.unit],
            coverage_percentage: 0.0,
            majority_parent: Some(nearest.parent_code),
            warnings: vec!["no intersecting units; used nearest unit".to_string()],
        });
    }

    // Store result order is unspecified; sort so ties break the same way
    // every time.
    candidates.sort_by(|a, b| a.unit.cmp(&b.unit));

    let mut warnings = Vec::new();

    let mut selected: Vec<&Overlap> = candidates
        .iter()
        .filter(|c| c.overlap_ratio >= options.min_overlap_ratio)
        .collect();

    if selected.is_empty() {
        // Polygon is smaller than the threshold against every candidate.
        // Keep the best-covered one instead of failing.
        let mut best = &candidates[0];
        for candidate in &candidates[1..] {
            if candidate.overlap_ratio > best.overlap_ratio {
                best = candidate;
            }
        }
        log::debug!(
            "All {} candidates below overlap threshold {}; keeping {}",
            candidates.len(),
            options.min_overlap_ratio,
            best.unit
        );
        warnings.push("area too small; used closest unit".to_string());
        selected.push(best);
    }

    // Adjacent-boundary overlap measurement can sum slightly over 1.0.
    let coverage_percentage = selected
        .iter()
        .map(|o| o.overlap_ratio)
        .sum::<f64>()
        .min(1.0);

    let majority_parent = majority_parent(&selected);

    let distinct_parents = selected
        .iter()
        .map(|o| o.parent_code.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    if distinct_parents > 1 {
        warnings.push(format!(
            "selected units span {distinct_parents} municipalities"
        ));
    }

    Ok(MatchResult {
        units: selected.iter().map(|o| o.unit.clone()).collect(),
        coverage_percentage,
        majority_parent,
        warnings,
    })
}

/// Parent code with the highest summed overlap ratio across `selected`.
///
/// Weighted by overlap, not unit count: one dominant unit outvotes any
/// number of slivers. Parents are visited in code order and only a
/// strictly greater weight replaces the current pick, so ties go to the
/// lexicographically smallest parent code.
fn majority_parent(selected: &[&Overlap]) -> Option<String> {
    let mut weights: BTreeMap<&str, f64> = BTreeMap::new();
    for overlap in selected {
        *weights.entry(overlap.parent_code.as_str()).or_insert(0.0) += overlap.overlap_ratio;
    }

    let mut best: Option<(&str, f64)> = None;
    for (parent, weight) in weights {
        match best {
            None => best = Some((parent, weight)),
            Some((_, best_weight)) if weight > best_weight => best = Some((parent, weight)),
            _ => {}
        }
    }
    best.map(|(parent, _)| parent.to_string())
}
