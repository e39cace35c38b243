#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Statistical base unit and polygon match result types.
//!
//! These types describe how a user-drawn polygon maps onto the statistical
//! base units (demographic statistical areas) that carry the actual
//! metrics. They are independent of any particular metric family.

use serde::{Deserialize, Serialize};

/// Number of leading characters of a unit code that identify its
/// administrative parent (the municipality).
pub const PARENT_PREFIX_LEN: usize = 4;

/// Externally issued code of a statistical base unit.
///
/// Fixed-length (e.g. `"0114A0010"`); the first [`PARENT_PREFIX_LEN`]
/// characters are the municipality code. Opaque beyond that: the code is
/// never synthesized locally, only passed through from the boundary data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCode(String);

impl UnitCode {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the parent (municipality) code from the leading characters.
    ///
    /// Returns `None` for codes shorter than the prefix.
    #[must_use]
    pub fn parent_prefix(&self) -> Option<&str> {
        if self.0.len() >= PARENT_PREFIX_LEN {
            Some(&self.0[..PARENT_PREFIX_LEN])
        } else {
            None
        }
    }
}

impl std::fmt::Display for UnitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// How much of one base unit a query polygon covers.
///
/// Produced per candidate unit for one resolver call; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    /// The intersected base unit.
    pub unit: UnitCode,
    /// Parent (municipality) code of the unit.
    pub parent_code: String,
    /// `overlap_area / unit_area`, in `[0, 1]`.
    pub overlap_ratio: f64,
    /// Absolute intersection area, in the store's area unit.
    pub overlap_area: f64,
}

/// Result of a nearest-unit query, used when a polygon intersects nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestUnit {
    /// The closest base unit by centroid distance.
    pub unit: UnitCode,
    /// Parent (municipality) code of the unit.
    pub parent_code: String,
    /// Centroid-to-centroid distance, in the store's length unit.
    pub distance: f64,
}

/// Outcome of resolving a polygon to a set of base units.
///
/// `units` is non-empty whenever resolution succeeds: the resolver either
/// finds real overlaps or falls back to the single nearest unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Selected base units, sorted by code.
    pub units: Vec<UnitCode>,
    /// Sum of selected overlap ratios, clamped to `[0, 1]`.
    pub coverage_percentage: f64,
    /// Parent code with the highest overlap-weighted representation.
    pub majority_parent: Option<String>,
    /// Human-readable notes about fallbacks and multi-parent selections.
    pub warnings: Vec<String>,
}

/// Tuning knobs for the area resolver.
///
/// Configuration constants, not per-request user input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Minimum share of a unit's own area the polygon must cover for the
    /// unit to be selected. Excludes units only grazed by a sliver.
    pub min_overlap_ratio: f64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            min_overlap_ratio: 0.10,
        }
    }
}
