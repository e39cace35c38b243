#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population-weighted metric aggregation across base units.
//!
//! Combines per-unit metric bundles into one composite without violating
//! the statistical meaning of each metric kind: counts are summed,
//! percentages are recomputed from summed counts (never averaged),
//! medians and means are weighted by the relevant person base, and
//! labeled distributions are unioned by label before their shares are
//! rederived. The majority municipality's own bundle is attached per
//! family as the comparison baseline.

pub mod engine;
mod reduce;

use async_trait::async_trait;
use demoscope_geo_models::{PARENT_PREFIX_LEN, UnitCode};
use demoscope_metrics_models::MetricBundle;
use thiserror::Error;

/// Errors reported by a metric provider implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The upstream statistics service failed or returned garbage.
    #[error("Metric provider error for {code}: {message}")]
    Fetch {
        /// Unit or municipality code being fetched.
        code: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The code is unknown to the provider.
    #[error("Unknown code: {code}")]
    UnknownCode {
        /// The code that was looked up.
        code: String,
    },
}

/// Errors that can occur during aggregation.
///
/// Per-unit and per-family fetch failures are swallowed into warnings;
/// only whole-operation failures surface here.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Called with no units at all.
    #[error("No units to aggregate")]
    NoUnits,

    /// Every per-unit fetch failed, leaving nothing to combine.
    #[error("All {count} unit fetches failed")]
    AllUnitsFailed {
        /// How many units were attempted.
        count: usize,
    },

    /// The surviving units sum to zero population, so there is no
    /// weight basis and a composite would be misleading.
    #[error("Total population of surviving units is zero")]
    ZeroPopulation,
}

/// Per-unit metric source consumed by the aggregation engine.
///
/// Fetches are pure reads with no side effects; dropping an in-flight
/// fetch cancels it without cleanup.
#[async_trait]
pub trait MetricProvider: Send + Sync {
    /// Fetch the metric bundle for one base unit. Families inside the
    /// bundle are independently nullable.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the upstream service fails for the
    /// whole unit.
    async fn fetch_unit(&self, unit: &UnitCode) -> Result<MetricBundle, ProviderError>;

    /// Fetch the metric bundle for a municipality, used as the
    /// comparison baseline.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the upstream service fails.
    async fn fetch_parent(&self, parent_code: &str) -> Result<MetricBundle, ProviderError>;
}

/// Read-only unit-to-parent mapping, injected rather than ambient.
pub trait ParentLookup: Send + Sync {
    /// Parent (municipality) code for `unit`, or `None` if unknown.
    fn parent_of(&self, unit: &UnitCode) -> Option<String>;
}

/// Default [`ParentLookup`]: the parent code is a fixed-length prefix of
/// the unit code.
#[derive(Debug, Clone, Copy)]
pub struct PrefixParentLookup {
    prefix_len: usize,
}

impl PrefixParentLookup {
    #[must_use]
    pub const fn new(prefix_len: usize) -> Self {
        Self { prefix_len }
    }
}

impl Default for PrefixParentLookup {
    fn default() -> Self {
        Self::new(PARENT_PREFIX_LEN)
    }
}

impl ParentLookup for PrefixParentLookup {
    fn parent_of(&self, unit: &UnitCode) -> Option<String> {
        let code = unit.as_str();
        if code.len() >= self.prefix_len {
            Some(code[..self.prefix_len].to_string())
        } else {
            None
        }
    }
}
