//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during the pipeline run
//! - exported to JSON/CSV result files
//! - reloaded later for comparisons across runs

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The four quarterly FRED series the pipeline replicates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesId {
    /// Output per hour, nonfarm business sector (productivity index).
    Ophnfb,
    /// Gross domestic product.
    Gdp,
    /// Corporate profits with IVA and CCAdj.
    Cprofit,
    /// Compensation of employees, paid.
    Coe,
}

impl SeriesId {
    pub const ALL: [SeriesId; 4] = [
        SeriesId::Ophnfb,
        SeriesId::Gdp,
        SeriesId::Cprofit,
        SeriesId::Coe,
    ];

    /// FRED series identifier, also used as the cache file stem and the raw
    /// column name after merging.
    pub fn code(self) -> &'static str {
        match self {
            SeriesId::Ophnfb => "OPHNFB",
            SeriesId::Gdp => "GDP",
            SeriesId::Cprofit => "CPROFIT",
            SeriesId::Coe => "COE",
        }
    }

    /// Descriptive title, used as the offline metadata fallback.
    pub fn title(self) -> &'static str {
        match self {
            SeriesId::Ophnfb => "Output Per Hour of All Persons, Nonfarm Business Sector",
            SeriesId::Gdp => "Gross Domestic Product",
            SeriesId::Cprofit => "Corporate Profits with IVA and CCAdj",
            SeriesId::Coe => "Compensation of Employees, Paid",
        }
    }
}

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One raw series as returned by the cache/client.
///
/// Dates are strictly increasing with no duplicates; non-numeric FRED values
/// (the `"."` placeholder) are `None`. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    pub id: SeriesId,
    pub observations: Vec<(NaiveDate, Option<f64>)>,
}

impl SeriesTable {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn all_missing(&self) -> bool {
        self.observations.iter().all(|(_, v)| v.is_none())
    }
}

/// OLS + HAC regression output for one dependent variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub dependent_var: String,
    pub intercept: f64,
    pub slope: f64,
    /// t-statistic of the slope under Newey-West (HAC) standard errors.
    pub t_hac: f64,
    pub r2: f64,
    /// Pearson correlation of the raw x and y samples.
    pub correlation: f64,
    pub n_obs: usize,
    /// Truncation lag used for the HAC covariance.
    pub maxlags: usize,
}

/// ADF + KPSS output for one tested variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityResult {
    pub variable: String,
    pub adf_stat: f64,
    pub adf_pvalue: f64,
    pub adf_critical_1pct: f64,
    pub adf_critical_5pct: f64,
    pub kpss_stat: f64,
    pub kpss_pvalue: f64,
    pub kpss_critical_5pct: f64,
    /// `true` only when ADF rejects a unit root (p < 0.05) *and* KPSS fails
    /// to reject stationarity (p > 0.05).
    pub is_stationary: bool,
}

/// Resolved run configuration (CLI flags plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub no_network: bool,
    pub force_refresh: bool,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub figures_dir: PathBuf,
    pub results_dir: PathBuf,
    pub maxlags: usize,
}
