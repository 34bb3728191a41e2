//! OLS regression with HAC (Newey-West) standard errors.
//!
//! Both factor-share regressions run against the *same* productivity-growth
//! sample, so the two results are directly comparable. The t-statistic
//! reported for the slope uses the HAC covariance, not the classical OLS one;
//! downstream consumers rely on it for inference that is robust to serial
//! correlation and heteroskedasticity in quarterly macro data.

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra::DVector;

use crate::dataset::AnalysisDataset;
use crate::domain::RegressionResult;
use crate::error::AppError;
use crate::math::{design_with_constant, hac_covariance, ols_fit, pearson_correlation};

pub const REGRESSION_JSON: &str = "regression_summary.json";
pub const REGRESSION_CSV: &str = "regression_summary.csv";

/// The two per-run regressions, sharing one independent-variable sample.
#[derive(Debug, Clone)]
pub struct RegressionSet {
    pub profit: RegressionResult,
    pub wage: RegressionResult,
}

impl RegressionSet {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &RegressionResult)> {
        [("profit", &self.profit), ("wage", &self.wage)].into_iter()
    }
}

/// Fit OLS of `y` on `[1, x]` and attach the HAC slope t-statistic.
///
/// A zero-variance `x` makes the slope unidentified; that surfaces as a named
/// fatal error rather than NaN-polluted output.
pub fn fit_ols_hac(
    x: &[f64],
    y: &[f64],
    maxlags: usize,
    dependent_var: &str,
) -> Result<RegressionResult, AppError> {
    if x.len() != y.len() {
        return Err(AppError::new(
            4,
            format!(
                "Regression on {dependent_var}: x and y lengths differ ({} vs {}).",
                x.len(),
                y.len()
            ),
        ));
    }
    if x.len() < 2 {
        return Err(AppError::new(
            4,
            format!(
                "Regression on {dependent_var}: need at least 2 observations, got {}.",
                x.len()
            ),
        ));
    }

    let mean_x = x.iter().sum::<f64>() / x.len() as f64;
    let sxx = x.iter().map(|v| (v - mean_x).powi(2)).sum::<f64>();
    if sxx <= 0.0 {
        return Err(AppError::new(
            4,
            format!("Degenerate regression on {dependent_var}: independent variable has zero variance."),
        ));
    }

    let design = design_with_constant(x);
    let yv = DVector::from_column_slice(y);
    let fit = ols_fit(&design, &yv).ok_or_else(|| {
        AppError::new(
            4,
            format!("Degenerate regression on {dependent_var}: least-squares solve failed."),
        )
    })?;

    let cov = hac_covariance(&design, &fit.residuals, maxlags).ok_or_else(|| {
        AppError::new(
            4,
            format!("Degenerate regression on {dependent_var}: HAC covariance is singular."),
        )
    })?;
    let se_slope = cov[(1, 1)].sqrt();
    if !(se_slope.is_finite() && se_slope > 0.0) {
        return Err(AppError::new(
            4,
            format!("Degenerate regression on {dependent_var}: non-positive HAC standard error."),
        ));
    }

    Ok(RegressionResult {
        dependent_var: dependent_var.to_string(),
        intercept: fit.beta[0],
        slope: fit.beta[1],
        t_hac: fit.beta[1] / se_slope,
        r2: fit.r2,
        correlation: pearson_correlation(x, y),
        n_obs: x.len(),
        maxlags,
    })
}

/// Run the profit-share and wage-share regressions against productivity growth.
pub fn run_regressions(
    analysis: &AnalysisDataset,
    maxlags: usize,
) -> Result<RegressionSet, AppError> {
    let x = &analysis.prod_yoy_pct;

    let profit = fit_ols_hac(
        x,
        &analysis.d_profit_share_yoy_pp,
        maxlags,
        "d_profit_share_yoy_pp",
    )?;
    let wage = fit_ols_hac(
        x,
        &analysis.d_wage_share_yoy_pp,
        maxlags,
        "d_wage_share_yoy_pp",
    )?;

    Ok(RegressionSet { profit, wage })
}

/// Export regression results to JSON (keyed record form) and CSV (flat table).
pub fn export_results(
    results: &RegressionSet,
    results_dir: &Path,
) -> Result<(PathBuf, PathBuf), AppError> {
    create_dir_all(results_dir).map_err(|e| {
        AppError::new(
            2,
            format!(
                "Failed to create results dir '{}': {e}",
                results_dir.display()
            ),
        )
    })?;

    let json_path = results_dir.join(REGRESSION_JSON);
    let file = File::create(&json_path).map_err(|e| {
        AppError::new(2, format!("Failed to create '{}': {e}", json_path.display()))
    })?;
    let payload = serde_json::json!({
        "profit": &results.profit,
        "wage": &results.wage,
    });
    serde_json::to_writer_pretty(file, &payload)
        .map_err(|e| AppError::new(2, format!("Failed to write regression JSON: {e}")))?;

    let csv_path = results_dir.join(REGRESSION_CSV);
    let mut file = File::create(&csv_path).map_err(|e| {
        AppError::new(2, format!("Failed to create '{}': {e}", csv_path.display()))
    })?;
    writeln!(
        file,
        "regression,dependent_var,intercept,slope,t_hac,r2,correlation,n_obs,maxlags"
    )
    .map_err(|e| AppError::new(2, format!("Failed to write regression CSV header: {e}")))?;
    for (name, r) in results.iter() {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{}",
            name,
            r.dependent_var,
            r.intercept,
            r.slope,
            r.t_hac,
            r.r2,
            r.correlation,
            r.n_obs,
            r.maxlags
        )
        .map_err(|e| AppError::new(2, format!("Failed to write regression CSV row: {e}")))?;
    }

    Ok((json_path, csv_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    #[test]
    fn recovers_known_synthetic_parameters() {
        let mut rng = StdRng::seed_from_u64(42);
        let noise = Normal::new(0.0, 0.5).unwrap();

        let x: Vec<f64> = (0..100).map(|i| i as f64 * 10.0 / 99.0).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0 + 0.5 * v + noise.sample(&mut rng)).collect();

        let result = fit_ols_hac(&x, &y, 4, "test").unwrap();
        assert!((result.intercept - 2.0).abs() < 0.5, "intercept {}", result.intercept);
        assert!((result.slope - 0.5).abs() < 0.2, "slope {}", result.slope);
        assert!(result.r2 > 0.8, "r2 {}", result.r2);
        assert_eq!(result.n_obs, 100);
        assert_eq!(result.maxlags, 4);
        assert!(result.t_hac > 5.0, "t_hac {}", result.t_hac);
        assert!(result.correlation > 0.9);
    }

    #[test]
    fn perfect_line_has_unit_r2_and_correlation() {
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| -1.0 + 0.75 * v).collect();

        let result = fit_ols_hac(&x, &y, 4, "line").unwrap();
        assert!((result.r2 - 1.0).abs() < 1e-9);
        assert!((result.correlation - 1.0).abs() < 1e-9);
        assert!((result.intercept + 1.0).abs() < 1e-8);
        assert!((result.slope - 0.75).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_x_is_a_named_degenerate_error() {
        let x = vec![3.0; 30];
        let y: Vec<f64> = (0..30).map(|i| i as f64).collect();

        let err = fit_ols_hac(&x, &y, 4, "d_wage_share_yoy_pp").unwrap_err();
        assert_eq!(err.exit_code(), 4);
        let msg = err.to_string();
        assert!(msg.contains("zero variance"), "{msg}");
        assert!(msg.contains("d_wage_share_yoy_pp"), "{msg}");
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = fit_ols_hac(&[1.0, 2.0, 3.0], &[1.0, 2.0], 4, "test").unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
