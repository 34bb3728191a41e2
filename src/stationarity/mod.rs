//! Unit-root and stationarity tests (ADF + KPSS).
//!
//! Two complementary tests with opposite null hypotheses:
//!
//! - **ADF**: null = the series has a unit root. Lag order is picked by
//!   minimizing AIC over a fixed estimation sample, then the Dickey-Fuller
//!   regression is refit at the chosen lag on the longest available sample.
//! - **KPSS**: null = the series is stationary around a constant level.
//!   Long-run variance uses a Bartlett kernel at a data-dependent lag.
//!
//! A variable is declared stationary only when ADF rejects (p < 0.05) *and*
//! KPSS fails to reject (p > 0.05); any disagreement yields `false`.
//!
//! P-values come from interpolation through finite-sample critical values
//! (the constant-only case); exact response-surface tables are out of scope,
//! but the p < 0.05 decisions agree for clearly stationary and clearly
//! unit-root inputs.

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};

use crate::dataset::TransformedDataset;
use crate::domain::StationarityResult;
use crate::error::AppError;

pub const STATIONARITY_JSON: &str = "stationarity_tests.json";
pub const STATIONARITY_CSV: &str = "stationarity_tests.csv";

/// The variables whose stationarity underpins the regressions.
pub const TESTED_VARIABLES: [&str; 3] = [
    "prod_yoy_pct",
    "d_profit_share_yoy_pp",
    "d_wage_share_yoy_pp",
];

/// Minimum observations either test will accept.
const MIN_OBS: usize = 10;

/// KPSS critical values for the constant (level-stationarity) case, as
/// (critical value, significance) pairs in increasing statistic order.
const KPSS_CRITICAL: [(f64, f64); 4] = [(0.347, 0.10), (0.463, 0.05), (0.574, 0.025), (0.739, 0.01)];

#[derive(Debug, Clone)]
pub struct AdfOutcome {
    pub stat: f64,
    pub pvalue: f64,
    pub critical_1pct: f64,
    pub critical_5pct: f64,
}

#[derive(Debug, Clone)]
pub struct KpssOutcome {
    pub stat: f64,
    pub pvalue: f64,
    pub critical_5pct: f64,
}

/// Augmented Dickey-Fuller test with AIC lag selection.
pub fn adf_test(series: &[f64]) -> Result<AdfOutcome, AppError> {
    let n = series.len();
    if n < MIN_OBS {
        return Err(AppError::new(
            4,
            format!("series too short for ADF test (n={n}, need {MIN_OBS})"),
        ));
    }

    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    // Schwert rule, capped so the fixed AIC sample keeps enough rows.
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)) as usize;
    let maxlag = schwert.min(diff.len().saturating_sub(5) / 2);

    // Pick the lag order on a fixed sample so AIC values are comparable.
    let mut best: Option<(f64, usize)> = None;
    for k in 0..=maxlag {
        let Some(reg) = df_regression(series, &diff, k, maxlag) else {
            continue;
        };
        let aic = reg.nobs as f64 * (reg.ssr / reg.nobs as f64).ln() + 2.0 * reg.nparams as f64;
        if best.map_or(true, |(best_aic, _)| aic < best_aic) {
            best = Some((aic, k));
        }
    }
    let (_, usedlag) =
        best.ok_or_else(|| AppError::new(4, "ADF lag search found no solvable regression"))?;

    // Refit at the chosen lag on the longest sample.
    let reg = df_regression(series, &diff, usedlag, usedlag)
        .ok_or_else(|| AppError::new(4, "ADF regression is singular at the selected lag"))?;

    let (critical_1pct, critical_5pct, _) = adf_critical_values(n);
    Ok(AdfOutcome {
        stat: reg.t_stat,
        pvalue: adf_pvalue(reg.t_stat, n),
        critical_1pct,
        critical_5pct,
    })
}

/// KPSS test for level stationarity.
pub fn kpss_test(series: &[f64]) -> Result<KpssOutcome, AppError> {
    let n = series.len();
    if n < MIN_OBS {
        return Err(AppError::new(
            4,
            format!("series too short for KPSS test (n={n}, need {MIN_OBS})"),
        ));
    }
    let nf = n as f64;

    let mean = series.iter().sum::<f64>() / nf;
    let demeaned: Vec<f64> = series.iter().map(|v| v - mean).collect();

    let mut partial_sums = Vec::with_capacity(n);
    let mut cumsum = 0.0;
    for r in &demeaned {
        cumsum += r;
        partial_sums.push(cumsum);
    }

    // Long-run variance with a Bartlett kernel at the data-dependent lag.
    let lag = ((4.0 * (nf / 100.0).powf(0.25)) as usize).min(n - 1);
    let mut s2 = demeaned.iter().map(|r| r * r).sum::<f64>() / nf;
    for l in 1..=lag {
        let weight = 1.0 - l as f64 / (lag + 1) as f64;
        let gamma: f64 = demeaned[l..]
            .iter()
            .zip(&demeaned[..n - l])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / nf;
        s2 += 2.0 * weight * gamma;
    }
    if !(s2.is_finite() && s2 > 0.0) {
        return Err(AppError::new(
            4,
            "KPSS long-run variance is not positive (constant series?)",
        ));
    }

    let stat = partial_sums.iter().map(|s| s * s).sum::<f64>() / (nf * nf) / s2;

    Ok(KpssOutcome {
        stat,
        pvalue: kpss_pvalue(stat),
        critical_5pct: 0.463,
    })
}

/// Run both tests on one variable and combine the verdicts.
pub fn test_variable(name: &str, series: &[f64]) -> Result<StationarityResult, AppError> {
    let wrap = |e: AppError| AppError::new(4, format!("Stationarity test failed for {name}: {e}"));

    let adf = adf_test(series).map_err(wrap)?;
    let kpss = kpss_test(series).map_err(wrap)?;

    // Stationary only when both tests agree: ADF rejects a unit root and
    // KPSS fails to reject stationarity.
    let is_stationary = adf.pvalue < 0.05 && kpss.pvalue > 0.05;

    Ok(StationarityResult {
        variable: name.to_string(),
        adf_stat: adf.stat,
        adf_pvalue: adf.pvalue,
        adf_critical_1pct: adf.critical_1pct,
        adf_critical_5pct: adf.critical_5pct,
        kpss_stat: kpss.stat,
        kpss_pvalue: kpss.pvalue,
        kpss_critical_5pct: kpss.critical_5pct,
        is_stationary,
    })
}

/// Test the three key variables, each on its own non-missing sample.
pub fn run_stationarity_tests(
    transformed: &TransformedDataset,
) -> Result<Vec<StationarityResult>, AppError> {
    let columns: [(&str, &[Option<f64>]); 3] = [
        ("prod_yoy_pct", &transformed.prod_yoy_pct),
        ("d_profit_share_yoy_pp", &transformed.d_profit_share_yoy_pp),
        ("d_wage_share_yoy_pp", &transformed.d_wage_share_yoy_pp),
    ];

    let mut results = Vec::with_capacity(columns.len());
    for (name, column) in columns {
        let series: Vec<f64> = column.iter().filter_map(|v| *v).collect();
        results.push(test_variable(name, &series)?);
    }
    Ok(results)
}

/// Export stationarity results to JSON (keyed by variable) and CSV.
pub fn export_stationarity_results(
    results: &[StationarityResult],
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

    let json_path = results_dir.join(STATIONARITY_JSON);
    let file = File::create(&json_path).map_err(|e| {
        AppError::new(2, format!("Failed to create '{}': {e}", json_path.display()))
    })?;
    let mut payload = serde_json::Map::new();
    for result in results {
        let value = serde_json::to_value(result)
            .map_err(|e| AppError::new(2, format!("Failed to serialize stationarity result: {e}")))?;
        payload.insert(result.variable.clone(), value);
    }
    serde_json::to_writer_pretty(file, &payload)
        .map_err(|e| AppError::new(2, format!("Failed to write stationarity JSON: {e}")))?;

    let csv_path = results_dir.join(STATIONARITY_CSV);
    let mut file = File::create(&csv_path).map_err(|e| {
        AppError::new(2, format!("Failed to create '{}': {e}", csv_path.display()))
    })?;
    writeln!(
        file,
        "variable,adf_stat,adf_pvalue,adf_critical_1pct,adf_critical_5pct,kpss_stat,kpss_pvalue,kpss_critical_5pct,is_stationary"
    )
    .map_err(|e| AppError::new(2, format!("Failed to write stationarity CSV header: {e}")))?;
    for r in results {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{}",
            r.variable,
            r.adf_stat,
            r.adf_pvalue,
            r.adf_critical_1pct,
            r.adf_critical_5pct,
            r.kpss_stat,
            r.kpss_pvalue,
            r.kpss_critical_5pct,
            r.is_stationary
        )
        .map_err(|e| AppError::new(2, format!("Failed to write stationarity CSV row: {e}")))?;
    }

    Ok((json_path, csv_path))
}

struct DfRegression {
    t_stat: f64,
    ssr: f64,
    nobs: usize,
    nparams: usize,
}

/// Dickey-Fuller regression `Δy_t = α + ρ y_{t-1} + Σ γ_i Δy_{t-i} + ε_t`
/// with `k` lagged differences, using rows `start..` of the difference series.
///
/// `start >= k` must hold so every lagged difference exists.
fn df_regression(series: &[f64], diff: &[f64], k: usize, start: usize) -> Option<DfRegression> {
    debug_assert!(start >= k);
    let nobs = diff.len().checked_sub(start)?;
    let nparams = k + 2;
    if nobs <= nparams {
        return None;
    }

    let mut x_data = Vec::with_capacity(nobs * nparams);
    let mut y_data = Vec::with_capacity(nobs);
    for t in start..diff.len() {
        x_data.push(1.0);
        x_data.push(series[t]);
        for j in 1..=k {
            x_data.push(diff[t - j]);
        }
        y_data.push(diff[t]);
    }

    let x = DMatrix::from_row_slice(nobs, nparams, &x_data);
    let y = DVector::from_vec(y_data);

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse()?;
    let beta = &xtx_inv * (x.transpose() * &y);

    let residuals = &y - &x * &beta;
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    let mse = ssr / (nobs - nparams) as f64;

    let se = (mse * xtx_inv[(1, 1)]).sqrt();
    if !(se.is_finite() && se > 0.0) {
        return None;
    }

    Some(DfRegression {
        t_stat: beta[1] / se,
        ssr,
        nobs,
        nparams,
    })
}

/// Finite-sample ADF critical values for the constant-only regression:
/// (1%, 5%, 10%).
fn adf_critical_values(n: usize) -> (f64, f64, f64) {
    let nf = n as f64;
    (
        -3.43 - 6.0 / nf,
        -2.86 - 4.0 / nf,
        -2.57 - 3.0 / nf,
    )
}

/// Approximate ADF p-value by interpolating through the critical values.
fn adf_pvalue(t_stat: f64, n: usize) -> f64 {
    let (cv_1, cv_5, cv_10) = adf_critical_values(n);

    if t_stat < cv_1 {
        0.01 * (t_stat - cv_1).exp()
    } else if t_stat < cv_5 {
        0.01 + (0.05 - 0.01) * (t_stat - cv_1) / (cv_5 - cv_1)
    } else if t_stat < cv_10 {
        0.05 + (0.10 - 0.05) * (t_stat - cv_5) / (cv_10 - cv_5)
    } else {
        0.10 + 0.90 * (1.0 - (-0.5 * (t_stat - cv_10)).exp())
    }
}

/// KPSS p-value by linear interpolation through the critical-value table,
/// clamped to [0.01, 0.10] the way the reference tables are.
fn kpss_pvalue(stat: f64) -> f64 {
    let (first_cv, first_p) = KPSS_CRITICAL[0];
    if stat <= first_cv {
        return first_p;
    }
    let (last_cv, last_p) = KPSS_CRITICAL[KPSS_CRITICAL.len() - 1];
    if stat >= last_cv {
        return last_p;
    }
    for pair in KPSS_CRITICAL.windows(2) {
        let (lo_cv, lo_p) = pair[0];
        let (hi_cv, hi_p) = pair[1];
        if stat <= hi_cv {
            return lo_p + (hi_p - lo_p) * (stat - lo_cv) / (hi_cv - lo_cv);
        }
    }
    last_p
}
