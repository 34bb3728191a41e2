//! Least-squares and robust-covariance primitives.
//!
//! Both the regression engine and the stationarity tests reduce to small dense
//! OLS problems (2..~15 columns, a few hundred quarterly rows), so we solve
//! them directly with nalgebra.
//!
//! Implementation choices:
//! - We use SVD to solve the least-squares problem robustly even when the
//!   design matrix is tall (more rows than columns).
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - The HAC covariance uses Bartlett weights `1 - j/(L+1)` up to the
//!   truncation lag, the plain Newey-West sandwich without a small-sample
//!   correction.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Plain OLS fit of `y` on the columns of `x`.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta: DVector<f64>,
    pub residuals: DVector<f64>,
    pub ssr: f64,
    /// `1 - SSR/SST`; NaN when y has zero variance.
    pub r2: f64,
}

pub fn ols_fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    let beta = solve_least_squares(x, y)?;
    let residuals = y - x * &beta;
    let ssr = residuals.iter().map(|r| r * r).sum::<f64>();
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let sst = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    let r2 = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };
    Some(OlsFit {
        beta,
        residuals,
        ssr,
        r2,
    })
}

/// Build the `[1, x]` design matrix for a simple regression with intercept.
pub fn design_with_constant(x: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), 2, |r, c| if c == 0 { 1.0 } else { x[r] })
}

/// Newey-West (HAC) covariance of OLS coefficients.
///
/// `cov = (X'X)^-1 S (X'X)^-1` with
/// `S = Γ_0 + Σ_{j=1..L} w_j (Γ_j + Γ_j')`, `w_j = 1 - j/(L+1)`.
///
/// Returns `None` when `X'X` is singular or there are not enough rows.
pub fn hac_covariance(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    maxlags: usize,
) -> Option<DMatrix<f64>> {
    let n = x.nrows();
    let k = x.ncols();
    if n <= k || residuals.len() != n {
        return None;
    }

    let xtx = x.transpose() * x;
    let xtx_inv = xtx.try_inverse()?;

    let mut s = DMatrix::zeros(k, k);
    for t in 0..n {
        let xt = x.row(t).transpose();
        s += &xt * xt.transpose() * (residuals[t] * residuals[t]);
    }
    for lag in 1..=maxlags.min(n - 1) {
        let weight = 1.0 - lag as f64 / (maxlags as f64 + 1.0);
        let mut gamma = DMatrix::zeros(k, k);
        for t in lag..n {
            let xt = x.row(t).transpose();
            let xl = x.row(t - lag).transpose();
            gamma += &xt * xl.transpose() * (residuals[t] * residuals[t - lag]);
        }
        s += (&gamma + gamma.transpose()) * weight;
    }

    Some(&xtx_inv * s * xtx_inv)
}

/// Pearson correlation of two equal-length samples.
///
/// NaN when either sample has zero variance or the sample is empty.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len();
    if n == 0 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mx = x.iter().sum::<f64>() / nf;
    let my = y.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ols_fit_perfect_line_has_unit_r2() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let design = design_with_constant(&xs);
        let y = DVector::from_iterator(20, xs.iter().map(|&x| 1.5 - 0.25 * x));

        let fit = ols_fit(&design, &y).unwrap();
        assert!((fit.beta[0] - 1.5).abs() < 1e-9);
        assert!((fit.beta[1] + 0.25).abs() < 1e-9);
        assert!((fit.r2 - 1.0).abs() < 1e-9);
        assert!(fit.ssr < 1e-12);
    }

    #[test]
    fn hac_covariance_is_finite_and_positive_on_diagonal() {
        let xs: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37).sin()).collect();
        let design = design_with_constant(&xs);
        let y = DVector::from_iterator(
            50,
            xs.iter()
                .enumerate()
                .map(|(i, &x)| 0.5 + 2.0 * x + (i as f64 * 1.7).cos() * 0.1),
        );

        let fit = ols_fit(&design, &y).unwrap();
        let cov = hac_covariance(&design, &fit.residuals, 4).unwrap();
        assert!(cov[(0, 0)] > 0.0);
        assert!(cov[(1, 1)] > 0.0);
        assert!(cov.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn pearson_correlation_hits_the_extremes() {
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let up: Vec<f64> = x.iter().map(|v| 3.0 * v + 1.0).collect();
        let down: Vec<f64> = x.iter().map(|v| -v).collect();

        assert!((pearson_correlation(&x, &up) - 1.0).abs() < 1e-12);
        assert!((pearson_correlation(&x, &down) + 1.0).abs() < 1e-12);
        assert!(pearson_correlation(&x, &vec![5.0; 30]).is_nan());
    }
}
