//! Scatter and binscatter figures (PNG).
//!
//! Rendering is geometry-only: observation points, the fitted regression
//! line, zero axes, and error bars. The numeric summary (slope, HAC t, R²)
//! lives in the terminal report and the results files, so the figures carry
//! no text and plotters needs no font machinery.

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::analysis::RegressionSet;
use crate::dataset::AnalysisDataset;
use crate::domain::RegressionResult;
use crate::error::AppError;

const PANEL_WIDTH: u32 = 660;
const PANEL_HEIGHT: u32 = 500;

pub const DEFAULT_BINS: usize = 20;

/// Per-bin summary of a scatter: quantile bins of x, mean x / mean y and the
/// standard error of y within each bin. Empty bins keep zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct BinscatterData {
    pub bin_mean_x: Vec<f64>,
    pub bin_mean_y: Vec<f64>,
    pub bin_se_y: Vec<f64>,
    pub bin_count: Vec<usize>,
}

/// Compute binscatter data with quantile bins.
pub fn compute_binscatter_data(x: &[f64], y: &[f64], n_bins: usize) -> BinscatterData {
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut edges = Vec::with_capacity(n_bins + 1);
    for q in 0..=n_bins {
        edges.push(percentile(&sorted, q as f64 / n_bins as f64));
    }
    // Nudge the top edge so the max observation falls into the last bin.
    let last = edges.len() - 1;
    edges[last] += 1e-10;

    let bins: Vec<usize> = x
        .iter()
        .map(|&v| {
            let idx = edges.partition_point(|e| *e <= v);
            idx.saturating_sub(1).min(n_bins - 1)
        })
        .collect();

    let mut bin_count = vec![0usize; n_bins];
    let mut sum_x = vec![0.0; n_bins];
    let mut sum_y = vec![0.0; n_bins];
    for (i, &b) in bins.iter().enumerate() {
        bin_count[b] += 1;
        sum_x[b] += x[i];
        sum_y[b] += y[i];
    }

    let mut bin_mean_x = vec![0.0; n_bins];
    let mut bin_mean_y = vec![0.0; n_bins];
    for b in 0..n_bins {
        if bin_count[b] > 0 {
            bin_mean_x[b] = sum_x[b] / bin_count[b] as f64;
            bin_mean_y[b] = sum_y[b] / bin_count[b] as f64;
        }
    }

    let mut ssd_y = vec![0.0; n_bins];
    for (i, &b) in bins.iter().enumerate() {
        ssd_y[b] += (y[i] - bin_mean_y[b]).powi(2);
    }
    let bin_se_y = (0..n_bins)
        .map(|b| {
            if bin_count[b] > 1 {
                (ssd_y[b] / (bin_count[b] - 1) as f64).sqrt() / (bin_count[b] as f64).sqrt()
            } else {
                0.0
            }
        })
        .collect();

    BinscatterData {
        bin_mean_x,
        bin_mean_y,
        bin_se_y,
        bin_count,
    }
}

/// Create a scatter plot with the fitted regression line.
pub fn make_scatter_plot(
    x: &[f64],
    y: &[f64],
    result: &RegressionResult,
    path: &Path,
) -> Result<PathBuf, AppError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (PANEL_WIDTH, PANEL_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| render_error(path, e))?;
    draw_scatter_panel(&root, x, y, result).map_err(|e| e.at(path))?;
    root.present().map_err(|e| render_error(path, e))?;
    Ok(path.to_path_buf())
}

/// Create a binscatter plot with error bars and the fitted regression line.
///
/// Returns the path plus the bin data so the caller can persist it.
pub fn make_binscatter_plot(
    x: &[f64],
    y: &[f64],
    result: &RegressionResult,
    path: &Path,
    n_bins: usize,
) -> Result<(PathBuf, BinscatterData), AppError> {
    let data = compute_binscatter_data(x, y, n_bins);

    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (PANEL_WIDTH, PANEL_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| render_error(path, e))?;
    draw_binscatter_panel(&root, x, &data, result).map_err(|e| e.at(path))?;
    root.present().map_err(|e| render_error(path, e))?;

    Ok((path.to_path_buf(), data))
}

/// One panel of a side-by-side composite.
pub struct PanelData<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub result: &'a RegressionResult,
}

/// Render two scatter panels side by side into one bitmap.
pub fn make_scatter_combined(
    left: &PanelData<'_>,
    right: &PanelData<'_>,
    path: &Path,
) -> Result<PathBuf, AppError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (2 * PANEL_WIDTH, PANEL_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| render_error(path, e))?;
    let halves = root.split_evenly((1, 2));
    draw_scatter_panel(&halves[0], left.x, left.y, left.result).map_err(|e| e.at(path))?;
    draw_scatter_panel(&halves[1], right.x, right.y, right.result).map_err(|e| e.at(path))?;
    root.present().map_err(|e| render_error(path, e))?;
    Ok(path.to_path_buf())
}

/// Render two binscatter panels side by side into one bitmap.
pub fn make_binscatter_combined(
    left: &PanelData<'_>,
    right: &PanelData<'_>,
    path: &Path,
    n_bins: usize,
) -> Result<PathBuf, AppError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (2 * PANEL_WIDTH, PANEL_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| render_error(path, e))?;
    let halves = root.split_evenly((1, 2));
    for (half, panel) in halves.iter().zip([left, right]) {
        let data = compute_binscatter_data(panel.x, panel.y, n_bins);
        draw_binscatter_panel(half, panel.x, &data, panel.result).map_err(|e| e.at(path))?;
    }
    root.present().map_err(|e| render_error(path, e))?;
    Ok(path.to_path_buf())
}

/// Create every figure for the analysis and persist the binscatter bin data.
///
/// Returns `(name, path)` pairs in creation order.
pub fn create_all_plots(
    analysis: &AnalysisDataset,
    results: &RegressionSet,
    figures_dir: &Path,
    processed_dir: &Path,
) -> Result<Vec<(String, PathBuf)>, AppError> {
    let x = &analysis.prod_yoy_pct;
    let profit_panel = PanelData {
        x,
        y: &analysis.d_profit_share_yoy_pp,
        result: &results.profit,
    };
    let wage_panel = PanelData {
        x,
        y: &analysis.d_wage_share_yoy_pp,
        result: &results.wage,
    };

    let mut out = Vec::new();

    let path = make_scatter_plot(
        profit_panel.x,
        profit_panel.y,
        profit_panel.result,
        &figures_dir.join("scatter_profit_share.png"),
    )?;
    out.push(("scatter_profit".to_string(), path));

    let path = make_scatter_plot(
        wage_panel.x,
        wage_panel.y,
        wage_panel.result,
        &figures_dir.join("scatter_wage_share.png"),
    )?;
    out.push(("scatter_wage".to_string(), path));

    let path = make_scatter_combined(
        &profit_panel,
        &wage_panel,
        &figures_dir.join("scatter_combined.png"),
    )?;
    out.push(("scatter_combined".to_string(), path));

    let (path, profit_bins) = make_binscatter_plot(
        profit_panel.x,
        profit_panel.y,
        profit_panel.result,
        &figures_dir.join("binscatter_profit_share.png"),
        DEFAULT_BINS,
    )?;
    out.push(("binscatter_profit".to_string(), path));
    write_binscatter_csv(&profit_bins, &processed_dir.join("binscatter_profit.csv"))?;

    let (path, wage_bins) = make_binscatter_plot(
        wage_panel.x,
        wage_panel.y,
        wage_panel.result,
        &figures_dir.join("binscatter_wage_share.png"),
        DEFAULT_BINS,
    )?;
    out.push(("binscatter_wage".to_string(), path));
    write_binscatter_csv(&wage_bins, &processed_dir.join("binscatter_wage.csv"))?;

    let path = make_binscatter_combined(
        &profit_panel,
        &wage_panel,
        &figures_dir.join("binscatter_combined.png"),
        DEFAULT_BINS,
    )?;
    out.push(("binscatter_combined".to_string(), path));

    Ok(out)
}

fn write_binscatter_csv(data: &BinscatterData, path: &Path) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = std::fs::File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create '{}': {e}", path.display()))
    })?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["bin_mean_x", "bin_mean_y", "bin_se_y"])
        .map_err(|e| AppError::new(2, format!("Failed to write binscatter header: {e}")))?;
    for i in 0..data.bin_mean_x.len() {
        writer
            .write_record([
                data.bin_mean_x[i].to_string(),
                data.bin_mean_y[i].to_string(),
                data.bin_se_y[i].to_string(),
            ])
            .map_err(|e| AppError::new(2, format!("Failed to write binscatter row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))
}

/// Render error carrying the failing draw step until the output path is known.
struct DrawError(String);

impl DrawError {
    fn at(self, path: &Path) -> AppError {
        AppError::new(
            2,
            format!("Failed to render '{}': {}", path.display(), self.0),
        )
    }
}

fn render_error<E: std::fmt::Display>(path: &Path, e: E) -> AppError {
    AppError::new(2, format!("Failed to render '{}': {e}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).map_err(|e| {
                AppError::new(
                    2,
                    format!("Failed to create figure dir '{}': {e}", parent.display()),
                )
            })?;
        }
    }
    Ok(())
}

fn draw_scatter_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    x: &[f64],
    y: &[f64],
    result: &RegressionResult,
) -> Result<(), DrawError> {
    let (x_min, x_max) = axis_range(x);
    let (y_min, y_max) = axis_range(y);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| DrawError(e.to_string()))?;

    draw_zero_axes(&mut chart, x_min, x_max, y_min, y_max)?;

    chart
        .draw_series(
            x.iter()
                .zip(y)
                .map(|(&xi, &yi)| Circle::new((xi, yi), 3, BLUE.mix(0.7).filled())),
        )
        .map_err(|e| DrawError(e.to_string()))?;

    draw_fit_line(&mut chart, result, x_min, x_max)?;
    Ok(())
}

fn draw_binscatter_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    x: &[f64],
    data: &BinscatterData,
    result: &RegressionResult,
) -> Result<(), DrawError> {
    let (x_min, x_max) = axis_range(x);
    let lo = data
        .bin_mean_y
        .iter()
        .zip(&data.bin_se_y)
        .map(|(m, s)| m - s)
        .collect::<Vec<_>>();
    let hi = data
        .bin_mean_y
        .iter()
        .zip(&data.bin_se_y)
        .map(|(m, s)| m + s)
        .collect::<Vec<_>>();
    let (y_min, _) = axis_range(&lo);
    let (_, y_max) = axis_range(&hi);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| DrawError(e.to_string()))?;

    draw_zero_axes(&mut chart, x_min, x_max, y_min, y_max)?;

    // Error bars with small caps, one segment per populated bin.
    let cap = 0.01 * (x_max - x_min);
    for b in 0..data.bin_mean_x.len() {
        if data.bin_count[b] == 0 {
            continue;
        }
        let (bx, by, se) = (data.bin_mean_x[b], data.bin_mean_y[b], data.bin_se_y[b]);
        chart
            .draw_series(LineSeries::new(vec![(bx, by - se), (bx, by + se)], &BLUE))
            .map_err(|e| DrawError(e.to_string()))?;
        for end in [by - se, by + se] {
            chart
                .draw_series(LineSeries::new(vec![(bx - cap, end), (bx + cap, end)], &BLUE))
                .map_err(|e| DrawError(e.to_string()))?;
        }
    }

    chart
        .draw_series(
            (0..data.bin_mean_x.len())
                .filter(|&b| data.bin_count[b] > 0)
                .map(|b| {
                    Circle::new(
                        (data.bin_mean_x[b], data.bin_mean_y[b]),
                        4,
                        BLUE.mix(0.7).filled(),
                    )
                }),
        )
        .map_err(|e| DrawError(e.to_string()))?;

    draw_fit_line(&mut chart, result, x_min, x_max)?;
    Ok(())
}

fn draw_zero_axes<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
) -> Result<(), DrawError> {
    chart
        .draw_series(LineSeries::new(vec![(x_min, 0.0), (x_max, 0.0)], &BLACK))
        .map_err(|e| DrawError(e.to_string()))?;
    chart
        .draw_series(LineSeries::new(vec![(0.0, y_min), (0.0, y_max)], &BLACK))
        .map_err(|e| DrawError(e.to_string()))?;
    Ok(())
}

fn draw_fit_line<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    result: &RegressionResult,
    x_min: f64,
    x_max: f64,
) -> Result<(), DrawError> {
    let intercept = result.intercept;
    let slope = result.slope;
    chart
        .draw_series(LineSeries::new(
            (0..200).map(move |i| {
                let t = x_min + (x_max - x_min) * i as f64 / 199.0;
                (t, intercept + slope * t)
            }),
            RED.stroke_width(2),
        ))
        .map_err(|e| DrawError(e.to_string()))?;
    Ok(())
}

/// Axis range covering the data and the origin, with a little padding.
fn axis_range(values: &[f64]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !(min.is_finite() && max.is_finite()) {
        return (-1.0, 1.0);
    }
    let span = (max - min).max(1e-9);
    ((min - 0.05 * span).min(0.0), (max + 0.05 * span).max(0.0))
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}
