//! End-to-end pipeline: fetch, transform, regress, test, plot.

use std::path::PathBuf;

use crate::analysis::{self, RegressionSet};
use crate::data::FredClient;
use crate::dataset::{self, AnalysisDataset};
use crate::domain::{RunConfig, StationarityResult};
use crate::error::AppError;
use crate::plot;
use crate::stationarity;

/// Everything a full run produces, for the terminal report and for tests.
pub struct RunOutput {
    pub analysis: AnalysisDataset,
    pub regressions: RegressionSet,
    pub stationarity: Vec<StationarityResult>,
    pub dataset_file: PathBuf,
    pub regression_files: (PathBuf, PathBuf),
    pub stationarity_files: (PathBuf, PathBuf),
    pub figures: Vec<(String, PathBuf)>,
}

/// Run the whole pipeline per `config`.
///
/// Stages run strictly in order; the first failing stage aborts the run with
/// its own exit code and nothing after it executes.
pub fn run_all(config: &RunConfig) -> Result<RunOutput, AppError> {
    let client = FredClient::new(&config.cache_dir, config.no_network)?;

    let build = dataset::build_analysis_dataset(&client, config)?;

    let regressions = analysis::run_regressions(&build.analysis, config.maxlags)?;
    let regression_files = analysis::export_results(&regressions, &config.results_dir)?;

    let stationarity = stationarity::run_stationarity_tests(&build.transformed)?;
    let stationarity_files =
        stationarity::export_stationarity_results(&stationarity, &config.results_dir)?;

    let figures = plot::create_all_plots(
        &build.analysis,
        &regressions,
        &config.figures_dir,
        &config.output_dir,
    )?;

    Ok(RunOutput {
        analysis: build.analysis,
        regressions,
        stationarity,
        dataset_file: build.output_file,
        regression_files,
        stationarity_files,
        figures,
    })
}
