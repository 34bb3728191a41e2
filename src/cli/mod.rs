//! Command-line parsing for the factor-shares replication kit.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the pipeline/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "fshares",
    version,
    about = "Productivity & Factor Shares Replication Kit (FRED-based)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the complete pipeline: fetch, transform, regress, test, plot.
    RunAll(RunArgs),
}

/// Options for a full pipeline run.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Use only cached data (no network requests).
    #[arg(long)]
    pub no_network: bool,

    /// Re-fetch series from FRED even when a cache file exists.
    #[arg(long)]
    pub force_refresh: bool,

    /// Directory for the raw FRED data cache.
    #[arg(long, default_value = "data/raw")]
    pub cache_dir: PathBuf,

    /// Directory for processed data output.
    #[arg(long, default_value = "data/processed")]
    pub output_dir: PathBuf,

    /// Directory for figure outputs.
    #[arg(long, default_value = "figures")]
    pub figures_dir: PathBuf,

    /// Directory for regression and stationarity results.
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// Truncation lag for HAC (Newey-West) standard errors.
    /// 4 corresponds to one year of quarterly autocorrelation structure.
    #[arg(long, default_value_t = 4)]
    pub maxlags: usize,
}
