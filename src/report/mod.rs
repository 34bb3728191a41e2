//! Terminal summary of a pipeline run.

use std::fmt::Write;

use crate::app::pipeline::RunOutput;
use crate::domain::RunConfig;

/// Render the run summary printed after a successful `run-all`.
pub fn format_run_summary(run: &RunOutput, config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== fshares: productivity & factor shares ===\n");
    let _ = writeln!(
        out,
        "Analysis sample: {} quarterly observations",
        run.analysis.len()
    );
    if let Some((first, last)) = run.analysis.date_range() {
        let _ = writeln!(out, "Date range:      {first} .. {last}");
    }
    out.push('\n');

    out.push_str("Regressions (y on productivity growth):\n");
    for (name, r) in run.regressions.iter() {
        let _ = writeln!(out, "  [{name}] {}", r.dependent_var);
        let _ = writeln!(
            out,
            "    slope {:+.4}  HAC t {:+.2} (L={})  R2 {:.3}  corr {:+.3}  n {}",
            r.slope, r.t_hac, r.maxlags, r.r2, r.correlation, r.n_obs
        );
    }
    out.push('\n');

    out.push_str("Stationarity (ADF + KPSS):\n");
    for s in &run.stationarity {
        let verdict = if s.is_stationary {
            "stationary"
        } else {
            "NOT stationary"
        };
        let _ = writeln!(
            out,
            "  {:<24} ADF {:+.3} (p {:.3})  KPSS {:.3} (p {:.3})  -> {verdict}",
            s.variable, s.adf_stat, s.adf_pvalue, s.kpss_stat, s.kpss_pvalue
        );
    }
    out.push('\n');

    out.push_str("Artifacts:\n");
    let _ = writeln!(out, "  dataset      {}", run.dataset_file.display());
    let _ = writeln!(
        out,
        "  regressions  {}  {}",
        run.regression_files.0.display(),
        run.regression_files.1.display()
    );
    let _ = writeln!(
        out,
        "  stationarity {}  {}",
        run.stationarity_files.0.display(),
        run.stationarity_files.1.display()
    );
    for (_, path) in &run.figures {
        let _ = writeln!(out, "  figure       {}", path.display());
    }
    if config.no_network {
        out.push_str("\n(offline run: cached data only)\n");
    }

    out
}
