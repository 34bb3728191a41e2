//! Offline end-to-end run against a synthetic FRED cache.

use std::fs;
use std::path::Path;

use chrono::{Months, NaiveDate};

use factor_shares::app::pipeline;
use factor_shares::domain::RunConfig;

const QUARTERS: usize = 60;

fn seed_cache(cache_dir: &Path) {
    fs::create_dir_all(cache_dir).unwrap();
    let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..QUARTERS)
        .map(|i| start + Months::new(3 * i as u32))
        .collect();

    let gdp: Vec<f64> = (0..QUARTERS).map(|i| 1000.0 * 1.01f64.powi(i as i32)).collect();
    let series: [(&str, Vec<f64>); 4] = [
        (
            "OPHNFB",
            (0..QUARTERS)
                .map(|i| 100.0 * (0.005 * i as f64 + 0.01 * (0.7 * i as f64).sin()).exp())
                .collect(),
        ),
        ("GDP", gdp.clone()),
        (
            "CPROFIT",
            (0..QUARTERS)
                .map(|i| 0.10 * gdp[i] * (1.0 + 0.02 * (i as f64).sin()))
                .collect(),
        ),
        (
            "COE",
            (0..QUARTERS)
                .map(|i| 0.55 * gdp[i] * (1.0 - 0.01 * (i as f64).sin()))
                .collect(),
        ),
    ];

    for (code, values) in series {
        let mut csv = format!("date,{code}\n");
        for (date, value) in dates.iter().zip(&values) {
            csv.push_str(&format!("{date},{value}\n"));
        }
        fs::write(cache_dir.join(format!("{code}.csv")), csv).unwrap();
    }
}

#[test]
fn offline_run_produces_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        no_network: true,
        force_refresh: false,
        cache_dir: dir.path().join("data/raw"),
        output_dir: dir.path().join("data/processed"),
        figures_dir: dir.path().join("figures"),
        results_dir: dir.path().join("results"),
        maxlags: 4,
    };
    seed_cache(&config.cache_dir);

    let output = pipeline::run_all(&config).unwrap();

    // Processed dataset: six dense columns, one row per complete quarter.
    let dataset_path = config.output_dir.join("dshares_vs_prod.csv");
    assert_eq!(output.dataset_file, dataset_path);
    let mut reader = csv::Reader::from_path(&dataset_path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec![
            "date",
            "prod_yoy_pct",
            "d_wage_share_yoy_pp",
            "wage_share_pct",
            "d_profit_share_yoy_pp",
            "profit_share_pct",
        ]
    );
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), QUARTERS - 4);
    for row in &rows {
        assert!(row.iter().all(|field| !field.is_empty()));
        for field in row.iter().skip(1) {
            assert!(field.parse::<f64>().unwrap().is_finite());
        }
    }
    assert_eq!(output.analysis.len(), QUARTERS - 4);

    // Regression summary in both formats.
    let json: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(config.results_dir.join("regression_summary.json")).unwrap(),
    )
    .unwrap();
    for key in ["profit", "wage"] {
        let record = &json[key];
        assert!(record["slope"].is_number(), "{key}: {record}");
        assert!(record["t_hac"].is_number());
        assert_eq!(record["maxlags"], 4);
        assert_eq!(record["n_obs"], QUARTERS - 4);
    }
    let reg_csv =
        fs::read_to_string(config.results_dir.join("regression_summary.csv")).unwrap();
    assert!(reg_csv.starts_with(
        "regression,dependent_var,intercept,slope,t_hac,r2,correlation,n_obs,maxlags"
    ));
    assert_eq!(reg_csv.trim_end().lines().count(), 3);

    // Stationarity results keyed by variable.
    let json: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(config.results_dir.join("stationarity_tests.json")).unwrap(),
    )
    .unwrap();
    for variable in ["prod_yoy_pct", "d_profit_share_yoy_pp", "d_wage_share_yoy_pp"] {
        let record = &json[variable];
        assert!(record["adf_pvalue"].is_number(), "{variable}: {record}");
        assert!(record["kpss_pvalue"].is_number());
        assert!(record["is_stationary"].is_boolean());
    }
    assert!(config.results_dir.join("stationarity_tests.csv").exists());
    assert_eq!(output.stationarity.len(), 3);

    // All six figures plus the two binscatter bin tables.
    for figure in [
        "scatter_profit_share.png",
        "scatter_wage_share.png",
        "scatter_combined.png",
        "binscatter_profit_share.png",
        "binscatter_wage_share.png",
        "binscatter_combined.png",
    ] {
        let path = config.figures_dir.join(figure);
        assert!(path.exists(), "missing {figure}");
        assert!(fs::metadata(&path).unwrap().len() > 0, "empty {figure}");
    }
    assert_eq!(output.figures.len(), 6);

    for name in ["binscatter_profit.csv", "binscatter_wage.csv"] {
        let text = fs::read_to_string(config.output_dir.join(name)).unwrap();
        assert!(text.starts_with("bin_mean_x,bin_mean_y,bin_se_y"), "{name}");
        assert_eq!(text.trim_end().lines().count(), 21, "{name}");
    }
}

#[test]
fn rerun_on_cached_data_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        no_network: true,
        force_refresh: false,
        cache_dir: dir.path().join("data/raw"),
        output_dir: dir.path().join("data/processed"),
        figures_dir: dir.path().join("figures"),
        results_dir: dir.path().join("results"),
        maxlags: 4,
    };
    seed_cache(&config.cache_dir);

    pipeline::run_all(&config).unwrap();
    let first = fs::read_to_string(config.output_dir.join("dshares_vs_prod.csv")).unwrap();
    let first_reg =
        fs::read_to_string(config.results_dir.join("regression_summary.csv")).unwrap();

    pipeline::run_all(&config).unwrap();
    let second = fs::read_to_string(config.output_dir.join("dshares_vs_prod.csv")).unwrap();
    let second_reg =
        fs::read_to_string(config.results_dir.join("regression_summary.csv")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_reg, second_reg);
}
