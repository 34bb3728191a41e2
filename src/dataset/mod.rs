//! Merge raw FRED series and compute the derived analysis columns.
//!
//! Missing values stay explicit `Option<f64>` through the merge and the
//! transformations; only the final drop step produces dense columns. All
//! functions here are pure: re-running on the same input yields bit-identical
//! output.

use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::data::{fred, FredClient};
use crate::domain::{RunConfig, SeriesId, SeriesTable};
use crate::error::AppError;

/// Column order of the processed output file.
pub const ANALYSIS_COLUMNS: [&str; 6] = [
    "date",
    "prod_yoy_pct",
    "d_wage_share_yoy_pp",
    "wage_share_pct",
    "d_profit_share_yoy_pp",
    "profit_share_pct",
];

pub const ANALYSIS_FILE: &str = "dshares_vs_prod.csv";

/// Quarters in one year; all y/y transformations lag by this much.
const YOY_LAG: usize = 4;

/// Outer join of the four raw series, sorted ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    pub dates: Vec<NaiveDate>,
    pub ophnfb: Vec<Option<f64>>,
    pub gdp: Vec<Option<f64>>,
    pub cprofit: Vec<Option<f64>>,
    pub coe: Vec<Option<f64>>,
}

/// The derived columns, aligned with the merged date index.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedDataset {
    pub dates: Vec<NaiveDate>,
    pub prod_yoy_pct: Vec<Option<f64>>,
    pub profit_share_pct: Vec<Option<f64>>,
    pub wage_share_pct: Vec<Option<f64>>,
    pub d_profit_share_yoy_pp: Vec<Option<f64>>,
    pub d_wage_share_yoy_pp: Vec<Option<f64>>,
}

/// Final analysis table: six columns, no missing values, dense 0-based rows
/// sorted ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisDataset {
    pub dates: Vec<NaiveDate>,
    pub prod_yoy_pct: Vec<f64>,
    pub d_wage_share_yoy_pp: Vec<f64>,
    pub wage_share_pct: Vec<f64>,
    pub d_profit_share_yoy_pp: Vec<f64>,
    pub profit_share_pct: Vec<f64>,
}

impl AnalysisDataset {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }
}

/// Everything `build_analysis_dataset` produces for downstream stages.
#[derive(Debug, Clone)]
pub struct DatasetBuild {
    pub analysis: AnalysisDataset,
    /// Pre-drop table; the stationarity tests draw per-variable samples from
    /// this rather than from the jointly-dropped analysis table.
    pub transformed: TransformedDataset,
    pub output_file: PathBuf,
}

/// Outer join on date across all series, keeping every date present in any of
/// them. Rows where a series has no observation carry `None` for that column.
pub fn merge_series(tables: &[SeriesTable]) -> MergedDataset {
    let mut by_date: BTreeMap<NaiveDate, [Option<f64>; 4]> = BTreeMap::new();
    for table in tables {
        let slot = match table.id {
            SeriesId::Ophnfb => 0,
            SeriesId::Gdp => 1,
            SeriesId::Cprofit => 2,
            SeriesId::Coe => 3,
        };
        for &(date, value) in &table.observations {
            by_date.entry(date).or_insert([None; 4])[slot] = value;
        }
    }

    let mut merged = MergedDataset {
        dates: Vec::with_capacity(by_date.len()),
        ophnfb: Vec::with_capacity(by_date.len()),
        gdp: Vec::with_capacity(by_date.len()),
        cprofit: Vec::with_capacity(by_date.len()),
        coe: Vec::with_capacity(by_date.len()),
    };
    for (date, row) in by_date {
        merged.dates.push(date);
        merged.ophnfb.push(row[0]);
        merged.gdp.push(row[1]);
        merged.cprofit.push(row[2]);
        merged.coe.push(row[3]);
    }
    merged
}

/// Compute the productivity-growth and factor-share columns.
///
/// - `prod_yoy_pct[i] = 100 * (ln OPHNFB[i] - ln OPHNFB[i-4])`
/// - `profit_share_pct[i] = 100 * CPROFIT[i] / GDP[i]`
/// - `wage_share_pct[i] = 100 * COE[i] / GDP[i]`
/// - `d_*_share_yoy_pp[i] = share[i] - share[i-4]`
///
/// Rows lacking the required lag history or inputs (including `GDP == 0`)
/// carry `None`, never zero and never a panic.
pub fn compute_transformations(merged: &MergedDataset) -> TransformedDataset {
    let n = merged.dates.len();

    let prod_yoy_pct: Vec<Option<f64>> = (0..n)
        .map(|i| {
            if i < YOY_LAG {
                return None;
            }
            match (merged.ophnfb[i], merged.ophnfb[i - YOY_LAG]) {
                (Some(cur), Some(prev)) if cur > 0.0 && prev > 0.0 => {
                    Some(100.0 * (cur.ln() - prev.ln()))
                }
                _ => None,
            }
        })
        .collect();

    let profit_share_pct = ratio_share(&merged.cprofit, &merged.gdp);
    let wage_share_pct = ratio_share(&merged.coe, &merged.gdp);
    let d_profit_share_yoy_pp = yoy_delta(&profit_share_pct);
    let d_wage_share_yoy_pp = yoy_delta(&wage_share_pct);

    TransformedDataset {
        dates: merged.dates.clone(),
        prod_yoy_pct,
        profit_share_pct,
        wage_share_pct,
        d_profit_share_yoy_pp,
        d_wage_share_yoy_pp,
    }
}

fn ratio_share(numerator: &[Option<f64>], gdp: &[Option<f64>]) -> Vec<Option<f64>> {
    numerator
        .iter()
        .zip(gdp)
        .map(|(num, den)| match (num, den) {
            (Some(n), Some(d)) if *d != 0.0 => Some(100.0 * n / d),
            _ => None,
        })
        .collect()
}

fn yoy_delta(share: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..share.len())
        .map(|i| {
            if i < YOY_LAG {
                return None;
            }
            match (share[i], share[i - YOY_LAG]) {
                (Some(cur), Some(prev)) => Some(cur - prev),
                _ => None,
            }
        })
        .collect()
}

/// Restrict to the analysis columns and drop every row with a missing value.
pub fn drop_missing(transformed: &TransformedDataset) -> AnalysisDataset {
    let mut analysis = AnalysisDataset {
        dates: Vec::new(),
        prod_yoy_pct: Vec::new(),
        d_wage_share_yoy_pp: Vec::new(),
        wage_share_pct: Vec::new(),
        d_profit_share_yoy_pp: Vec::new(),
        profit_share_pct: Vec::new(),
    };
    for i in 0..transformed.dates.len() {
        let row = (
            transformed.prod_yoy_pct[i],
            transformed.d_wage_share_yoy_pp[i],
            transformed.wage_share_pct[i],
            transformed.d_profit_share_yoy_pp[i],
            transformed.profit_share_pct[i],
        );
        if let (Some(prod), Some(d_wage), Some(wage), Some(d_profit), Some(profit)) = row {
            analysis.dates.push(transformed.dates[i]);
            analysis.prod_yoy_pct.push(prod);
            analysis.d_wage_share_yoy_pp.push(d_wage);
            analysis.wage_share_pct.push(wage);
            analysis.d_profit_share_yoy_pp.push(d_profit);
            analysis.profit_share_pct.push(profit);
        }
    }
    analysis
}

/// Write the processed analysis table to `<output_dir>/dshares_vs_prod.csv`.
pub fn write_analysis_csv(
    analysis: &AnalysisDataset,
    config: &RunConfig,
) -> Result<PathBuf, AppError> {
    create_dir_all(&config.output_dir).map_err(|e| {
        AppError::new(
            2,
            format!(
                "Failed to create output dir '{}': {e}",
                config.output_dir.display()
            ),
        )
    })?;
    let path = config.output_dir.join(ANALYSIS_FILE);
    let file = File::create(&path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create '{}': {e}", path.display()),
        )
    })?;

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(ANALYSIS_COLUMNS)
        .map_err(|e| AppError::new(2, format!("Failed to write analysis header: {e}")))?;
    for i in 0..analysis.len() {
        writer
            .write_record([
                analysis.dates[i].to_string(),
                analysis.prod_yoy_pct[i].to_string(),
                analysis.d_wage_share_yoy_pp[i].to_string(),
                analysis.wage_share_pct[i].to_string(),
                analysis.d_profit_share_yoy_pp[i].to_string(),
                analysis.profit_share_pct[i].to_string(),
            ])
            .map_err(|e| AppError::new(2, format!("Failed to write analysis row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))?;

    Ok(path)
}

/// Fetch, validate, merge, transform and persist the analysis dataset.
pub fn build_analysis_dataset(
    client: &FredClient,
    config: &RunConfig,
) -> Result<DatasetBuild, AppError> {
    let tables = client.get_all_series(config.force_refresh)?;
    for table in &tables {
        fred::validate_series(table)?;
    }

    let merged = merge_series(&tables);
    let transformed = compute_transformations(&merged);
    let analysis = drop_missing(&transformed);
    if analysis.is_empty() {
        return Err(AppError::new(
            4,
            "Analysis dataset is empty after dropping missing values.",
        ));
    }

    let output_file = write_analysis_csv(&analysis, config)?;

    Ok(DatasetBuild {
        analysis,
        transformed,
        output_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Months;

    fn quarters(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| start + Months::new(3 * i as u32))
            .collect()
    }

    fn table(id: SeriesId, dates: &[NaiveDate], values: &[f64]) -> SeriesTable {
        SeriesTable {
            id,
            observations: dates
                .iter()
                .zip(values)
                .map(|(&d, &v)| (d, Some(v)))
                .collect(),
        }
    }

    fn merged_fixture(ophnfb: &[f64], gdp: &[f64], cprofit: &[f64], coe: &[f64]) -> MergedDataset {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates = quarters(start, ophnfb.len());
        merge_series(&[
            table(SeriesId::Ophnfb, &dates, ophnfb),
            table(SeriesId::Gdp, &dates, gdp),
            table(SeriesId::Cprofit, &dates, cprofit),
            table(SeriesId::Coe, &dates, coe),
        ])
    }

    #[test]
    fn merge_is_outer_join_sorted_by_date() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates = quarters(start, 4);

        let gdp = table(SeriesId::Gdp, &dates[..3], &[1000.0, 1010.0, 1020.0]);
        let coe = table(SeriesId::Coe, &dates[1..], &[500.0, 505.0, 510.0]);
        let merged = merge_series(&[gdp, coe]);

        assert_eq!(merged.dates, dates);
        assert_eq!(merged.gdp, vec![Some(1000.0), Some(1010.0), Some(1020.0), None]);
        assert_eq!(merged.coe, vec![None, Some(500.0), Some(505.0), Some(510.0)]);
        assert_eq!(merged.ophnfb, vec![None; 4]);
    }

    #[test]
    fn productivity_growth_is_log_difference_times_100() {
        let merged = merged_fixture(
            &[100.0, 101.0, 102.0, 103.0, 105.0, 106.0, 107.0, 108.0],
            &[1000.0; 8],
            &[100.0; 8],
            &[500.0; 8],
        );
        let out = compute_transformations(&merged);

        for i in 0..4 {
            assert_eq!(out.prod_yoy_pct[i], None);
            assert_eq!(out.d_profit_share_yoy_pp[i], None);
            assert_eq!(out.d_wage_share_yoy_pp[i], None);
        }
        let expected = 100.0 * (105.0_f64.ln() - 100.0_f64.ln());
        let actual = out.prod_yoy_pct[4].unwrap();
        assert!((actual - expected).abs() < 1e-3, "got {actual}");
    }

    #[test]
    fn factor_shares_are_percent_of_gdp() {
        let merged = merged_fixture(
            &[100.0, 101.0, 102.0, 103.0, 104.0],
            &[1000.0; 5],
            &[100.0, 110.0, 120.0, 130.0, 140.0],
            &[500.0, 510.0, 520.0, 530.0, 540.0],
        );
        let out = compute_transformations(&merged);

        assert_eq!(out.profit_share_pct[0], Some(10.0));
        assert_eq!(out.wage_share_pct[0], Some(50.0));
        assert_eq!(out.profit_share_pct[4], Some(14.0));
        assert_eq!(out.wage_share_pct[4], Some(54.0));
        assert_eq!(out.d_profit_share_yoy_pp[4], Some(4.0));
        assert_eq!(out.d_wage_share_yoy_pp[4], Some(4.0));
    }

    #[test]
    fn zero_gdp_propagates_as_missing_not_panic() {
        let mut merged = merged_fixture(
            &[100.0; 9],
            &[1000.0; 9],
            &[100.0; 9],
            &[500.0; 9],
        );
        merged.gdp[6] = Some(0.0);
        let out = compute_transformations(&merged);

        assert_eq!(out.profit_share_pct[6], None);
        assert_eq!(out.wage_share_pct[6], None);
        assert_eq!(out.d_profit_share_yoy_pp[6], None);
    }

    #[test]
    fn drop_missing_leaves_no_gaps_and_keeps_order() {
        let merged = merged_fixture(
            &[100.0, 101.0, 102.0, 103.0, 105.0, 106.0, 107.0, 108.0],
            &[1000.0; 8],
            &[100.0; 8],
            &[500.0; 8],
        );
        let out = drop_missing(&compute_transformations(&merged));

        assert_eq!(out.len(), 4);
        assert!(out.dates.windows(2).all(|w| w[0] < w[1]));
        assert!(out.prod_yoy_pct.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn transformations_are_idempotent() {
        let merged = merged_fixture(
            &[100.0, 101.5, 102.25, 103.0, 105.5, 106.0, 107.75, 108.0],
            &[1000.0, 1005.0, 1010.0, 1015.0, 1020.0, 1025.0, 1030.0, 1035.0],
            &[100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 112.0, 114.0],
            &[500.0, 502.0, 504.0, 506.0, 508.0, 510.0, 512.0, 514.0],
        );
        let first = compute_transformations(&merged);
        let second = compute_transformations(&merged);
        assert_eq!(first, second);
        assert_eq!(drop_missing(&first), drop_missing(&second));
    }
}
