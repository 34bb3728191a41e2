//! FRED API integration for the quarterly macro series.
//!
//! The client is a read-through cache: every successful fetch is written to one
//! CSV per series under the cache directory, plus a shared
//! `series_metadata.json` recording descriptive titles keyed by series id.
//! With `--no-network`, a cache miss is fatal rather than triggering a
//! network fallback.

use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::domain::{SeriesId, SeriesTable};
use crate::error::AppError;

const BASE_URL: &str = "https://api.stlouisfed.org/fred";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Quarterly cadence check: warn when the median spacing between observations
/// strays more than the tolerance from one quarter.
const EXPECTED_SPACING_DAYS: i64 = 91;
const SPACING_TOLERANCE_DAYS: i64 = 10;

/// Cached descriptive metadata for one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub id: String,
    pub title: String,
}

pub struct FredClient {
    client: Client,
    api_key: Option<String>,
    cache_dir: PathBuf,
    no_network: bool,
    metadata_path: PathBuf,
}

impl FredClient {
    /// Build a client rooted at `cache_dir`.
    ///
    /// A missing `FRED_API_KEY` is a configuration error unless the client is
    /// restricted to cached data, in which case no key is ever needed.
    pub fn new(cache_dir: &Path, no_network: bool) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("FRED_API_KEY").ok();
        if api_key.is_none() && !no_network {
            return Err(AppError::new(
                2,
                "Missing FRED_API_KEY in environment (.env); rerun with --no-network to use cached data only.",
            ));
        }
        create_dir_all(cache_dir).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to create cache dir '{}': {e}", cache_dir.display()),
            )
        })?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            cache_dir: cache_dir.to_path_buf(),
            no_network,
            metadata_path: cache_dir.join("series_metadata.json"),
        })
    }

    fn cache_path(&self, id: SeriesId) -> PathBuf {
        self.cache_dir.join(format!("{}.csv", id.code()))
    }

    /// Get one series, using the cache when available.
    pub fn get_series(&self, id: SeriesId, force_refresh: bool) -> Result<SeriesTable, AppError> {
        let cache_path = self.cache_path(id);
        if cache_path.exists() && !force_refresh {
            return load_cache_csv(&cache_path, id);
        }
        if self.no_network {
            if cache_path.exists() {
                return load_cache_csv(&cache_path, id);
            }
            return Err(AppError::new(
                3,
                format!("No cached data for {} and network is disabled.", id.code()),
            ));
        }
        let table = self.fetch_series(id)?;
        write_cache_csv(&cache_path, &table)?;
        Ok(table)
    }

    /// Fetch all four series in their fixed order.
    pub fn get_all_series(&self, force_refresh: bool) -> Result<Vec<SeriesTable>, AppError> {
        SeriesId::ALL
            .iter()
            .map(|&id| self.get_series(id, force_refresh))
            .collect()
    }

    /// Get series metadata, using the shared metadata cache when available.
    pub fn get_metadata(&self, id: SeriesId) -> Result<SeriesMeta, AppError> {
        let mut metadata = self.load_metadata()?;
        if let Some(meta) = metadata.remove(id.code()) {
            return Ok(meta);
        }
        if self.no_network {
            return Ok(SeriesMeta {
                id: id.code().to_string(),
                title: id.title().to_string(),
            });
        }
        let meta = self.fetch_metadata(id)?;
        metadata.insert(id.code().to_string(), meta.clone());
        self.save_metadata(&metadata)?;
        Ok(meta)
    }

    fn fetch_series(&self, id: SeriesId) -> Result<SeriesTable, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::new(2, "FRED_API_KEY required for network access."))?;

        let url = format!("{BASE_URL}/series/observations");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("series_id", id.code()),
                ("api_key", api_key),
                ("file_type", "json"),
            ])
            .send()
            .map_err(|e| AppError::new(4, format!("FRED request for {} failed: {e}", id.code())))?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                4,
                format!(
                    "FRED request for {} failed with status {}.",
                    id.code(),
                    resp.status()
                ),
            ));
        }

        let body: ObservationsResponse = resp.json().map_err(|e| {
            AppError::new(
                4,
                format!("Failed to parse FRED response for {}: {e}", id.code()),
            )
        })?;

        let mut observations = Vec::with_capacity(body.observations.len());
        for obs in body.observations {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
                AppError::new(
                    4,
                    format!("Invalid FRED date '{}' in {}: {e}", obs.date, id.code()),
                )
            })?;
            observations.push((date, parse_value(&obs.value)));
        }
        observations.sort_by_key(|(d, _)| *d);
        observations.dedup_by_key(|(d, _)| *d);

        Ok(SeriesTable { id, observations })
    }

    fn fetch_metadata(&self, id: SeriesId) -> Result<SeriesMeta, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::new(2, "FRED_API_KEY required for network access."))?;

        let url = format!("{BASE_URL}/series");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("series_id", id.code()),
                ("api_key", api_key),
                ("file_type", "json"),
            ])
            .send()
            .map_err(|e| {
                AppError::new(
                    4,
                    format!("FRED metadata request for {} failed: {e}", id.code()),
                )
            })?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                4,
                format!(
                    "FRED metadata request for {} failed with status {}.",
                    id.code(),
                    resp.status()
                ),
            ));
        }

        let body: SeriesResponse = resp.json().map_err(|e| {
            AppError::new(
                4,
                format!("Failed to parse FRED metadata for {}: {e}", id.code()),
            )
        })?;

        body.seriess.into_iter().next().ok_or_else(|| {
            AppError::new(
                4,
                format!("FRED metadata response for {} was empty.", id.code()),
            )
        })
    }

    fn load_metadata(&self) -> Result<BTreeMap<String, SeriesMeta>, AppError> {
        if !self.metadata_path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(&self.metadata_path).map_err(|e| {
            AppError::new(
                2,
                format!(
                    "Failed to open metadata cache '{}': {e}",
                    self.metadata_path.display()
                ),
            )
        })?;
        serde_json::from_reader(file).map_err(|e| {
            AppError::new(
                4,
                format!(
                    "Invalid metadata cache '{}': {e}",
                    self.metadata_path.display()
                ),
            )
        })
    }

    fn save_metadata(&self, metadata: &BTreeMap<String, SeriesMeta>) -> Result<(), AppError> {
        let file = File::create(&self.metadata_path).map_err(|e| {
            AppError::new(
                2,
                format!(
                    "Failed to create metadata cache '{}': {e}",
                    self.metadata_path.display()
                ),
            )
        })?;
        serde_json::to_writer_pretty(file, metadata)
            .map_err(|e| AppError::new(2, format!("Failed to write metadata cache: {e}")))
    }
}

/// Check a fetched series before it enters the merge.
///
/// Empty or all-missing series are fatal; an off-quarterly cadence is only a
/// warning because FRED occasionally shifts observation dates within a quarter.
pub fn validate_series(table: &SeriesTable) -> Result<(), AppError> {
    if table.is_empty() {
        return Err(AppError::new(
            4,
            format!("Series {} is empty.", table.id.code()),
        ));
    }
    if table.all_missing() {
        return Err(AppError::new(
            4,
            format!("Series {} has all missing values.", table.id.code()),
        ));
    }
    if let Some(median) = median_spacing_days(&table.observations) {
        if (median - EXPECTED_SPACING_DAYS).abs() > SPACING_TOLERANCE_DAYS {
            eprintln!(
                "Warning: {} may not be quarterly frequency (median spacing {median} days).",
                table.id.code()
            );
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    seriess: Vec<SeriesMeta>,
}

/// FRED encodes missing observations as `"."`; non-finite parses are also
/// treated as missing.
fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

fn median_spacing_days(observations: &[(NaiveDate, Option<f64>)]) -> Option<i64> {
    if observations.len() < 2 {
        return None;
    }
    let mut diffs: Vec<i64> = observations
        .windows(2)
        .map(|w| w[1].0.signed_duration_since(w[0].0).num_days())
        .collect();
    diffs.sort_unstable();
    Some(diffs[diffs.len() / 2])
}

fn write_cache_csv(path: &Path, table: &SeriesTable) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create cache file '{}': {e}", path.display()),
        )
    })?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["date", table.id.code()])
        .map_err(|e| AppError::new(2, format!("Failed to write cache header: {e}")))?;
    for (date, value) in &table.observations {
        let value = value.map(|v| v.to_string()).unwrap_or_default();
        writer
            .write_record([date.to_string(), value])
            .map_err(|e| AppError::new(2, format!("Failed to write cache row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush cache file: {e}")))
}

fn load_cache_csv(path: &Path, id: SeriesId) -> Result<SeriesTable, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open cache file '{}': {e}", path.display()),
        )
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut observations = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::new(4, format!("Bad cache row in {}: {e}", id.code())))?;
        let date_field = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d").map_err(|e| {
            AppError::new(
                4,
                format!("Invalid cached date '{date_field}' in {}: {e}", id.code()),
            )
        })?;
        let value = record.get(1).and_then(parse_value);
        observations.push((date, value));
    }
    observations.sort_by_key(|(d, _)| *d);

    Ok(SeriesTable { id, observations })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarterly(start: NaiveDate, values: &[Option<f64>]) -> Vec<(NaiveDate, Option<f64>)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start + chrono::Months::new(3 * i as u32), v))
            .collect()
    }

    #[test]
    fn parse_value_handles_fred_missing_marker() {
        assert_eq!(parse_value("1.25"), Some(1.25));
        assert_eq!(parse_value(" 3 "), Some(3.0));
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn median_spacing_detects_quarterly_cadence() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let obs = quarterly(start, &[Some(1.0); 9]);
        let median = median_spacing_days(&obs).unwrap();
        assert!((median - 91).abs() <= 2, "median spacing was {median}");
    }

    #[test]
    fn cache_round_trips_values_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GDP.csv");
        let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let table = SeriesTable {
            id: SeriesId::Gdp,
            observations: quarterly(start, &[Some(100.0), None, Some(102.5)]),
        };

        write_cache_csv(&path, &table).unwrap();
        let loaded = load_cache_csv(&path, SeriesId::Gdp).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn no_network_cache_miss_is_exit_code_3() {
        let dir = tempfile::tempdir().unwrap();
        let client = FredClient::new(dir.path(), true).unwrap();
        let err = client.get_series(SeriesId::Cprofit, false).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("CPROFIT"));
    }

    #[test]
    fn no_network_metadata_falls_back_to_builtin_title() {
        let dir = tempfile::tempdir().unwrap();
        let client = FredClient::new(dir.path(), true).unwrap();
        let meta = client.get_metadata(SeriesId::Ophnfb).unwrap();
        assert_eq!(meta.id, "OPHNFB");
        assert_eq!(meta.title, SeriesId::Ophnfb.title());
    }

    #[test]
    fn validate_rejects_empty_and_all_missing() {
        let empty = SeriesTable {
            id: SeriesId::Gdp,
            observations: vec![],
        };
        assert_eq!(validate_series(&empty).unwrap_err().exit_code(), 4);

        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let blank = SeriesTable {
            id: SeriesId::Coe,
            observations: quarterly(start, &[None, None, None]),
        };
        let err = validate_series(&blank).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("COE"));
    }
}
