//! nflverse release assets: play-by-play parquet, season rosters and the schedule CSV.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

use crate::config::PipelineConfig;
use crate::http_cache::fetch_file_cached;
use crate::http_client::{bulk_client, with_retries};
use crate::normalize::PBP_COLUMNS;
use crate::raw::{RawRecord, RawValue};
use crate::source::BulkSource;

#[derive(Debug, Clone)]
enum Location {
    Remote {
        base_url: String,
        schedule_url: String,
        timeout: Duration,
        attempts: u32,
    },
    /// Pre-downloaded assets laid out with the release file names.
    Local(PathBuf),
}

#[derive(Debug, Clone)]
pub struct NflverseSource {
    location: Location,
}

impl NflverseSource {
    pub fn remote(config: &PipelineConfig) -> Self {
        Self {
            location: Location::Remote {
                base_url: config.nflverse_base_url.trim_end_matches('/').to_string(),
                schedule_url: config.schedule_url.clone(),
                timeout: config.bulk_timeout,
                attempts: config.fetch_retries,
            },
        }
    }

    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Local(dir.into()),
        }
    }

    fn asset(&self, remote_path: &str, file_name: &str) -> Result<PathBuf> {
        match &self.location {
            Location::Local(dir) => {
                let path = dir.join(file_name);
                if !path.exists() {
                    return Err(anyhow!("missing local asset {}", path.display()));
                }
                Ok(path)
            }
            Location::Remote {
                base_url,
                schedule_url,
                timeout,
                attempts,
            } => {
                let url = if remote_path.is_empty() {
                    schedule_url.clone()
                } else {
                    format!("{base_url}/{remote_path}")
                };
                let client = bulk_client(*timeout)?;
                with_retries(&url, *attempts, |_| fetch_file_cached(client, &url))
            }
        }
    }
}

impl BulkSource for NflverseSource {
    fn fetch_play_by_play(&self, season: u16) -> Result<Vec<RawRecord>> {
        let file = format!("play_by_play_{season}.parquet");
        let path = self
            .asset(&format!("pbp/{file}"), &file)
            .with_context(|| format!("fetch play-by-play for {season}"))?;
        let rows = read_parquet_records(&path, PBP_COLUMNS)?;
        tracing::info!(season, rows = rows.len(), "play-by-play loaded");
        Ok(rows)
    }

    fn fetch_roster(&self, season: u16) -> Result<Vec<RawRecord>> {
        let file = format!("roster_{season}.csv");
        let path = self
            .asset(&format!("rosters/{file}"), &file)
            .with_context(|| format!("fetch roster for {season}"))?;
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        read_csv_records(file)
    }

    fn fetch_schedule(&self, season: u16) -> Result<Vec<RawRecord>> {
        let path = self.asset("", "games.csv").context("fetch schedule")?;
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let rows = read_csv_records(file)?;
        Ok(rows
            .into_iter()
            .filter(|r| r.int("season") == Some(season as i64))
            .collect())
    }
}

/// Reads every row of a parquet file, keeping only the named columns.
pub fn read_parquet_records(path: &Path, columns: &[&str]) -> Result<Vec<RawRecord>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open parquet reader")?;
    let expected = reader.metadata().file_metadata().num_rows().max(0) as usize;
    let iter = reader.get_row_iter(None).context("iterate parquet rows")?;

    let mut out = Vec::with_capacity(expected);
    for row in iter {
        let row = row.context("decode parquet row")?;
        let mut record = RawRecord::new();
        for (name, field) in row.get_column_iter() {
            if columns.contains(&name.as_str()) {
                record.insert(name, raw_from_field(field));
            }
        }
        out.push(record);
    }
    Ok(out)
}

fn raw_from_field(field: &Field) -> RawValue {
    match field {
        Field::Bool(b) => RawValue::Bool(*b),
        Field::Byte(n) => RawValue::Int(*n as i64),
        Field::Short(n) => RawValue::Int(*n as i64),
        Field::Int(n) => RawValue::Int(*n as i64),
        Field::Long(n) => RawValue::Int(*n),
        Field::UByte(n) => RawValue::Int(*n as i64),
        Field::UShort(n) => RawValue::Int(*n as i64),
        Field::UInt(n) => RawValue::Int(*n as i64),
        Field::ULong(n) => i64::try_from(*n).map(RawValue::Int).unwrap_or(RawValue::Null),
        Field::Float(f) => RawValue::Float(*f as f64),
        Field::Double(f) => RawValue::Float(*f),
        Field::Str(s) => RawValue::Text(s.clone()),
        _ => RawValue::Null,
    }
}

/// Header-keyed CSV rows; empty cells are stored as `Null`.
pub fn read_csv_records(input: impl Read) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers().context("read csv header")?.clone();
    let mut out = Vec::new();
    for (idx, line) in reader.records().enumerate() {
        let line = line.with_context(|| format!("read csv line {}", idx + 2))?;
        let mut record = RawRecord::new();
        for (name, value) in headers.iter().zip(line.iter()) {
            let value = if value.trim().is_empty() {
                RawValue::Null
            } else {
                RawValue::Text(value.to_string())
            };
            record.insert(name, value);
        }
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_are_keyed_by_header() {
        let raw = "season,team,position,full_name,gsis_id\n2024,KC,WR,Rashee Rice,00-0039156\n2024,KC,TE,,00-0030506\n";
        let rows = read_csv_records(raw.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("full_name").as_deref(), Some("Rashee Rice"));
        assert_eq!(rows[0].int("season"), Some(2024));
        assert_eq!(rows[1].text("full_name"), None);
    }

    #[test]
    fn local_source_reports_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let source = NflverseSource::local(dir.path());
        let err = source.fetch_roster(2024).unwrap_err();
        assert!(format!("{err:#}").contains("roster_2024.csv"));
    }
}
