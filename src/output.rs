//! Tabular export of aggregated (or raw) series.
//!
//! Produces a column-stable, time-sorted table and writes it as CSV or JSON,
//! optionally gzip-compressed.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::params::{WindowSize, parse_iso_instant};
use crate::readings::{RawReading, RawSeries};
use crate::resample::aggregate::{AggregatedRow, Aggregation};

pub const TIME_COLUMN: &str = "time";

/// Row timestamp. Parsed instants sort chronologically and before any
/// unparsable value; unparsable values sort by their original text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RowTime {
    Parsed(DateTime<Utc>),
    Unparsed(String),
}

impl RowTime {
    pub fn parse(raw: &str) -> Self {
        match parse_iso_instant(raw) {
            Some(t) => RowTime::Parsed(t),
            None => RowTime::Unparsed(raw.to_string()),
        }
    }

    /// ISO-8601 instant, or the original text when it never parsed.
    pub fn render(&self) -> String {
        match self {
            RowTime::Parsed(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            RowTime::Unparsed(raw) => raw.clone(),
        }
    }
}

/// A row before projection: timestamp plus rendered cells. An empty string
/// marks an absent value.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub time: RowTime,
    pub cells: BTreeMap<String, String>,
}

impl From<&AggregatedRow> for TableRow {
    fn from(row: &AggregatedRow) -> Self {
        Self {
            time: RowTime::Parsed(row.start),
            cells: row
                .values
                .iter()
                .map(|(field, value)| (field.clone(), value.map(|v| v.to_string()).unwrap_or_default()))
                .collect(),
        }
    }
}

impl From<&RawReading> for TableRow {
    fn from(reading: &RawReading) -> Self {
        Self {
            time: RowTime::Parsed(reading.time),
            cells: reading
                .values
                .iter()
                .map(|(field, value)| (field.clone(), value.to_string()))
                .collect(),
        }
    }
}

/// Column-stable table ready for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    /// `time`, then the expected columns, then extra observed columns sorted.
    pub columns: Vec<String>,
    /// One entry per column in every row.
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    /// Projects `rows` onto a deterministic column set and stable-sorts them
    /// by timestamp.
    pub fn build(mut rows: Vec<TableRow>, expected: Option<&[String]>) -> Self {
        let mut columns = vec![TIME_COLUMN.to_string()];
        let mut placed: BTreeSet<&str> = BTreeSet::from([TIME_COLUMN]);

        for name in expected.unwrap_or_default() {
            if placed.insert(name.as_str()) {
                columns.push(name.clone());
            }
        }

        let observed: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.cells.keys().map(String::as_str))
            .collect();
        let extras: Vec<String> = observed
            .into_iter()
            .filter(|name| !placed.contains(name))
            .map(str::to_string)
            .collect();
        columns.extend(extras);

        rows.sort_by(|a, b| a.time.cmp(&b.time));

        let rows = rows
            .iter()
            .map(|row| {
                let mut line = Vec::with_capacity(columns.len());
                line.push(row.time.render());
                line.extend(
                    columns[1..]
                        .iter()
                        .map(|c| row.cells.get(c).cloned().unwrap_or_default()),
                );
                line
            })
            .collect();

        Self { columns, rows }
    }

    #[tracing::instrument(skip_all, fields(windows = aggregation.rows.len()))]
    pub fn from_aggregation(aggregation: &Aggregation, expected: Option<&[String]>) -> Self {
        let rows = aggregation.rows.iter().map(TableRow::from).collect();
        Self::build(rows, expected)
    }

    #[tracing::instrument(skip_all, fields(readings = series.len()))]
    pub fn from_raw(series: &RawSeries, expected: Option<&[String]>) -> Self {
        let rows = series.readings.iter().map(TableRow::from).collect();
        Self::build(rows, expected)
    }

    /// Writes header and rows as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Serializes the table as pretty-printed JSON.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Serialization format of an export file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Attachment name encoding the station id and window size, e.g.
/// `ws01_timeseries_10m.csv`. `None` for the window marks a raw export.
/// Characters that are unsafe in file names are replaced with `_`.
pub fn export_file_name(
    entity_id: &str,
    window: Option<WindowSize>,
    format: ExportFormat,
    gzip: bool,
) -> String {
    let safe_id: String = entity_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let suffix = match window {
        Some(w) => w.to_string(),
        None => "raw".to_string(),
    };
    let mut name = format!("{}_timeseries_{}.{}", safe_id, suffix, format.extension());
    if gzip {
        name.push_str(".gz");
    }
    name
}

/// Writes `table` into `dir` under `file_name`, gzip-compressing when asked.
/// Returns the written path.
pub fn write_export(
    dir: &Path,
    file_name: &str,
    table: &ExportTable,
    format: ExportFormat,
    gzip: bool,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(file_name);
    debug!(path = %path.display(), gzip, "Writing export");

    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_table(&mut encoder, table, format)?;
        encoder.finish()?;
    } else {
        write_table(file, table, format)?;
    }

    info!(
        path = %path.display(),
        columns = table.columns.len(),
        rows = table.rows.len(),
        "Export written"
    );
    Ok(path)
}

fn write_table<W: Write>(writer: W, table: &ExportTable, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Csv => table.write_csv(writer),
        ExportFormat::Json => table.write_json(writer),
    }
}
