//! Parsers turning delimited text into [`RawSeries`].
//!
//! Two shapes are supported: a wide CSV upload (one time column, one column
//! per field) and the long, annotated CSV returned by the InfluxDB v2 query
//! API (one `_time`/`_field`/`_value` triple per line).

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::diagnostics::Diagnostics;
use crate::output::TIME_COLUMN;
use crate::params::parse_instant;
use crate::readings::{RawReading, RawSeries, RawValue};

/// Header names accepted for the timestamp column of a wide CSV, in order of
/// preference (matched case-insensitively).
const TIME_HEADERS: &[&str] = &["datetime", "time", "timestamp"];

/// A parsed series together with the rows that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSeries {
    pub series: RawSeries,
    pub diagnostics: Diagnostics,
}

/// Decodes a wide CSV with a header row.
///
/// The first header matching [`TIME_HEADERS`] is the timestamp. Any other
/// column named `time` would collide with the export's time column and is
/// ignored.
///
/// # Errors
///
/// Returns an error if the CSV is malformed or has no recognised time column.
pub fn parse_readings_csv(bytes: &[u8]) -> Result<ParsedSeries> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();

    let Some(time_idx) = TIME_HEADERS.iter().find_map(|wanted| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    }) else {
        bail!("missing time column (expected one of {:?})", TIME_HEADERS);
    };

    let fields: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, name)| *idx != time_idx && !name.trim().is_empty())
        .filter_map(|(idx, name)| {
            let name = name.trim();
            if name == TIME_COLUMN {
                debug!(column = idx, "Ignoring extra time column");
                return None;
            }
            Some((idx, name.to_string()))
        })
        .collect();

    let mut diagnostics = Diagnostics::default();
    let mut readings = Vec::new();

    for record in reader.records() {
        let record = record?;
        let raw_time = record.get(time_idx).unwrap_or_default();
        let Ok(time) = parse_instant(raw_time) else {
            debug!(time = raw_time, "Skipping row with unparsable timestamp");
            diagnostics.unparsable_timestamps += 1;
            continue;
        };

        let mut reading = RawReading::new(time);
        for (idx, name) in &fields {
            let cell = record.get(*idx).unwrap_or_default();
            reading.values.insert(name.clone(), RawValue::parse(cell));
        }
        readings.push(reading);
    }

    debug!(
        readings = readings.len(),
        skipped = diagnostics.unparsable_timestamps,
        "CSV readings parsed"
    );

    Ok(ParsedSeries {
        series: RawSeries::new(readings),
        diagnostics,
    })
}

/// Decodes an InfluxDB annotated-CSV query response, pivoting every
/// `_field`/`_value` pair onto its `_time`.
///
/// Annotation rows (`#datatype`, `#group`, `#default`) are ignored, and each
/// table's header row re-establishes the column positions, so multi-table
/// responses with differing layouts are handled.
pub fn parse_flux_csv(bytes: &[u8]) -> Result<ParsedSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(bytes);

    let mut diagnostics = Diagnostics::default();
    let mut columns: Option<(usize, usize, usize)> = None;
    let mut by_time: BTreeMap<DateTime<Utc>, RawReading> = BTreeMap::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let position = |name: &str| record.iter().position(|c| c == name);
        if let (Some(t), Some(f), Some(v)) = (position("_time"), position("_field"), position("_value")) {
            columns = Some((t, f, v));
            continue;
        }

        let Some((t_idx, f_idx, v_idx)) = columns else {
            warn!("Flux CSV data row before any header row, skipping");
            continue;
        };

        let raw_time = record.get(t_idx).unwrap_or_default();
        let Ok(time) = parse_instant(raw_time) else {
            diagnostics.unparsable_timestamps += 1;
            continue;
        };
        let Some(field) = record.get(f_idx).filter(|f| !f.is_empty()) else {
            continue;
        };
        let value = RawValue::parse(record.get(v_idx).unwrap_or_default());

        by_time
            .entry(time)
            .or_insert_with(|| RawReading::new(time))
            .values
            .insert(field.to_string(), value);
    }

    Ok(ParsedSeries {
        series: RawSeries::new(by_time.into_values().collect()),
        diagnostics,
    })
}
