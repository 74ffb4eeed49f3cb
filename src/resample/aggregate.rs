use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::AggregationConfig;
use crate::diagnostics::Diagnostics;
use crate::params::{TimeRange, WindowSize};
use crate::readings::{RawSeries, RawValue};
use crate::resample::classify::{FieldPolicy, classify};
use crate::resample::repair::repair_progressive;
use crate::resample::units::{Column, apply_unit_conversions};
use crate::resample::utility::{mean, round2};
use crate::resample::vector::vector_mean;
use crate::resample::window::{MAX_WINDOWS, WindowGrid};

/// One window of aggregated values. Every aggregated field has an entry;
/// `None` means nothing usable fell in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub start: DateTime<Utc>,
    pub values: BTreeMap<String, Option<f64>>,
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub window: WindowSize,
    /// Aggregated field names, sorted.
    pub fields: Vec<String>,
    /// One row per window, ascending by start.
    pub rows: Vec<AggregatedRow>,
    pub diagnostics: Diagnostics,
}

/// Resamples `series` onto fixed windows.
///
/// With a `range`, the grid runs from the aligned floor of `range.start` to
/// `range.end` and includes empty windows; without one it spans the first to
/// the last reading. Plain and rate fields are averaged, progressive counters
/// take the last value per window and are repaired across resets, and the
/// wind pair (when both fields are present in the data) is vector-averaged.
/// Unit rules are applied afterwards, then every value except the wind pair
/// is rounded to 2 decimals.
///
/// A grid longer than [`MAX_WINDOWS`] is first narrowed to the windows holding
/// readings, then cut to the limit; the fallback is counted in `range_clamps`.
#[tracing::instrument(skip(series, config), fields(readings = series.len(), window = %window))]
pub fn aggregate(
    series: &RawSeries,
    config: &AggregationConfig,
    window: WindowSize,
    range: Option<TimeRange>,
) -> Aggregation {
    let mut diagnostics = Diagnostics::default();

    let mut grid = match (range, series.first_time(), series.last_time()) {
        (Some(range), _, _) => WindowGrid::for_range(range, window),
        (None, Some(first), Some(last)) => WindowGrid::spanning(first, last, window),
        _ => {
            return Aggregation {
                window,
                fields: Vec::new(),
                rows: Vec::new(),
                diagnostics,
            };
        }
    };

    if grid.len() > MAX_WINDOWS {
        let requested = grid.len();
        if let (Some(first), Some(last)) = (series.first_time(), series.last_time()) {
            grid = grid.restricted_to(first, last);
        }
        grid = grid.truncated(MAX_WINDOWS);
        diagnostics.range_clamps += 1;
        warn!(
            requested,
            limit = MAX_WINDOWS,
            windows = grid.len(),
            "Window grid too long, range clamped"
        );
    }

    let policies: BTreeMap<String, FieldPolicy> = series
        .field_names()
        .into_iter()
        .map(|f| {
            let policy = classify(&f, config);
            (f, policy)
        })
        .filter(|(_, policy)| *policy != FieldPolicy::Excluded)
        .collect();

    // The pair is only vector-averaged when both fields are present at all.
    let wind = config
        .wind
        .as_ref()
        .filter(|w| policies.contains_key(&w.speed) && policies.contains_key(&w.direction));

    let mut buckets: BTreeMap<&str, Vec<Vec<f64>>> = policies
        .keys()
        .map(|f| (f.as_str(), vec![Vec::new(); grid.len()]))
        .collect();
    let mut wind_buckets: Vec<Vec<(f64, f64)>> = vec![Vec::new(); grid.len()];

    for reading in &series.readings {
        let Some(idx) = grid.index_of(reading.time) else {
            diagnostics.out_of_range_samples += 1;
            continue;
        };

        for (field, raw) in &reading.values {
            let Some(bucket) = buckets.get_mut(field.as_str()) else {
                continue;
            };
            if let Some(v) = coerce(raw, &mut diagnostics) {
                bucket[idx].push(v);
            }
        }

        if let Some(w) = wind {
            let speed = reading.get(&w.speed).and_then(RawValue::as_f64);
            let direction = reading.get(&w.direction).and_then(RawValue::as_f64);
            match (speed, direction) {
                (Some(s), Some(d)) => wind_buckets[idx].push((s, d)),
                (None, None) => {}
                _ => diagnostics.incomplete_wind_samples += 1,
            }
        }
    }

    let mut columns: BTreeMap<String, Column> = BTreeMap::new();
    for (field, policy) in &policies {
        let windows = &buckets[field.as_str()];
        let column: Column = match policy {
            FieldPolicy::Progressive => {
                let last: Column = windows.iter().map(|w| w.last().copied()).collect();
                let repaired = repair_progressive(&last, config.counter_gaps);
                if repaired.resets > 0 {
                    debug!(field = %field, resets = repaired.resets, "Counter resets repaired");
                }
                diagnostics.counter_resets += repaired.resets;
                repaired.values
            }
            _ => windows.iter().map(|w| mean(w)).collect(),
        };
        columns.insert(field.clone(), column);
    }

    if let Some(w) = wind {
        let means: Vec<_> = wind_buckets.iter().map(|s| vector_mean(s)).collect();
        columns.insert(w.speed.clone(), means.iter().map(|m| m.map(|m| m.speed)).collect());
        columns.insert(
            w.direction.clone(),
            means.iter().map(|m| m.map(|m| m.direction)).collect(),
        );
    }

    apply_unit_conversions(&mut columns, &config.unit_rules, &mut diagnostics);

    for (field, column) in columns.iter_mut() {
        if config.is_wind_field(field) {
            continue;
        }
        for cell in column.iter_mut().flatten() {
            *cell = round2(*cell);
        }
    }

    let rows = grid
        .starts()
        .enumerate()
        .map(|(idx, start)| AggregatedRow {
            start,
            values: columns
                .iter()
                .map(|(field, column)| (field.clone(), column[idx]))
                .collect(),
        })
        .collect::<Vec<_>>();

    debug!(
        windows = rows.len(),
        fields = columns.len(),
        fallbacks = diagnostics.total(),
        "Aggregation complete"
    );

    Aggregation {
        window,
        fields: columns.into_keys().collect(),
        rows,
        diagnostics,
    }
}

/// Numeric coercion; counts present-but-unusable cells.
fn coerce(raw: &RawValue, diagnostics: &mut Diagnostics) -> Option<f64> {
    let value = raw.as_f64();
    if value.is_none() && *raw != RawValue::Null {
        diagnostics.non_numeric_cells += 1;
    }
    value
}
