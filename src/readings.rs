//! Raw sensor readings as delivered by a data source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single raw cell value. Sources hand over whatever they stored; numeric
/// coercion happens later, inside the aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl RawValue {
    /// Parses a textual cell: empty → `Null`, numeric text → `Number`,
    /// `true`/`false` → `Bool`, anything else is kept as `Text`.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return RawValue::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return RawValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return RawValue::Bool(false);
        }
        match trimmed.parse::<f64>() {
            Ok(n) => RawValue::Number(n),
            Err(_) => RawValue::Text(trimmed.to_string()),
        }
    }

    /// Coerces the cell to a finite number. Non-numeric text, nulls, NaN and
    /// infinities all become `None`.
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            RawValue::Number(n) => *n,
            RawValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
            RawValue::Null => return None,
        };
        n.is_finite().then_some(n)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Null => Ok(()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

/// One timestamped sample: field name → raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub time: DateTime<Utc>,
    pub values: BTreeMap<String, RawValue>,
}

impl RawReading {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert, handy when assembling readings by hand.
    pub fn with(mut self, field: &str, value: impl Into<RawValue>) -> Self {
        self.values.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.values.get(field)
    }
}

/// Time-ordered readings for one station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub readings: Vec<RawReading>,
}

impl RawSeries {
    /// Builds a series, stable-sorting the readings by timestamp.
    pub fn new(mut readings: Vec<RawReading>) -> Self {
        readings.sort_by_key(|r| r.time);
        Self { readings }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Every field name seen in any reading, sorted.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .readings
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.readings.first().map(|r| r.time)
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.readings.last().map(|r| r.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_cells() {
        assert_eq!(RawValue::parse(""), RawValue::Null);
        assert_eq!(RawValue::parse("  "), RawValue::Null);
        assert_eq!(RawValue::parse("12.5"), RawValue::Number(12.5));
        assert_eq!(RawValue::parse("N/A"), RawValue::Text("N/A".to_string()));
        assert_eq!(RawValue::parse("False"), RawValue::Bool(false));
    }

    #[test]
    fn test_coercion_to_number() {
        assert_eq!(RawValue::Number(3.0).as_f64(), Some(3.0));
        assert_eq!(RawValue::Text(" 4.25 ".to_string()).as_f64(), Some(4.25));
        assert_eq!(RawValue::Text("---".to_string()).as_f64(), None);
        assert_eq!(RawValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(RawValue::Null.as_f64(), None);
        assert_eq!(RawValue::Number(f64::NAN).as_f64(), None);
        assert_eq!(RawValue::Number(f64::INFINITY).as_f64(), None);
    }

    #[test]
    fn test_series_sorts_and_lists_fields() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let series = RawSeries::new(vec![
            RawReading::new(t1).with("TempOut", 70.0),
            RawReading::new(t0).with("HumOut", 40.0).with("TempOut", 68.0),
        ]);

        assert_eq!(series.first_time(), Some(t0));
        assert_eq!(series.last_time(), Some(t1));
        assert_eq!(series.field_names(), vec!["HumOut", "TempOut"]);
    }
}
