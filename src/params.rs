//! Caller-supplied request parameters: instants, ranges and window sizes.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::diagnostics::Diagnostics;

/// Default look-back when the caller gives no start instant.
pub const DEFAULT_LOOKBACK_SECS: i64 = 3 * 60 * 60;

/// Supported aggregation window sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum WindowSize {
    #[default]
    TenMinutes,
    TwentyMinutes,
    ThirtyMinutes,
}

impl WindowSize {
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        match minutes {
            10 => Some(WindowSize::TenMinutes),
            20 => Some(WindowSize::TwentyMinutes),
            30 => Some(WindowSize::ThirtyMinutes),
            _ => None,
        }
    }

    /// Resolves a requested size, falling back to 10 minutes for anything
    /// unsupported (including missing or non-numeric input).
    pub fn resolve(requested: Option<&str>, diagnostics: &mut Diagnostics) -> Self {
        let Some(raw) = requested else {
            return WindowSize::default();
        };
        match raw.trim().parse::<i64>().ok().and_then(Self::from_minutes) {
            Some(size) => size,
            None => {
                debug!(requested = raw, "Unsupported window size, using default");
                diagnostics.window_fallbacks += 1;
                WindowSize::default()
            }
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            WindowSize::TenMinutes => 10,
            WindowSize::TwentyMinutes => 20,
            WindowSize::ThirtyMinutes => 30,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Floors `t` to the window grid (aligned to the Unix epoch, which for
    /// these sizes is the same as aligning to midnight UTC).
    pub fn floor(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.minutes() * 60;
        let secs = t.timestamp().div_euclid(step) * step;
        Utc.timestamp_opt(secs, 0).single().unwrap_or(t)
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}

/// A half-open `[start, end)` request range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Builds the range from optional caller strings. A missing end means
    /// `now`; a missing start means three hours before the end.
    pub fn from_request(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        let end = match end {
            Some(raw) => parse_instant(raw)?,
            None => now,
        };
        let start = match start {
            Some(raw) => parse_instant(raw)?,
            None => end
                .checked_sub_signed(Duration::seconds(DEFAULT_LOOKBACK_SECS))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        };
        Ok(Self { start, end })
    }
}

/// Parses an instant given either as integer epoch seconds or as ISO-8601.
/// ISO values without an offset are taken as UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| anyhow!("epoch seconds out of range: {raw}"));
    }
    parse_iso_instant(raw).ok_or_else(|| anyhow!("not an epoch timestamp or ISO-8601 instant: {raw}"))
}

/// ISO-8601 parsing shared with the CSV readers; `None` when unparsable.
pub fn parse_iso_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
