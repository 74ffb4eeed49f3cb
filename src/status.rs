//! Station liveness derived from the time of the last received reading.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// A station is offline once its newest reading is older than this.
pub const ONLINE_THRESHOLD_MINUTES: i64 = 10;
/// How far back to look for the newest reading.
pub const STATUS_LOOKBACK_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Online,
    Offline,
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationStatus::Online => f.write_str("online"),
            StationStatus::Offline => f.write_str("offline"),
        }
    }
}

/// Classifies a station from its last reading time (`None` when nothing was
/// received inside the look-back window).
pub fn station_status(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> StationStatus {
    match last_seen {
        Some(t) if now - t <= Duration::minutes(ONLINE_THRESHOLD_MINUTES) => StationStatus::Online,
        _ => StationStatus::Offline,
    }
}
