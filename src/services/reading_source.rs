//! Trait and types for the raw reading data source.

use anyhow::Result;
use chrono::{DateTime, Utc};
use meteo_resampler::params::TimeRange;
use meteo_resampler::parser::ParsedSeries;

/// Which station and time span to fetch.
#[derive(Debug, Clone)]
pub struct SeriesQuery {
    pub entity_id: String,
    pub range: TimeRange,
}

/// Abstraction over a time-series store holding raw station readings.
///
/// Fetch failures are returned unmodified; there is no retry here.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync {
    /// Returns every reading of `query.entity_id` inside `query.range`.
    async fn fetch_series(&self, query: &SeriesQuery) -> Result<ParsedSeries>;

    /// Time of the newest `field` reading not older than `since`.
    async fn last_seen(
        &self,
        entity_id: &str,
        field: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;
}
