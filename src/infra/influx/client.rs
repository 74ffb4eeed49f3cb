use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Url};
use std::time::Duration;
use tracing::{debug, info};

use meteo_resampler::fetch::auth::ApiKey;
use meteo_resampler::fetch::{BasicClient, HttpClient, send};
use meteo_resampler::parser::{ParsedSeries, parse_flux_csv};

use super::query::{last_seen_query, range_query};
use crate::services::reading_source::{ReadingSource, SeriesQuery};

/// Connection settings, read from `INFLUXDB_*` environment variables.
#[derive(Debug, Clone)]
pub struct InfluxSettings {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Restricts queries to one measurement when set.
    pub measurement: Option<String>,
    /// Tag holding the station id.
    pub tag: String,
}

impl InfluxSettings {
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).with_context(|| format!("{name} must be set"));
        Ok(Self {
            url: var("INFLUXDB_URL")?,
            token: var("INFLUXDB_TOKEN")?,
            org: var("INFLUXDB_ORG")?,
            bucket: var("INFLUXDB_BUCKET")?,
            measurement: std::env::var("INFLUXDB_MEASUREMENT")
                .ok()
                .filter(|m| !m.is_empty()),
            tag: std::env::var("INFLUXDB_TAG").unwrap_or_else(|_| "topic".to_string()),
        })
    }
}

/// Runs Flux queries against the InfluxDB v2 HTTP API.
pub struct InfluxClient<C = ApiKey<BasicClient>> {
    http: C,
    settings: InfluxSettings,
}

impl InfluxClient {
    pub fn new(settings: InfluxSettings) -> Result<Self> {
        let basic = BasicClient::with_timeout(Duration::from_secs(60))?;
        let http = ApiKey::influx_token(basic, &settings.token)?;
        Ok(Self { http, settings })
    }
}

impl<C: HttpClient> InfluxClient<C> {
    fn query_request(&self, flux: &str) -> Result<Request> {
        let mut url = Url::parse(&format!(
            "{}/api/v2/query",
            self.settings.url.trim_end_matches('/')
        ))?;
        url.query_pairs_mut().append_pair("org", &self.settings.org);

        let mut req = Request::new(Method::POST, url);
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.flux"));
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/csv"));
        *req.body_mut() = Some(flux.to_string().into());
        Ok(req)
    }

    async fn run(&self, flux: &str) -> Result<ParsedSeries> {
        debug!(query = flux, "Running Flux query");
        let req = self.query_request(flux)?;
        let body = send(&self.http, req).await?;
        parse_flux_csv(&body)
    }
}

#[async_trait]
impl<C: HttpClient> ReadingSource for InfluxClient<C> {
    #[tracing::instrument(skip(self), fields(entity_id = %query.entity_id))]
    async fn fetch_series(&self, query: &SeriesQuery) -> Result<ParsedSeries> {
        let flux = range_query(
            &self.settings.bucket,
            &query.range,
            self.settings.measurement.as_deref(),
            &self.settings.tag,
            &query.entity_id,
        );
        let parsed = self.run(&flux).await?;
        info!(
            readings = parsed.series.len(),
            skipped = parsed.diagnostics.unparsable_timestamps,
            "Readings fetched"
        );
        Ok(parsed)
    }

    #[tracing::instrument(skip(self))]
    async fn last_seen(
        &self,
        entity_id: &str,
        field: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let flux = last_seen_query(&self.settings.bucket, since, &self.settings.tag, entity_id, field);
        let parsed = self.run(&flux).await?;
        Ok(parsed.series.last_time())
    }
}
