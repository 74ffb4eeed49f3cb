//! CLI entry point for the station time-series resampler.
//!
//! Provides subcommands for resampling a local or remote CSV, exporting
//! stations straight from InfluxDB, checking station liveness and listing
//! the instrument catalog.

mod infra;
mod services;

use crate::infra::influx::{InfluxClient, InfluxSettings};
use crate::services::reading_source::{ReadingSource, SeriesQuery};
use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use meteo_resampler::config::{AggregationConfig, parse_variable_list};
use meteo_resampler::diagnostics::Diagnostics;
use meteo_resampler::fetch::{BasicClient, fetch_bytes};
use meteo_resampler::output::{ExportFormat, ExportTable, export_file_name, write_export};
use meteo_resampler::params::{TimeRange, WindowSize};
use meteo_resampler::parser::{ParsedSeries, parse_readings_csv};
use meteo_resampler::readings::RawSeries;
use meteo_resampler::resample::aggregate::aggregate;
use meteo_resampler::status::{STATUS_LOOKBACK_MINUTES, station_status};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_CONFIG_PATH: &str = "config/aggregation.yaml";

#[derive(Parser)]
#[command(name = "meteo_resampler")]
#[command(about = "Resample and export weather-station time series", long_about = None)]
struct Cli {
    /// Aggregation config (YAML). Falls back to $AGGREGATION_CONFIG, then
    /// config/aggregation.yaml
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resample a CSV of raw readings from a file or URL
    Resample {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Station id used in the output file name (default: file stem)
        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// Export one or more stations from InfluxDB
    Export {
        /// Station ids (InfluxDB tag values)
        #[arg(value_name = "ID", required = true)]
        ids: Vec<String>,

        /// Export raw readings instead of aggregated windows
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Maximum number of concurrent station exports
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// Report whether stations are online (reading in the last 10 minutes)
    Status {
        #[arg(value_name = "ID", required = true)]
        ids: Vec<String>,

        /// Field whose last reading marks the station alive
        #[arg(long, default_value = "TempOut")]
        field: String,
    },
    /// List the instrument types and their declared variables
    ListTypes,
}

#[derive(Args, Clone)]
struct ExportArgs {
    /// Window size in minutes (10, 20 or 30; anything else means 10)
    #[arg(short, long)]
    window: Option<String>,

    /// Range start: epoch seconds or ISO-8601
    #[arg(long)]
    start: Option<String>,

    /// Range end: epoch seconds or ISO-8601
    #[arg(long)]
    end: Option<String>,

    /// Expected columns, comma separated (overrides --instrument-type)
    #[arg(long)]
    expected: Option<String>,

    /// Instrument type whose declared variables lead the column order
    #[arg(long)]
    instrument_type: Option<String>,

    /// Append the AirLink variables to the expected columns
    #[arg(long, default_value_t = false)]
    airlink: bool,

    /// Directory to write export files into
    #[arg(short, long, default_value = "exports")]
    output_dir: String,

    #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
    format: ExportFormat,

    /// Gzip compress the export file
    #[arg(long, default_value_t = false)]
    gzip: bool,
}

impl ExportArgs {
    fn expected_columns(&self, config: &AggregationConfig) -> Option<Vec<String>> {
        if let Some(list) = &self.expected {
            return Some(parse_variable_list(list));
        }
        self.instrument_type
            .as_deref()
            .map(|t| config.catalog.expected_variables(t, self.airlink))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/meteo_resampler.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("meteo_resampler.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Commands::Resample { source, id, export } => {
            let bytes = fetcher(&source).await?;
            let parsed = parse_readings_csv(&bytes)?;
            let id = id.unwrap_or_else(|| entity_id_from_source(&source));
            export_series(&id, parsed, &config, &export)?;
        }
        Commands::Export {
            ids,
            raw,
            concurrency,
            export,
        } => {
            let source = Arc::new(InfluxClient::new(InfluxSettings::from_env()?)?);
            export_all(source, config, ids, raw, concurrency, export).await?;
        }
        Commands::Status { ids, field } => {
            let source = InfluxClient::new(InfluxSettings::from_env()?)?;
            let now = Utc::now();
            let since = now - Duration::minutes(STATUS_LOOKBACK_MINUTES);

            for id in &ids {
                let last_seen = source.last_seen(id, &field, since).await?;
                let status = station_status(last_seen, now);
                info!(
                    station = %id,
                    status = %status,
                    last_seen = ?last_seen,
                    "Station status"
                );
            }
        }
        Commands::ListTypes => {
            for (key, instrument) in config.catalog.iter() {
                info!(
                    instrument_type = key,
                    name = %instrument.name,
                    variables = %instrument.variables.join(", "),
                    "Instrument type"
                );
            }
            info!(
                variables = %config.catalog.airlink_variables().join(", "),
                "AirLink variables"
            );
        }
    }

    Ok(())
}

/// Loads the aggregation config. An explicitly named file must exist; the
/// default location may be absent, in which case built-in defaults apply.
fn load_config(cli_path: Option<&str>) -> Result<AggregationConfig> {
    if let Some(path) = cli_path {
        return AggregationConfig::load(path);
    }
    if let Ok(path) = std::env::var("AGGREGATION_CONFIG") {
        return AggregationConfig::load(path);
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        return AggregationConfig::load(DEFAULT_CONFIG_PATH);
    }
    warn!(
        path = DEFAULT_CONFIG_PATH,
        "No aggregation config found, using defaults"
    );
    Ok(AggregationConfig::default())
}

/// Loads CSV data from a local file path or fetches it over HTTP.
#[tracing::instrument(fields(source = %url))]
async fn fetcher(url: &str) -> Result<Vec<u8>> {
    let bytes = if url.starts_with("http") {
        let client = BasicClient::new();
        fetch_bytes(&client, url).await?
    } else {
        std::fs::read(url)?
    };
    Ok(bytes)
}

fn entity_id_from_source(source: &str) -> String {
    let trimmed = source.split(['?', '#']).next().unwrap_or(source);
    Path::new(trimmed)
        .file_stem()
        .and_then(OsStr::to_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("station")
        .to_string()
}

/// Aggregates a locally parsed series and writes the export file. The range
/// is only applied when the caller gave a start or an end.
fn export_series(
    entity_id: &str,
    parsed: ParsedSeries,
    config: &AggregationConfig,
    args: &ExportArgs,
) -> Result<PathBuf> {
    let ParsedSeries {
        series,
        mut diagnostics,
    } = parsed;
    let expected = args.expected_columns(config);
    let range = if args.start.is_some() || args.end.is_some() {
        Some(TimeRange::from_request(
            args.start.as_deref(),
            args.end.as_deref(),
            Utc::now(),
        )?)
    } else {
        None
    };
    export_with_range(
        entity_id,
        &series,
        config,
        args,
        false,
        range,
        expected,
        &mut diagnostics,
    )
}

/// Builds the export table (aggregated, or raw readings when `raw`) and writes
/// it, logging every fallback counted along the way.
#[allow(clippy::too_many_arguments)]
fn export_with_range(
    entity_id: &str,
    series: &RawSeries,
    config: &AggregationConfig,
    args: &ExportArgs,
    raw: bool,
    range: Option<TimeRange>,
    expected: Option<Vec<String>>,
    diagnostics: &mut Diagnostics,
) -> Result<PathBuf> {
    let (table, window) = if raw {
        (ExportTable::from_raw(series, expected.as_deref()), None)
    } else {
        let window = WindowSize::resolve(args.window.as_deref(), diagnostics);
        let aggregation = aggregate(series, config, window, range);
        diagnostics.merge(&aggregation.diagnostics);
        (
            ExportTable::from_aggregation(&aggregation, expected.as_deref()),
            Some(window),
        )
    };

    let file_name = export_file_name(entity_id, window, args.format, args.gzip);
    let path = write_export(
        Path::new(&args.output_dir),
        &file_name,
        &table,
        args.format,
        args.gzip,
    )?;

    if diagnostics.total() > 0 {
        warn!(
            station = entity_id,
            non_numeric_cells = diagnostics.non_numeric_cells,
            window_fallbacks = diagnostics.window_fallbacks,
            unknown_conversions = diagnostics.unknown_conversions,
            invalid_factors = diagnostics.invalid_factors,
            out_of_range_samples = diagnostics.out_of_range_samples,
            incomplete_wind_samples = diagnostics.incomplete_wind_samples,
            unparsable_timestamps = diagnostics.unparsable_timestamps,
            range_clamps = diagnostics.range_clamps,
            "Export degraded some input"
        );
    }
    info!(
        station = entity_id,
        counter_resets = diagnostics.counter_resets,
        "Station exported"
    );
    Ok(path)
}

/// Exports every station concurrently, sharing one read-only config.
#[tracing::instrument(skip(source, config, ids, args), fields(stations = ids.len()))]
async fn export_all<S: ReadingSource + 'static>(
    source: Arc<S>,
    config: Arc<AggregationConfig>,
    ids: Vec<String>,
    raw: bool,
    concurrency: usize,
    args: ExportArgs,
) -> Result<()> {
    let range = TimeRange::from_request(args.start.as_deref(), args.end.as_deref(), Utc::now())?;
    info!(start = %range.start, end = %range.end, "Export range");

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = vec![];

    for id in ids {
        let sem = semaphore.clone();
        let source = source.clone();
        let config = config.clone();
        let args = args.clone();
        let span = tracing::info_span!("export_station", station = %id);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire().await?;
                let query = SeriesQuery {
                    entity_id: id.clone(),
                    range,
                };
                let ParsedSeries {
                    series,
                    mut diagnostics,
                } = source.fetch_series(&query).await?;
                let expected = args.expected_columns(&config);
                export_with_range(
                    &id,
                    &series,
                    &config,
                    &args,
                    raw,
                    Some(range),
                    expected,
                    &mut diagnostics,
                )
            }
            .instrument(span),
        );
        tasks.push(task);
    }

    let mut failures = 0;
    for task in tasks {
        match task.await {
            Ok(Ok(path)) => info!(path = %path.display(), "Export finished"),
            Ok(Err(e)) => {
                failures += 1;
                error!(error = %e, "Station export failed");
            }
            Err(e) => {
                failures += 1;
                error!(error = %e, "Station export task panicked");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} station export(s) failed");
    }
    Ok(())
}
