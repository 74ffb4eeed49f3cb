//! Aggregation configuration.
//!
//! Loaded once from a YAML document and then shared read-only (typically
//! behind an `Arc`) by every aggregation run:
//!
//! ```yaml
//! excluded_columns: [Datetime, ForecastIcon]
//! rain_columns: [RainDay, RainMonth, RainRate]
//! wind_columns: { speed: WindSpeed, direction: WindDir }
//! units:
//!   TempOut: { convert: FahrenheitToCelsius }
//!   RainDay: { factor: 0.2 }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// Built-in instrument catalog: type key, display name, declared variables.
static DEFAULT_INSTRUMENT_TYPES: &[(&str, &str, &[&str])] = &[
    (
        "ws_on",
        "Stazione Meteorologica",
        &["TempOut", "HumOut", "WindSpeed", "WindDir", "RainRate", "Barometer"],
    ),
    ("ws_off", "Stazione Meteorologica - off", &[]),
    ("radar_off", "Radar Meteorologico", &["Precipitation"]),
    ("tidegauge_off", "Mareografo", &["SeaLevel"]),
    ("wavebuoy_off", "Ondametro", &[]),
    ("mooring_off", "Mooring", &[]),
    ("owbuoy_off", "Boa Meteo-Oceanografica", &[]),
    ("hf_off", "HF Radar", &[]),
    (
        "glider_off",
        "Glider",
        &["Temp", "Salt", "Depth", "Turbidity", "Oxygen", "Nitrates"],
    ),
];

static DEFAULT_AIRLINK_VARIABLES: &[&str] =
    &["pm_2p5_nowcast", "pm_1", "pm_10_nowcast", "aqi_nowcast_val"];

const DEFAULT_RATE_SUFFIX: &str = "Rate";

/// The speed/direction pair averaged as a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindFields {
    pub speed: String,
    pub direction: String,
}

impl WindFields {
    pub fn new(speed: &str, direction: &str) -> Self {
        Self {
            speed: speed.to_string(),
            direction: direction.to_string(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.speed == field || self.direction == field
    }
}

impl Default for WindFields {
    fn default() -> Self {
        Self::new("WindSpeed", "WindDir")
    }
}

/// Post-aggregation conversion for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitRule {
    /// Multiply by a constant.
    Factor(f64),
    /// Apply a named function, resolved at conversion time.
    Named(String),
    /// A factor that is not a number; kept so the converter can count it.
    InvalidFactor(String),
}

/// How progressive-counter repair treats windows without a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterGapPolicy {
    /// Empty windows stay absent and do not take part in reset detection.
    #[default]
    Propagate,
    /// Empty windows count as 0, then get the running offset added.
    ZeroFill,
}

/// One entry of the instrument catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstrumentType {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Immutable lookup of instrument type → declared variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentCatalog {
    types: BTreeMap<String, InstrumentType>,
    airlink_variables: Vec<String>,
}

impl InstrumentCatalog {
    pub fn new(types: BTreeMap<String, InstrumentType>, airlink_variables: Vec<String>) -> Self {
        Self {
            types,
            airlink_variables,
        }
    }

    pub fn get(&self, instrument_type: &str) -> Option<&InstrumentType> {
        self.types.get(instrument_type)
    }

    /// Iterates over all `(type_key, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InstrumentType)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn airlink_variables(&self) -> &[String] {
        &self.airlink_variables
    }

    /// Ordered expected variables for an instrument: the type's declared list,
    /// then the AirLink list when the station carries one, de-duplicated
    /// keeping first occurrence. Unknown types contribute nothing.
    pub fn expected_variables(&self, instrument_type: &str, has_airlink: bool) -> Vec<String> {
        let base = self
            .types
            .get(instrument_type)
            .map(|t| t.variables.as_slice())
            .unwrap_or_default();
        let extra: &[String] = if has_airlink {
            &self.airlink_variables
        } else {
            &[]
        };

        let mut seen = BTreeSet::new();
        base.iter()
            .chain(extra)
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        let types = DEFAULT_INSTRUMENT_TYPES
            .iter()
            .map(|(key, name, vars)| {
                (
                    key.to_string(),
                    InstrumentType {
                        name: name.to_string(),
                        variables: vars.iter().map(|v| v.to_string()).collect(),
                    },
                )
            })
            .collect();
        let airlink = DEFAULT_AIRLINK_VARIABLES
            .iter()
            .map(|v| v.to_string())
            .collect();
        Self::new(types, airlink)
    }
}

/// Parses the comma-separated variable list stored on an instrument record
/// (`"TempOut, HumOut, WindSpeed"`). Blank entries are dropped.
pub fn parse_variable_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Everything the aggregator needs to know about fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    /// Never aggregated nor emitted.
    pub excluded: BTreeSet<String>,
    /// Progressive counters (rain totals); rate-like names inside are means.
    pub cumulative: BTreeSet<String>,
    /// Vector-averaged pair; `None` disables vector averaging.
    pub wind: Option<WindFields>,
    pub unit_rules: BTreeMap<String, UnitRule>,
    /// Case-insensitive suffix marking an intensity field in `cumulative`.
    pub rate_suffix: String,
    pub counter_gaps: CounterGapPolicy,
    pub catalog: InstrumentCatalog,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            excluded: BTreeSet::new(),
            cumulative: BTreeSet::new(),
            wind: Some(WindFields::default()),
            unit_rules: BTreeMap::new(),
            rate_suffix: DEFAULT_RATE_SUFFIX.to_string(),
            counter_gaps: CounterGapPolicy::default(),
            catalog: InstrumentCatalog::default(),
        }
    }
}

impl AggregationConfig {
    /// Loads the config from a YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading aggregation config {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("parsing aggregation config {}", path.display()))?;

        info!(
            path = %path.display(),
            excluded = config.excluded.len(),
            cumulative = config.cumulative.len(),
            unit_rules = config.unit_rules.len(),
            "Aggregation config loaded"
        );
        Ok(config)
    }

    /// Parses a YAML document. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: Option<AggregationDoc> = serde_yaml::from_str(yaml)?;
        doc.unwrap_or_default().into_config()
    }

    /// True when `field` is a cumulative column that actually carries an
    /// intensity (e.g. `RainRate`).
    pub fn is_rate_field(&self, field: &str) -> bool {
        let suffix = self.rate_suffix.to_lowercase();
        !suffix.is_empty() && field.to_lowercase().ends_with(&suffix)
    }

    pub fn is_wind_field(&self, field: &str) -> bool {
        self.wind.as_ref().is_some_and(|w| w.contains(field))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AggregationDoc {
    excluded_columns: Vec<String>,
    rain_columns: Vec<String>,
    wind_columns: Option<WindColumnsDoc>,
    units: BTreeMap<String, UnitRuleDoc>,
    rate_suffix: Option<String>,
    counter_gaps: CounterGapPolicy,
    instrument_types: Option<BTreeMap<String, InstrumentType>>,
    airlink_variables: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WindColumnsDoc {
    Pair { speed: String, direction: String },
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct UnitRuleDoc {
    convert: Option<String>,
    factor: Option<serde_yaml::Value>,
}

impl AggregationDoc {
    fn into_config(self) -> Result<AggregationConfig> {
        let wind = match self.wind_columns {
            None => Some(WindFields::default()),
            Some(WindColumnsDoc::Pair { speed, direction }) => Some(WindFields { speed, direction }),
            Some(WindColumnsDoc::List(list)) => match list.as_slice() {
                [] => None,
                [speed, direction] => Some(WindFields::new(speed, direction)),
                other => bail!(
                    "wind_columns must name exactly [speed, direction], got {} entries",
                    other.len()
                ),
            },
        };

        let unit_rules = self
            .units
            .into_iter()
            .filter_map(|(field, doc)| doc.into_rule().map(|rule| (field, rule)))
            .collect();

        let defaults = InstrumentCatalog::default();
        let catalog = InstrumentCatalog::new(
            self.instrument_types.unwrap_or(defaults.types),
            self.airlink_variables.unwrap_or(defaults.airlink_variables),
        );

        Ok(AggregationConfig {
            excluded: self.excluded_columns.into_iter().collect(),
            cumulative: self.rain_columns.into_iter().collect(),
            wind,
            unit_rules,
            rate_suffix: self
                .rate_suffix
                .unwrap_or_else(|| DEFAULT_RATE_SUFFIX.to_string()),
            counter_gaps: self.counter_gaps,
            catalog,
        })
    }
}

impl UnitRuleDoc {
    /// `convert` takes precedence over `factor`; a rule with neither is dropped.
    fn into_rule(self) -> Option<UnitRule> {
        if let Some(name) = self.convert {
            return Some(UnitRule::Named(name));
        }
        let factor = self.factor?;
        let parsed = match &factor {
            serde_yaml::Value::Number(n) => n.as_f64(),
            serde_yaml::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Some(match parsed {
            Some(f) if f.is_finite() => UnitRule::Factor(f),
            _ => UnitRule::InvalidFactor(
                serde_yaml::to_string(&factor)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
excluded_columns: [Datetime, ForecastIcon]
rain_columns: [RainDay, RainMonth, RainRate]
wind_columns: { speed: WindSpeed, direction: WindDir }
units:
  TempOut: { convert: FahrenheitToCelsius }
  RainDay: { factor: 0.2 }
  RainMonth: { factor: "0.2" }
  Barometer: { factor: lots }
"#;

    #[test]
    fn test_parse_full_document() {
        let config = AggregationConfig::from_yaml_str(SAMPLE).unwrap();

        assert!(config.excluded.contains("Datetime"));
        assert!(config.cumulative.contains("RainRate"));
        assert_eq!(config.wind, Some(WindFields::new("WindSpeed", "WindDir")));
        assert_eq!(
            config.unit_rules.get("TempOut"),
            Some(&UnitRule::Named("FahrenheitToCelsius".to_string()))
        );
        assert_eq!(config.unit_rules.get("RainDay"), Some(&UnitRule::Factor(0.2)));
        assert_eq!(config.unit_rules.get("RainMonth"), Some(&UnitRule::Factor(0.2)));
        assert_eq!(
            config.unit_rules.get("Barometer"),
            Some(&UnitRule::InvalidFactor("lots".to_string()))
        );
        assert_eq!(config.counter_gaps, CounterGapPolicy::Propagate);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AggregationConfig::from_yaml_str("").unwrap();
        assert_eq!(config, AggregationConfig::default());
    }

    #[test]
    fn test_wind_columns_as_list() {
        let config = AggregationConfig::from_yaml_str("wind_columns: [Gust, GustDir]").unwrap();
        assert_eq!(config.wind, Some(WindFields::new("Gust", "GustDir")));

        let disabled = AggregationConfig::from_yaml_str("wind_columns: []").unwrap();
        assert_eq!(disabled.wind, None);

        assert!(AggregationConfig::from_yaml_str("wind_columns: [A, B, C]").is_err());
    }

    #[test]
    fn test_convert_wins_over_factor() {
        let config =
            AggregationConfig::from_yaml_str("units: { T: { convert: FtoC, factor: 2 } }").unwrap();
        assert_eq!(
            config.unit_rules.get("T"),
            Some(&UnitRule::Named("FtoC".to_string()))
        );
    }

    #[test]
    fn test_counter_gap_policy() {
        let config = AggregationConfig::from_yaml_str("counter_gaps: zero_fill").unwrap();
        assert_eq!(config.counter_gaps, CounterGapPolicy::ZeroFill);
    }

    #[test]
    fn test_rate_field_detection() {
        let config = AggregationConfig::default();
        assert!(config.is_rate_field("RainRate"));
        assert!(config.is_rate_field("rainrate"));
        assert!(!config.is_rate_field("RainDay"));
    }

    #[test]
    fn test_expected_variables_with_airlink() {
        let catalog = InstrumentCatalog::default();
        let vars = catalog.expected_variables("ws_on", true);
        assert_eq!(vars.first().map(String::as_str), Some("TempOut"));
        assert_eq!(vars.last().map(String::as_str), Some("aqi_nowcast_val"));
        assert_eq!(vars.len(), 10);

        assert!(catalog.expected_variables("unknown", false).is_empty());
        assert_eq!(catalog.expected_variables("unknown", true).len(), 4);
    }

    #[test]
    fn test_expected_variables_dedup() {
        let mut types = BTreeMap::new();
        types.insert(
            "x".to_string(),
            InstrumentType {
                name: "X".to_string(),
                variables: vec!["pm_1".to_string(), "A".to_string()],
            },
        );
        let catalog = InstrumentCatalog::new(types, vec!["pm_1".to_string(), "B".to_string()]);
        assert_eq!(catalog.expected_variables("x", true), vec!["pm_1", "A", "B"]);
    }

    #[test]
    fn test_parse_variable_list() {
        assert_eq!(
            parse_variable_list("TempOut, HumOut,,  WindDir "),
            vec!["TempOut", "HumOut", "WindDir"]
        );
        assert!(parse_variable_list("").is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AggregationConfig::load(file.path()).unwrap();
        assert_eq!(config.cumulative.len(), 3);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AggregationConfig::load("/nonexistent/aggregation.yaml").is_err());
    }
}
