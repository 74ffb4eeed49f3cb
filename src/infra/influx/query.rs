use chrono::{DateTime, SecondsFormat, Utc};
use meteo_resampler::params::TimeRange;

/// Quotes `value` as a Flux string literal.
pub fn flux_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn flux_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// All fields of one station over `range`, optionally restricted to a
/// measurement.
pub fn range_query(
    bucket: &str,
    range: &TimeRange,
    measurement: Option<&str>,
    tag_key: &str,
    tag_value: &str,
) -> String {
    let mut query = format!(
        "from(bucket: {})\n  |> range(start: {}, stop: {})\n",
        flux_string(bucket),
        flux_time(range.start),
        flux_time(range.end),
    );
    if let Some(m) = measurement {
        query.push_str(&format!(
            "  |> filter(fn: (r) => r._measurement == {})\n",
            flux_string(m)
        ));
    }
    query.push_str(&format!(
        "  |> filter(fn: (r) => r[{}] == {})\n",
        flux_string(tag_key),
        flux_string(tag_value)
    ));
    query
}

/// Newest reading of `field` for one station since `since`.
pub fn last_seen_query(
    bucket: &str,
    since: DateTime<Utc>,
    tag_key: &str,
    tag_value: &str,
    field: &str,
) -> String {
    format!(
        "from(bucket: {})\n  |> range(start: {})\n  |> filter(fn: (r) => r._field == {} and r[{}] == {})\n  |> last()\n",
        flux_string(bucket),
        flux_time(since),
        flux_string(field),
        flux_string(tag_key),
        flux_string(tag_value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use meteo_resampler::params::parse_instant;

    #[test]
    fn test_flux_string_escapes() {
        assert_eq!(flux_string("ws01"), "\"ws01\"");
        assert_eq!(flux_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(flux_string("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_range_query() {
        let range = TimeRange::new(
            parse_instant("2024-01-01T00:00:00Z").unwrap(),
            parse_instant("2024-01-01T03:00:00Z").unwrap(),
        );
        let q = range_query("ws", &range, Some("mqtt_data"), "topic", "ws01");

        assert!(q.starts_with("from(bucket: \"ws\")"));
        assert!(q.contains("range(start: 2024-01-01T00:00:00Z, stop: 2024-01-01T03:00:00Z)"));
        assert!(q.contains("r._measurement == \"mqtt_data\""));
        assert!(q.contains("r[\"topic\"] == \"ws01\""));
    }

    #[test]
    fn test_range_query_without_measurement() {
        let range = TimeRange::new(
            parse_instant("2024-01-01T00:00:00Z").unwrap(),
            parse_instant("2024-01-01T01:00:00Z").unwrap(),
        );
        let q = range_query("ws", &range, None, "topic", "x\" or true or \"");
        assert!(!q.contains("_measurement"));
        assert!(q.contains("== \"x\\\" or true or \\\"\""));
    }

    #[test]
    fn test_range_query_keeps_subseconds() {
        let range = TimeRange::new(
            parse_instant("2024-01-01T00:00:00Z").unwrap(),
            parse_instant("2024-01-01T00:00:00.500Z").unwrap(),
        );
        let q = range_query("ws", &range, None, "topic", "ws01");
        assert!(q.contains("range(start: 2024-01-01T00:00:00Z, stop: 2024-01-01T00:00:00.500Z)"));
    }

    #[test]
    fn test_last_seen_query() {
        let since = parse_instant("2024-01-01T00:00:00Z").unwrap();
        let q = last_seen_query("ws", since, "topic", "ws01", "TempOut");
        assert!(q.contains("r._field == \"TempOut\""));
        assert!(q.trim_end().ends_with("|> last()"));
    }
}
