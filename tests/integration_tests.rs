use meteo_resampler::config::AggregationConfig;
use meteo_resampler::output::ExportTable;
use meteo_resampler::params::{TimeRange, WindowSize, parse_instant};
use meteo_resampler::parser::parse_readings_csv;
use meteo_resampler::resample::aggregate::aggregate;

const CONFIG: &str = r#"
excluded_columns: [ForecastIcon]
rain_columns: [RainDay, RainRate]
wind_columns: { speed: WindSpeed, direction: WindDir }
units:
  TempOut: { convert: FahrenheitToCelsius }
"#;

// Five 10-minute windows; RainDay resets between the third and fourth.
const READINGS: &str = "\
Datetime,TempOut,HumOut,RainDay,RainRate,WindSpeed,WindDir,ForecastIcon,Extra
2024-01-01T00:01:00Z,32,50,0,0,10,0,6,1
2024-01-01T00:06:00Z,212,52,0,0,10,90,6,
2024-01-01T00:12:00Z,50,err,2,1.5,,,6,
2024-01-01T00:22:00Z,,55,5,0.5,3,180,6,
2024-01-01T00:31:00Z,,,1,0,,,6,
2024-01-01T00:44:00Z,68,60,3,0,,,6,
";

#[test]
fn test_full_pipeline() {
    let config = AggregationConfig::from_yaml_str(CONFIG).expect("config parses");
    let parsed = parse_readings_csv(READINGS.as_bytes()).expect("CSV parses");
    let agg = aggregate(&parsed.series, &config, WindowSize::TenMinutes, None);

    assert_eq!(agg.rows.len(), 5);
    let col = |field: &str| -> Vec<Option<f64>> {
        agg.rows.iter().map(|r| r.values[field]).collect()
    };

    assert_eq!(
        col("RainDay"),
        vec![Some(0.0), Some(2.0), Some(5.0), Some(6.0), Some(8.0)]
    );
    // (32 + 212) / 2 = 122°F = 50°C
    assert_eq!(col("TempOut"), vec![Some(50.0), Some(10.0), None, None, Some(20.0)]);
    assert_eq!(col("HumOut")[1], None);
    assert_eq!(agg.diagnostics.non_numeric_cells, 1);

    let speed = col("WindSpeed");
    let direction = col("WindDir");
    assert!((speed[0].unwrap() - 50.0_f64.sqrt()).abs() < 1e-9);
    assert!((direction[0].unwrap() - 45.0).abs() < 1e-9);
    assert_eq!(speed[1], None);
    assert!((speed[2].unwrap() - 3.0).abs() < 1e-9);

    assert!(!agg.fields.iter().any(|f| f == "ForecastIcon"));
}

#[test]
fn test_export_header_order_and_rows() {
    let config = AggregationConfig::from_yaml_str(CONFIG).unwrap();
    let parsed = parse_readings_csv(READINGS.as_bytes()).unwrap();
    let range = TimeRange::new(
        parse_instant("2024-01-01T00:00:00Z").unwrap(),
        parse_instant("2024-01-01T01:00:00Z").unwrap(),
    );
    let agg = aggregate(&parsed.series, &config, WindowSize::TwentyMinutes, Some(range));

    let expected = config.catalog.expected_variables("ws_on", false);
    let table = ExportTable::from_aggregation(&agg, Some(expected.as_slice()));
    let csv_text = table.to_csv_string().unwrap();

    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        header,
        vec![
            "time", "TempOut", "HumOut", "WindSpeed", "WindDir", "RainRate", "Barometer", "Extra",
            "RainDay"
        ]
    );

    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(&records[0][0], "2024-01-01T00:00:00Z");
    assert_eq!(&records[2][0], "2024-01-01T00:40:00Z");
    // Barometer is expected but never observed
    assert!(records.iter().all(|r| r[6].is_empty()));
    // window 00:20 ends on RainDay 1, below the previous window's 2
    assert_eq!(&records[1][8], "3");
    assert_eq!(&records[2][8], "5");
}

#[test]
fn test_empty_input_yields_time_only_table() {
    let config = AggregationConfig::default();
    let parsed = parse_readings_csv(b"Datetime,TempOut\n").unwrap();
    let agg = aggregate(&parsed.series, &config, WindowSize::TenMinutes, None);
    let table = ExportTable::from_aggregation(&agg, None);

    assert_eq!(table.to_csv_string().unwrap(), "time\n");
}
