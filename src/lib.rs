//! Fixed-interval resampling and export of weather-station telemetry.

pub mod config;
pub mod diagnostics;
pub mod fetch;
pub mod output;
pub mod params;
pub mod parser;
pub mod readings;
pub mod resample;
pub mod status;
