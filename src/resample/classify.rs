use serde::Serialize;

use crate::config::AggregationConfig;

/// How a field is reduced within each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldPolicy {
    /// Dropped before aggregation.
    Excluded,
    /// Rate-like member of the cumulative set: arithmetic mean.
    Intensity,
    /// Last value per window, then counter repair.
    Progressive,
    /// Member of the configured speed/direction pair.
    Wind,
    /// Arithmetic mean.
    Plain,
}

impl FieldPolicy {
    /// True for policies that reduce a window by arithmetic mean.
    pub fn is_mean(self) -> bool {
        matches!(self, FieldPolicy::Plain | FieldPolicy::Intensity)
    }
}

/// Decides the aggregation policy for `field`. Exclusion wins over every other
/// rule, and cumulative membership wins over the wind pair.
pub fn classify(field: &str, config: &AggregationConfig) -> FieldPolicy {
    if config.excluded.contains(field) {
        FieldPolicy::Excluded
    } else if config.cumulative.contains(field) {
        if config.is_rate_field(field) {
            FieldPolicy::Intensity
        } else {
            FieldPolicy::Progressive
        }
    } else if config.is_wind_field(field) {
        FieldPolicy::Wind
    } else {
        FieldPolicy::Plain
    }
}
