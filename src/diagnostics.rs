//! Counters for the permissive fallbacks taken during one aggregation run.
//!
//! Nothing in the engine fails on bad input; it degrades to an absent value or
//! a default parameter instead. Each of those degradations is counted here so
//! callers (and tests) can see what was silently dropped.

use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Present cells that could not be coerced to a finite number.
    pub non_numeric_cells: usize,
    /// Window size requests that fell back to the default.
    pub window_fallbacks: usize,
    /// Unit rules naming a conversion function that does not exist.
    pub unknown_conversions: usize,
    /// Unit rules whose factor is not a number.
    pub invalid_factors: usize,
    /// Samples lying outside the requested window grid.
    pub out_of_range_samples: usize,
    /// Wind samples missing one of speed/direction.
    pub incomplete_wind_samples: usize,
    /// Counter resets detected while repairing cumulative fields.
    pub counter_resets: usize,
    /// Source rows skipped because their timestamp could not be parsed.
    pub unparsable_timestamps: usize,
    /// Requested ranges narrowed because they exceeded the window limit.
    pub range_clamps: usize,
}

impl Diagnostics {
    /// Total number of fallbacks taken.
    pub fn total(&self) -> usize {
        self.non_numeric_cells
            + self.window_fallbacks
            + self.unknown_conversions
            + self.invalid_factors
            + self.out_of_range_samples
            + self.incomplete_wind_samples
            + self.unparsable_timestamps
            + self.range_clamps
    }

    /// Folds another run's counters into this one.
    pub fn merge(&mut self, other: &Diagnostics) {
        self.non_numeric_cells += other.non_numeric_cells;
        self.window_fallbacks += other.window_fallbacks;
        self.unknown_conversions += other.unknown_conversions;
        self.invalid_factors += other.invalid_factors;
        self.out_of_range_samples += other.out_of_range_samples;
        self.incomplete_wind_samples += other.incomplete_wind_samples;
        self.counter_resets += other.counter_resets;
        self.unparsable_timestamps += other.unparsable_timestamps;
        self.range_clamps += other.range_clamps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_excludes_counter_resets() {
        let d = Diagnostics {
            non_numeric_cells: 2,
            window_fallbacks: 1,
            counter_resets: 5,
            ..Default::default()
        };
        assert_eq!(d.total(), 3);
    }

    #[test]
    fn test_merge_adds_fields() {
        let mut a = Diagnostics {
            unknown_conversions: 1,
            ..Default::default()
        };
        let b = Diagnostics {
            unknown_conversions: 2,
            out_of_range_samples: 4,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.unknown_conversions, 3);
        assert_eq!(a.out_of_range_samples, 4);
    }
}
