//! Repair of progressive counters that reset (e.g. a daily rain total going
//! back to 0 at midnight).
//!
//! Whenever a window's value is lower than the previous one, the counter is
//! assumed to have restarted and the previous value is folded into a running
//! offset. Several resets between two sampled windows look exactly like one,
//! so the repaired total is a lower bound in that case.

use crate::config::CounterGapPolicy;

/// Output of a repair pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub values: Vec<Option<f64>>,
    pub resets: usize,
}

/// Repairs a per-window series of last observed counter values.
///
/// With [`CounterGapPolicy::Propagate`], absent windows stay absent and the
/// reset test compares against the last present value. With
/// [`CounterGapPolicy::ZeroFill`], absent windows are read as 0 and emitted
/// as `0 + offset`.
pub fn repair_progressive(values: &[Option<f64>], gaps: CounterGapPolicy) -> Repaired {
    let mut out = Vec::with_capacity(values.len());
    let mut offset = 0.0;
    let mut previous: Option<f64> = None;
    let mut resets = 0;

    for value in values {
        let current = match (value, gaps) {
            (Some(v), _) => *v,
            (None, CounterGapPolicy::ZeroFill) => 0.0,
            (None, CounterGapPolicy::Propagate) => {
                out.push(None);
                continue;
            }
        };

        if let Some(prev) = previous {
            if current < prev {
                offset += prev;
                resets += 1;
            }
        }
        previous = Some(current);
        out.push(Some(current + offset));
    }

    Repaired {
        values: out,
        resets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    fn is_non_decreasing(values: &[Option<f64>]) -> bool {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        present.windows(2).all(|w| w[1] >= w[0])
    }

    #[test]
    fn test_empty_series() {
        let r = repair_progressive(&[], CounterGapPolicy::Propagate);
        assert!(r.values.is_empty());
        assert_eq!(r.resets, 0);
    }

    #[test]
    fn test_single_reset() {
        let r = repair_progressive(&present(&[0.0, 2.0, 5.0, 1.0, 3.0]), CounterGapPolicy::Propagate);
        assert_eq!(r.values, present(&[0.0, 2.0, 5.0, 6.0, 8.0]));
        assert_eq!(r.resets, 1);
    }

    #[test]
    fn test_monotonic_input_unchanged() {
        let input = present(&[1.0, 1.0, 2.5, 4.0]);
        let r = repair_progressive(&input, CounterGapPolicy::Propagate);
        assert_eq!(r.values, input);
        assert_eq!(r.resets, 0);
    }

    #[test]
    fn test_repeated_resets_stay_non_decreasing() {
        let input = present(&[3.0, 7.0, 0.0, 4.0, 9.0, 0.5, 0.2, 6.0]);
        let r = repair_progressive(&input, CounterGapPolicy::Propagate);
        assert!(is_non_decreasing(&r.values));
        assert_eq!(r.resets, 3);
        // 7 + 9 + 0.5 carried before the final 6
        assert_eq!(r.values.last(), Some(&Some(22.5)));
    }

    #[test]
    fn test_gaps_propagate_as_absent() {
        let input = vec![Some(5.0), None, Some(6.0), None, Some(1.0)];
        let r = repair_progressive(&input, CounterGapPolicy::Propagate);
        assert_eq!(r.values, vec![Some(5.0), None, Some(6.0), None, Some(7.0)]);
        assert_eq!(r.resets, 1);
    }

    #[test]
    fn test_leading_gap_propagates() {
        let r = repair_progressive(&[None, Some(2.0)], CounterGapPolicy::Propagate);
        assert_eq!(r.values, vec![None, Some(2.0)]);
    }

    #[test]
    fn test_gaps_zero_filled() {
        let input = vec![Some(5.0), None, Some(6.0)];
        let r = repair_progressive(&input, CounterGapPolicy::ZeroFill);
        // the empty window reads as a reset to 0
        assert_eq!(r.values, vec![Some(5.0), Some(5.0), Some(11.0)]);
        assert_eq!(r.resets, 1);
        assert!(is_non_decreasing(&r.values));
    }

    #[test]
    fn test_leading_gap_zero_filled() {
        let r = repair_progressive(&[None, Some(2.0)], CounterGapPolicy::ZeroFill);
        assert_eq!(r.values, vec![Some(0.0), Some(2.0)]);
    }
}
