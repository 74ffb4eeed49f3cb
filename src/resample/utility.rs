/// Computes the arithmetic mean of a slice of values. Returns `None` for empty
/// input, since an empty window has no mean (not a zero mean).
///
/// Accumulated incrementally so large finite inputs cannot overflow the sum.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = values
        .iter()
        .enumerate()
        .fold(0.0, |m, (i, x)| {
            let k = (i + 1) as f64;
            m + (x / k - m / k)
        });
    m.is_finite().then_some(m)
}

/// Rounds to 2 decimal places, halves away from zero. Magnitudes too large to
/// scale have no fractional part and are returned as is.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / 100.0
}
