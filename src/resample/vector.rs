//! Circular mean of a magnitude + direction pair.
//!
//! Directions follow the meteorological convention (where the flow comes
//! from, degrees clockwise from north). Each sample is split into
//! `u = s·sin(d)`, `v = s·cos(d)`; the components are averaged and recombined.

/// Averaged speed and direction for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorMean {
    pub speed: f64,
    /// In `[0, 360)`.
    pub direction: f64,
}

/// Computes the vector mean of `(speed, direction_degrees)` samples.
/// Returns `None` when there are no samples.
pub fn vector_mean(samples: &[(f64, f64)]) -> Option<VectorMean> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let (u_sum, v_sum) = samples.iter().fold((0.0, 0.0), |(u, v), &(speed, dir)| {
        let rad = dir.to_radians();
        (u + speed * rad.sin(), v + speed * rad.cos())
    });
    let (u_mean, v_mean) = (u_sum / n, v_sum / n);

    let speed = u_mean.hypot(v_mean);
    let direction = (u_mean.atan2(v_mean).to_degrees() + 360.0) % 360.0;

    Some(VectorMean { speed, direction })
}
