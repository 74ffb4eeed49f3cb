//! Fixed-window resampling of raw station readings.
//!
//! Each field is classified (plain mean, rate mean, progressive counter, wind
//! vector, excluded), reduced per window, unit-converted and rounded. The
//! entry point is [`aggregate::aggregate`].

pub mod aggregate;
pub mod classify;
pub mod repair;
pub mod units;
pub mod utility;
pub mod vector;
pub mod window;
