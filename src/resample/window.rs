use chrono::{DateTime, Duration, Utc};

use crate::params::{TimeRange, WindowSize};

/// Largest grid built for one run: a leap year of 10 minute windows.
pub const MAX_WINDOWS: usize = 366 * 24 * 6;

/// A contiguous run of equally sized, epoch-aligned windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGrid {
    size: WindowSize,
    origin: DateTime<Utc>,
    count: usize,
}

impl WindowGrid {
    /// Windows from the aligned floor of `range.start` up to (not including)
    /// `range.end`. An inverted or empty range gives an empty grid.
    pub fn for_range(range: TimeRange, size: WindowSize) -> Self {
        let origin = size.floor(range.start);
        let step = size.duration().num_seconds();
        let span = (range.end - origin).num_seconds();
        let count = if range.end <= range.start || span <= 0 {
            0
        } else {
            ((span + step - 1) / step) as usize
        };
        Self {
            size,
            origin,
            count,
        }
    }

    /// Windows covering `first..=last`, both floored to the grid.
    pub fn spanning(first: DateTime<Utc>, last: DateTime<Utc>, size: WindowSize) -> Self {
        let origin = size.floor(first);
        let step = size.duration().num_seconds();
        let span = (size.floor(last) - origin).num_seconds();
        let count = if span < 0 { 0 } else { (span / step) as usize + 1 };
        Self {
            size,
            origin,
            count,
        }
    }

    /// Keeps only the windows overlapping `first..=last`.
    pub fn restricted_to(self, first: DateTime<Utc>, last: DateTime<Utc>) -> Self {
        let step = self.size.duration().num_seconds();
        let offset = |t: DateTime<Utc>| (t - self.origin).num_seconds().div_euclid(step);
        let from = offset(first).max(0);
        let to = (offset(last) + 1).min(self.count as i64);
        let count = if to > from { (to - from) as usize } else { 0 };
        Self {
            size: self.size,
            origin: self.start_of(from.min(self.count as i64) as usize),
            count,
        }
    }

    /// Drops trailing windows beyond `max`.
    pub fn truncated(self, max: usize) -> Self {
        Self {
            count: self.count.min(max),
            ..self
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Index of the window containing `t`, if any.
    pub fn index_of(&self, t: DateTime<Utc>) -> Option<usize> {
        if t < self.origin {
            return None;
        }
        let idx = ((t - self.origin).num_seconds() / self.size.duration().num_seconds()) as usize;
        (idx < self.count).then_some(idx)
    }

    pub fn start_of(&self, index: usize) -> DateTime<Utc> {
        self.origin + Duration::seconds(index as i64 * self.size.duration().num_seconds())
    }

    pub fn starts(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.count).map(|i| self.start_of(i))
    }
}
