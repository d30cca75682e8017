//! Time ranges on the composition timeline.

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing timeline positions.
pub const TIME_EPSILON: f64 = 1e-9;

/// A half-open interval `[start, start + duration)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl TimeRange {
    /// Empty range at zero.
    pub const ZERO: TimeRange = TimeRange {
        start_secs: 0.0,
        duration_secs: 0.0,
    };

    /// Create a range; negative durations collapse to zero.
    pub fn new(start_secs: f64, duration_secs: f64) -> Self {
        Self {
            start_secs,
            duration_secs: duration_secs.max(0.0),
        }
    }

    /// Range starting at zero with the given duration.
    pub fn from_duration(duration_secs: f64) -> Self {
        Self::new(0.0, duration_secs)
    }

    /// Exclusive end of the range.
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    pub fn is_empty(&self) -> bool {
        self.duration_secs <= TIME_EPSILON
    }

    /// Whether `t` falls inside the range.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs - TIME_EPSILON && t < self.end_secs() - TIME_EPSILON
    }

    /// Whether two ranges share any time. Ranges that only touch do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_secs < other.end_secs() - TIME_EPSILON
            && other.start_secs < self.end_secs() - TIME_EPSILON
    }

    /// Same duration, moved to start at `start_secs`.
    pub fn shifted_to(&self, start_secs: f64) -> Self {
        Self::new(start_secs, self.duration_secs)
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &TimeRange) -> Self {
        let start = self.start_secs.min(other.start_secs);
        let end = self.end_secs().max(other.end_secs());
        Self::new(start, end - start)
    }

    /// Shared part of two ranges, if they overlap.
    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }
        let start = self.start_secs.max(other.start_secs);
        let end = self.end_secs().min(other.end_secs());
        Some(Self::new(start, end - start))
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::ZERO
    }
}
