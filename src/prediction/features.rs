//! Feature extraction for the next-event classifier.
//!
//! Every event start yields up to four nominal attributes: local hour of
//! day, local day of week, and the first GPS fix of its trail bucketed to
//! two decimal places (roughly 1 km cells). Events without a trail simply
//! leave the location slots unset.

use chrono::{DateTime, Datelike, Local, Timelike, Utc};

pub const FEATURE_COUNT: usize = 4;

/// Slot names for diagnostics, indexed like [`FeatureVector::slots`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["hour", "weekday", "lat_cell", "lon_cell"];

/// Rounds a coordinate to a two-decimal grid cell.
pub fn bucket_coordinate(value: f64) -> i32 {
    (value * 100.0).round() as i32
}

/// Value range of a feature slot when it is known up front. Location cells
/// have no fixed range; their domains grow with the training data.
pub fn fixed_domain(slot: usize) -> Option<std::ops::RangeInclusive<i32>> {
    match slot {
        0 => Some(0..=23),
        1 => Some(0..=6),
        _ => None,
    }
}

/// The attribute tuple one event start contributes to the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    /// Local hour of day, 0-23.
    pub hour: u32,
    /// Days since Monday, 0-6.
    pub weekday: u32,
    pub lat_cell: Option<i32>,
    pub lon_cell: Option<i32>,
}

impl FeatureVector {
    /// Extracts features for an event starting at `instant` with the given
    /// first GPS fix. Hour and weekday come from the user's local clock,
    /// since that is the rhythm the history follows.
    pub fn at(instant: DateTime<Utc>, fix: Option<(f64, f64)>) -> Self {
        let local = instant.with_timezone(&Local);
        Self {
            hour: local.hour(),
            weekday: local.weekday().num_days_from_monday(),
            lat_cell: fix.map(|(lat, _)| bucket_coordinate(lat)),
            lon_cell: fix.map(|(_, lon)| bucket_coordinate(lon)),
        }
    }

    /// Slot values in [`FEATURE_NAMES`] order; `None` marks an unset slot.
    pub fn slots(&self) -> [Option<i32>; FEATURE_COUNT] {
        [
            Some(self.hour as i32),
            Some(self.weekday as i32),
            self.lat_cell,
            self.lon_cell,
        ]
    }
}
