pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod job;
pub mod record;
pub mod report;
pub mod tags;
pub mod time;

use std::{fmt, str::FromStr};

use chrono::FixedOffset;

pub use error::Error;

/// An absolute instant at minute resolution, carrying the wall-clock offset it was entered in.
pub type TimePoint = chrono::DateTime<FixedOffset>;

/// Half-open interval `[from, to)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    pub from: TimePoint,
    pub to: TimePoint,
}

impl TimeRange {
    pub fn new(from: TimePoint, to: TimePoint) -> Self {
        Self { from, to }
    }

    /// Overlap of two half-open intervals. Touching intervals do not overlap.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from < to).then_some(TimeRange { from, to })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format("%d.%m.%Y %R"),
            self.to.format("%d.%m.%Y %R")
        )
    }
}

/// 1-based position of a job in start-sorted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Index(usize),
    Last,
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "last" {
            Ok(Position::Last)
        } else if let Ok(i) = s.parse() {
            Ok(Position::Index(i))
        } else {
            Err("position must be either [last] or a positive integer".to_string())
        }
    }
}
