use std::{collections::BTreeSet, fmt};

use chrono::Datelike;

use crate::jobber::{Error, TimePoint, TimeRange};

/// Default rounding granularity in hours.
pub const DEFAULT_RESOLUTION: f64 = 0.25;

/// One tracked portion of work.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    start: TimePoint,
    end: Option<TimePoint>,
    pub message: String,
    pub tags: BTreeSet<String>,
}

/// Something a job can be intersected with.
#[derive(Clone, Copy, Debug)]
pub enum Probe<'a> {
    Job(&'a Job),
    Point(TimePoint),
}

impl<'a> From<&'a Job> for Probe<'a> {
    fn from(job: &'a Job) -> Self {
        Probe::Job(job)
    }
}

impl From<TimePoint> for Probe<'_> {
    fn from(point: TimePoint) -> Self {
        Probe::Point(point)
    }
}

impl Job {
    /// A running job starting at `start`.
    pub fn open(start: TimePoint, message: String, tags: BTreeSet<String>) -> Self {
        Self {
            start,
            end: None,
            message,
            tags,
        }
    }

    /// A finished job, rejected unless `start < end`.
    pub fn finished(
        start: TimePoint,
        end: TimePoint,
        message: String,
        tags: BTreeSet<String>,
    ) -> Result<Self, Error> {
        let mut job = Self::open(start, message, tags);
        job.set_end(end)?;
        Ok(job)
    }

    /// `true` if `start..end` is a valid interval.
    pub fn check(start: TimePoint, end: TimePoint) -> bool {
        start < end
    }

    pub fn start(&self) -> TimePoint {
        self.start
    }

    pub fn end(&self) -> Option<TimePoint> {
        self.end
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Move the start. A finished job keeps its old start if the result would be empty.
    pub fn set_start(&mut self, start: TimePoint) -> Result<(), Error> {
        if let Some(end) = self.end {
            if !Self::check(start, end) {
                return Err(Error::InvalidInterval { start, end });
            }
        }
        self.start = start;
        Ok(())
    }

    /// Finish the job. The old end is kept if `end` is not after the start.
    pub fn set_end(&mut self, end: TimePoint) -> Result<(), Error> {
        if !Self::check(self.start, end) {
            return Err(Error::InvalidInterval {
                start: self.start,
                end,
            });
        }
        self.end = Some(end);
        Ok(())
    }

    /// The interval covered so far; a running job reaches up to `now`.
    pub fn interval(&self, now: TimePoint) -> TimeRange {
        TimeRange::new(self.start, self.end.unwrap_or(now))
    }

    /// Elapsed hours without rounding.
    pub fn hours_exact(&self, now: TimePoint) -> f64 {
        let interval = self.interval(now);
        (interval.to - interval.from).num_seconds() as f64 / 3600.0
    }

    /// Elapsed hours rounded to the nearest multiple of `resolution`.
    pub fn hours(&self, now: TimePoint, resolution: f64) -> f64 {
        round_hours(self.hours_exact(now), resolution)
    }

    /// Overlap with another job or an instant.
    ///
    /// An instant only intersects if it lies strictly inside the job, the result
    /// then is the empty range at that instant.
    pub fn intersect<'a>(&self, other: impl Into<Probe<'a>>, now: TimePoint) -> Option<TimeRange> {
        let interval = self.interval(now);
        match other.into() {
            Probe::Job(job) => interval.intersect(&job.interval(now)),
            Probe::Point(t) => {
                (interval.from < t && t < interval.to).then_some(TimeRange::new(t, t))
            }
        }
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    pub fn day(&self) -> u32 {
        self.start.day()
    }
}

/// Round half away from zero to the given granularity.
pub fn round_hours(hours: f64, resolution: f64) -> f64 {
    if resolution > 0.0 {
        (hours / resolution).round() * resolution
    } else {
        hours
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  Start: {}", self.start.format("%a %b %d %Y, %H:%M"))?;
        if let Some(end) = self.end {
            write!(f, "\n    End: {}", end.format("%a %b %d %Y, %H:%M"))?;
        }
        for (n, line) in self.message.lines().enumerate() {
            if n == 0 {
                write!(f, "\nMessage: {line}")?;
            } else {
                write!(f, "\n         {line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;
    use rstest::rstest;

    use super::{round_hours, Job};
    use crate::jobber::{time::from_rfc3339, Error, TimePoint, TimeRange};

    fn at(s: &str) -> TimePoint {
        from_rfc3339(&format!("2024-01-01T{s}:00Z")).unwrap()
    }

    fn job(start: &str, end: &str) -> Job {
        Job::finished(at(start), at(end), String::new(), BTreeSet::new()).unwrap()
    }

    #[test]
    fn test_set_end_valid() {
        let mut job = Job::open(at("09:00"), String::new(), BTreeSet::new());

        job.set_end(at("10:30")).unwrap();

        assert_eq!(job.end(), Some(at("10:30")));
        assert!((job.hours_exact(at("23:00")) - 1.5).abs() < 1e-9);
    }

    #[rstest]
    #[case::before("08:00")]
    #[case::equal("09:00")]
    fn test_set_end_rejected(#[case] end: &str) {
        let mut job = job("09:00", "10:00");

        let result = job.set_end(at(end));

        assert!(matches!(result, Err(Error::InvalidInterval { .. })));
        assert_eq!(job.end(), Some(at("10:00")));
    }

    #[test]
    fn test_set_start_rejected_keeps_old_value() {
        let mut job = job("09:00", "10:00");

        assert!(job.set_start(at("10:00")).is_err());
        assert_eq!(job.start(), at("09:00"));
        job.set_start(at("08:00")).unwrap();
        assert_eq!(job.start(), at("08:00"));
    }

    #[test]
    fn test_finished_rejects_empty_interval() {
        assert!(Job::finished(at("10:00"), at("09:00"), String::new(), BTreeSet::new()).is_err());
    }

    #[test]
    fn test_open_job_grows() {
        let job = Job::open(at("09:00"), String::new(), BTreeSet::new());

        assert!(job.is_open());
        assert!((job.hours_exact(at("10:00")) - 1.0).abs() < 1e-9);
        assert!((job.hours_exact(at("12:00")) - 3.0).abs() < 1e-9);
    }

    #[rstest]
    #[case(1.1, 0.25, 1.0)]
    #[case(1.4, 0.25, 1.5)]
    #[case(1.125, 0.25, 1.25)]
    #[case(0.1, 0.25, 0.0)]
    #[case(2.3, 0.5, 2.5)]
    #[case(2.34, 0.0, 2.34)]
    fn test_round_hours(#[case] exact: f64, #[case] resolution: f64, #[case] expected: f64) {
        assert!((round_hours(exact, resolution) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_hours_uses_resolution() {
        let start = at("09:00");
        let job = Job::finished(
            start,
            start + Duration::minutes(66),
            String::new(),
            BTreeSet::new(),
        )
        .unwrap();

        assert!((job.hours(at("23:00"), 0.25) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_intersect_jobs() {
        let now = at("23:00");

        assert_eq!(
            job("09:00", "10:00").intersect(&job("09:30", "11:00"), now),
            Some(TimeRange::new(at("09:30"), at("10:00")))
        );
        assert_eq!(
            job("09:00", "10:00").intersect(&job("10:00", "11:00"), now),
            None
        );
    }

    #[test]
    fn test_intersect_point() {
        let now = at("23:00");
        let job = job("09:00", "10:00");

        assert_eq!(
            job.intersect(at("09:30"), now),
            Some(TimeRange::new(at("09:30"), at("09:30")))
        );
        assert_eq!(job.intersect(at("09:00"), now), None);
        assert_eq!(job.intersect(at("10:00"), now), None);
    }

    #[test]
    fn test_intersect_open_job_reaches_now() {
        let open = Job::open(at("09:00"), String::new(), BTreeSet::new());

        assert!(open.intersect(at("11:00"), at("12:00")).is_some());
        assert!(open.intersect(at("11:00"), at("10:00")).is_none());
    }

    #[test]
    fn test_calendar_components() {
        let job = job("09:00", "10:00");

        assert_eq!((job.year(), job.month(), job.day()), (2024, 1, 1));
    }
}
