use std::collections::BTreeMap;

use crate::jobber::{job::Job, TimePoint};

/// Calendar day a job is booked on.
pub type Day = (i32, u32, u32);

/// Sum rounded hours per start day. Running jobs count with their live hours.
pub fn aggregate<'a>(
    jobs: impl IntoIterator<Item = &'a Job>,
    now: TimePoint,
    resolution: f64,
) -> BTreeMap<Day, f64> {
    jobs.into_iter().fold(BTreeMap::new(), |mut days, job| {
        *days.entry((job.year(), job.month(), job.day())).or_insert(0.0) +=
            job.hours(now, resolution);
        days
    })
}

/// Fold per-day hours into per-month totals.
pub fn months(days: &BTreeMap<Day, f64>) -> BTreeMap<(i32, u32), f64> {
    days.iter()
        .fold(BTreeMap::new(), |mut months, (&(year, month, _), hours)| {
            *months.entry((year, month)).or_insert(0.0) += hours;
            months
        })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{aggregate, months};
    use crate::jobber::{job::Job, time::from_rfc3339, TimePoint};

    fn at(s: &str) -> TimePoint {
        from_rfc3339(s).unwrap()
    }

    fn job(start: &str, end: &str) -> Job {
        Job::finished(at(start), at(end), String::new(), BTreeSet::new()).unwrap()
    }

    #[test]
    fn test_aggregate_by_start_day() {
        let now = at("2024-02-02T12:00:00Z");
        let jobs = vec![
            job("2024-01-31T09:00:00Z", "2024-01-31T10:10:00Z"),
            job("2024-01-31T22:00:00Z", "2024-02-01T02:00:00Z"),
            job("2024-02-01T09:00:00Z", "2024-02-01T09:30:00Z"),
            Job::open(at("2024-02-02T10:00:00Z"), String::new(), BTreeSet::new()),
        ];

        let days = aggregate(&jobs, now, 0.25);

        assert_eq!(days.len(), 3);
        assert!((days[&(2024, 1, 31)] - 5.25).abs() < 1e-9);
        assert!((days[&(2024, 2, 1)] - 0.5).abs() < 1e-9);
        assert!((days[&(2024, 2, 2)] - 2.0).abs() < 1e-9);

        let months = months(&days);
        assert!((months[&(2024, 1)] - 5.25).abs() < 1e-9);
        assert!((months[&(2024, 2)] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty() {
        let jobs: Vec<Job> = Vec::new();

        assert!(aggregate(&jobs, at("2024-01-01T00:00:00Z"), 0.25).is_empty());
    }
}
