//! Temporal expressions as they are typed on the command line.
//!
//! A [`TimeParser`] is bound to one "now" so that every expression resolved
//! during a run agrees on the current instant. Clock inputs (`14:30`,
//! `24.12.,9:00`) are read in the offset of that instant, a bare date
//! (`24.12.`) starts at midnight UTC.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveTime, Timelike, Weekday,
};
use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::jobber::{Error, TimePoint, TimeRange};

/// Current local instant truncated to the minute.
pub fn now() -> TimePoint {
    truncate(Local::now().fixed_offset())
}

fn truncate(t: TimePoint) -> TimePoint {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Result of resolving an expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parsed {
    Point(TimePoint),
    Range(TimeRange),
    Invalid,
}

type Resolve = fn(&TimeParser, &Captures<'_>) -> Option<TimePoint>;

/// One grammar rule: an anchored pattern and the function turning its captures into an instant.
struct Rule {
    name: &'static str,
    pattern: Regex,
    resolve: Resolve,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, resolve: Resolve) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("time rule pattern is valid"),
            resolve,
        }
    }
}

/// Point rules in priority order. The first matching rule decides.
static POINT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new("now", r"^now$", |p, _| Some(p.now)),
        Rule::new(
            "relative clock",
            r"^(\d{1,2}):(\d{1,2})([+-])$",
            TimeParser::relative_clock,
        ),
        Rule::new("relative unit", r"^(\d+)([hm])([+-])$", TimeParser::relative_unit),
        Rule::new("clock", r"^(\d{1,2}):(\d{1,2})$", TimeParser::clock),
    ]
});

static CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").expect("clock pattern is valid"));
static GERMAN_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})\.(\d{1,2})(?:\.(\d{1,4})?)?$").expect("german date pattern is valid")
});
static ENGLISH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{1,4})$").expect("english date pattern is valid")
});

/// A date and/or clock time resolved from a comma separated expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTimeSpec {
    pub point: TimePoint,
    /// `false` when only a date was given (time defaulted to midnight).
    pub has_time: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct TimeParser {
    now: TimePoint,
}

impl TimeParser {
    pub fn new(now: TimePoint) -> Self {
        Self { now }
    }

    pub fn now(&self) -> TimePoint {
        self.now
    }

    fn offset(&self) -> FixedOffset {
        *self.now.offset()
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Resolve an expression as a range if possible, otherwise as an instant.
    ///
    /// Bare dates become whole-day ranges; anything with a clock part is a point.
    pub fn parse_expression(&self, text: &str) -> Parsed {
        if let Some(range) = self.parse_range(text) {
            Parsed::Range(range)
        } else if let Some(point) = self.parse_time(text, true) {
            Parsed::Point(point)
        } else {
            Parsed::Invalid
        }
    }

    /// Resolve `now`, `H:M+`, `Nh-`, `H:M` or a date/time expression into an instant.
    ///
    /// Date-only expressions (no clock part) are accepted only with `allow_date_only`.
    pub fn parse_time(&self, text: &str, allow_date_only: bool) -> Option<TimePoint> {
        let text = text.trim();
        for rule in POINT_RULES.iter() {
            if let Some(caps) = rule.pattern.captures(text) {
                debug!("parse time '{text}': {}", rule.name);
                return (rule.resolve)(self, &caps);
            }
        }
        match self.parse_date_time(text) {
            Some(spec) if spec.has_time || allow_date_only => {
                debug!("parse time '{text}': date and time");
                Some(spec.point)
            }
            _ => {
                debug!("parse time '{text}': invalid");
                None
            }
        }
    }

    /// Like [`TimeParser::parse_time`] but reports failure as [`Error::ParseFailure`].
    pub fn time(&self, text: &str, allow_date_only: bool) -> Result<TimePoint, Error> {
        self.parse_time(text, allow_date_only)
            .ok_or_else(|| Error::ParseFailure(text.to_string()))
    }

    fn relative_clock(&self, caps: &Captures<'_>) -> Option<TimePoint> {
        let hours: i64 = caps[1].parse().ok()?;
        let minutes: i64 = caps[2].parse().ok()?;
        self.shift(Duration::try_minutes(hours * 60 + minutes)?, &caps[3])
    }

    fn relative_unit(&self, caps: &Captures<'_>) -> Option<TimePoint> {
        let amount: i64 = caps[1].parse().ok()?;
        let delta = match &caps[2] {
            "h" => Duration::try_hours(amount)?,
            _ => Duration::try_minutes(amount)?,
        };
        self.shift(delta, &caps[3])
    }

    fn shift(&self, delta: Duration, sign: &str) -> Option<TimePoint> {
        match sign {
            "-" => self.now.checked_sub_signed(delta),
            _ => self.now.checked_add_signed(delta),
        }
    }

    /// Today at `H:M`, or yesterday if that is more than twelve hours ahead.
    fn clock(&self, caps: &Captures<'_>) -> Option<TimePoint> {
        let time = clock_time(caps)?;
        let today = self.at(self.today(), time)?;
        if today - self.now > Duration::hours(12) {
            today.checked_sub_signed(Duration::days(1))
        } else {
            Some(today)
        }
    }

    fn at(&self, date: NaiveDate, time: NaiveTime) -> Option<TimePoint> {
        date.and_time(time)
            .and_local_timezone(self.offset())
            .single()
    }

    /// Resolve a comma separated date and/or clock time, or the literal `now`.
    ///
    /// At most one date segment and one time segment are accepted, in either
    /// order. A date segment is required. Without a time segment the result
    /// is midnight UTC of that date.
    pub fn parse_date_time(&self, text: &str) -> Option<DateTimeSpec> {
        let text = text.trim();
        if text == "now" {
            return Some(DateTimeSpec {
                point: self.now,
                has_time: true,
            });
        }
        let mut date = None;
        let mut time = None;
        for segment in text.split(',').map(str::trim) {
            if let Some(caps) = CLOCK.captures(segment) {
                if time.replace(clock_time(&caps)?).is_some() {
                    return None;
                }
            } else if date.replace(self.date(segment)?).is_some() {
                return None;
            }
        }
        let date = date?;
        let point = match time {
            Some(time) => self.at(date, time)?,
            None => date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset(),
        };
        Some(DateTimeSpec {
            point,
            has_time: time.is_some(),
        })
    }

    /// German `D.M[.Y]`, English `M/D/Y`, a weekday name or `yesterday`.
    fn date(&self, segment: &str) -> Option<NaiveDate> {
        if let Some(caps) = GERMAN_DATE.captures(segment) {
            let year = match caps.get(3) {
                Some(year) => full_year(year.as_str())?,
                None => self.today().year(),
            };
            return NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[1].parse().ok()?);
        }
        if let Some(caps) = ENGLISH_DATE.captures(segment) {
            return NaiveDate::from_ymd_opt(
                full_year(&caps[3])?,
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
            );
        }
        if segment == "yesterday" {
            return self.today().pred_opt();
        }
        let weekday: Weekday = segment.parse().ok()?;
        let mut day = self.today();
        while day.weekday() != weekday {
            day = day.pred_opt()?;
        }
        Some(day)
    }

    /// Resolve `A-B`, `A-`, `-B` or a single bare date into a half-open range.
    ///
    /// A missing endpoint means now. A bare date as end point covers that whole
    /// day. Ranges that end before they start are invalid.
    pub fn parse_range(&self, text: &str) -> Option<TimeRange> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let range = match text.split_once('-') {
            Some((from, to)) => {
                if to.contains('-') || (from.trim().is_empty() && to.trim().is_empty()) {
                    return None;
                }
                let from = match from.trim() {
                    "" => self.now,
                    from => self.parse_date_time(from)?.point,
                };
                let to = match to.trim() {
                    "" => self.now,
                    to => self.end_of(self.parse_date_time(to)?)?,
                };
                TimeRange::new(from, to)
            }
            None => {
                let spec = self.parse_date_time(text)?;
                if spec.has_time {
                    return None;
                }
                TimeRange::new(spec.point, self.end_of(spec)?)
            }
        };
        debug!("parse range '{text}': {range}");
        (range.from < range.to).then_some(range)
    }

    fn end_of(&self, spec: DateTimeSpec) -> Option<TimePoint> {
        if spec.has_time {
            Some(spec.point)
        } else {
            spec.point.checked_add_signed(Duration::days(1))
        }
    }
}

fn clock_time(caps: &Captures<'_>) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}

/// Two digit years are read as 20xx.
fn full_year(year: &str) -> Option<i32> {
    let year: i32 = year.parse().ok()?;
    Some(if year < 100 { 2000 + year } else { year })
}

/// Instant from an RFC 3339 string, used by tests and the record codec alike.
pub fn from_rfc3339(s: &str) -> Result<TimePoint, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
}
