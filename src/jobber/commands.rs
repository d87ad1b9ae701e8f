use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::Duration;
use log::warn;

use crate::jobber::{
    config::Config,
    data::{Filter, JobStore},
    job::Job,
    record::split_tags,
    report,
    time::TimeParser,
    Error, Position, TimePoint,
};

/// One run of the tool: the loaded jobs plus the terminal to talk to.
pub struct Session<'a, R, W> {
    store: &'a mut JobStore,
    config: &'a Config,
    parser: TimeParser,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Session<'a, R, W> {
    pub fn new(
        store: &'a mut JobStore,
        config: &'a Config,
        parser: TimeParser,
        input: R,
        output: W,
    ) -> Self {
        Self {
            store,
            config,
            parser,
            input,
            output,
        }
    }

    pub fn start(
        &mut self,
        time: Option<String>,
        message: Option<String>,
        tags: Option<String>,
    ) -> Result<()> {
        self.begin(time, message, tags, false)
    }

    /// Start a job that continues the latest one, reusing its message and tags.
    pub fn back(
        &mut self,
        time: Option<String>,
        message: Option<String>,
        tags: Option<String>,
    ) -> Result<()> {
        self.begin(time, message, tags, true)
    }

    fn begin(
        &mut self,
        time: Option<String>,
        message: Option<String>,
        tags: Option<String>,
        back: bool,
    ) -> Result<()> {
        let start = self.time(time.as_deref())?;
        if let Some((position, job)) = self.store.open() {
            let job = job.clone();
            writeln!(self.output, "There is still an open job!")?;
            self.show(position, &job)?;
            if self
                .close_open_job("Do you want to close this job first (enter time or nothing to cancel)? ")?
                .is_none()
            {
                bail!("Canceled job start, running job remains open");
            }
        }
        let tags = tags.as_deref().map(split_tags);
        let (message, tags) = if back {
            self.store.continued(message, tags.as_ref())
        } else {
            (message.unwrap_or_default(), tags.unwrap_or_default())
        };
        let (position, overlaps) = self
            .store
            .start_job(start, message, tags, self.parser.now())?;
        self.warn_overlaps(&overlaps)?;
        writeln!(self.output, "Starting new job:")?;
        self.show_position(position)
    }

    pub fn end(&mut self, time: Option<String>, message: Option<String>) -> Result<()> {
        let end = self.time(time.as_deref())?;
        let position = match self.store.end_job(end, message.as_deref()) {
            Ok(position) => position,
            Err(Error::InvalidInterval { .. }) => {
                writeln!(self.output, "End time is ahead of start time!")?;
                match self.close_open_job("Please enter another end time (nothing to cancel): ")? {
                    Some(position) => position,
                    None => bail!("Canceled, job remains open"),
                }
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(self.output, "Ending job:")?;
        self.show_position(position)
    }

    /// Record a finished job from two of start, end and duration.
    ///
    /// A lone duration ends now.
    pub fn add(
        &mut self,
        start: Option<String>,
        end: Option<String>,
        duration: Option<f64>,
        message: Option<String>,
        tags: Option<String>,
    ) -> Result<()> {
        let (start, end) = match (start, end, duration) {
            (Some(start), Some(end), None) => (self.time(Some(&start))?, self.time(Some(&end))?),
            (Some(start), None, Some(hours)) => {
                let start = self.time(Some(&start))?;
                (start, start + hours_to_duration(hours)?)
            }
            (None, end, Some(hours)) => {
                let end = self.time(end.as_deref())?;
                (end - hours_to_duration(hours)?, end)
            }
            (Some(_), Some(_), Some(_)) => bail!("Give only two of start, end and duration"),
            _ => bail!("Give a start time with an end time or a duration"),
        };
        let (position, overlaps) = self.store.add_job(
            start,
            end,
            message.unwrap_or_default(),
            tags.as_deref().map(split_tags).unwrap_or_default(),
            self.parser.now(),
        )?;
        self.warn_overlaps(&overlaps)?;
        writeln!(self.output, "Adding job:")?;
        self.show_position(position)
    }

    pub fn cancel(&mut self) -> Result<()> {
        let (position, job) = self.store.open().ok_or(Error::NoOpenJob)?;
        let job = job.clone();
        self.show(position, &job)?;
        if self.confirm("Do you really want to throw away the running job")? {
            self.store.cancel_open_job()?;
            writeln!(self.output, "Canceled running job")?;
        } else {
            writeln!(self.output, "Job remains open")?;
        }
        Ok(())
    }

    pub fn drop(&mut self, position: Position) -> Result<()> {
        let position = self.store.position(position)?;
        self.show_position(position)?;
        if self.confirm("Do you really want to delete this job")? {
            self.store.drop_job(position)?;
            writeln!(self.output, "Deleted job #{position}")?;
        } else {
            writeln!(self.output, "Deletion canceled.")?;
        }
        Ok(())
    }

    pub fn join(&mut self, positions: Vec<usize>) -> Result<()> {
        let join = self
            .store
            .plan_join(&positions, self.parser.now(), self.config.resolution)?;
        let list = join
            .positions
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.output, "Joining jobs {list} into:")?;
        self.show(join.positions[0], &join.merged)?;
        writeln!(
            self.output,
            "This changes the total by {:+} hour(s)",
            join.delta
        )?;
        if self.confirm(&format!(
            "Do you really want to merge {} jobs into the above job",
            join.positions.len()
        ))? {
            let position = self.store.join(join)?;
            writeln!(self.output, "Joined jobs {list} at position {position}")?;
        } else {
            writeln!(self.output, "Canceled joining")?;
        }
        Ok(())
    }

    /// Move start and/or end of a job.
    pub fn edit(
        &mut self,
        position: Position,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<()> {
        let position = self.store.position(position)?;
        let start = start.as_deref().map(|t| self.time(Some(t))).transpose()?;
        let end = end.as_deref().map(|t| self.time(Some(t))).transpose()?;
        let position = self.store.edit_times(position, start, end)?;
        writeln!(self.output, "Edited job:")?;
        self.show_position(position)
    }

    pub fn tag(&mut self, position: Position, tags: String) -> Result<()> {
        let position = self.store.position(position)?;
        self.store.edit_tags(position, &split_tags(&tags))?;
        self.show_position(position)
    }

    pub fn message(&mut self, position: Position, message: String) -> Result<()> {
        let position = self.store.position(position)?;
        self.store
            .set_message(position, message.replace("\\n", "\n"))?;
        self.show_position(position)
    }

    pub fn list(&mut self, filter: Option<String>, tags: Option<String>) -> Result<()> {
        let filter = self.filter(filter.as_deref())?;
        let tags = tags.as_deref().map(split_tags).unwrap_or_default();
        let now = self.parser.now();
        let jobs: Vec<(usize, Job)> = self
            .store
            .filter(&filter, &tags, now)
            .into_iter()
            .map(|(position, job)| (position, job.clone()))
            .collect();
        if jobs.is_empty() {
            writeln!(self.output, "There are no matching jobs")?;
        }
        for (position, job) in &jobs {
            self.show(*position, job)?;
        }
        if let Some((_, job)) = self.store.open() {
            let hours = job.hours_exact(now);
            writeln!(
                self.output,
                "Job running since {} hour(s)!",
                hours_to_string(hours)
            )?;
        }
        Ok(())
    }

    pub fn report(&mut self, filter: Option<String>, tags: Option<String>) -> Result<()> {
        let filter = self.filter(filter.as_deref())?;
        let tags = tags.as_deref().map(split_tags).unwrap_or_default();
        let now = self.parser.now();
        let jobs: Vec<&Job> = self
            .store
            .filter(&filter, &tags, now)
            .into_iter()
            .map(|(_, job)| job)
            .collect();
        let count = jobs.len();
        let days = report::aggregate(jobs, now, self.config.resolution);
        let months = report::months(&days);
        for (&(year, month), total) in &months {
            writeln!(self.output, "\n{month:02}/{year}")?;
            for (&(_, _, day), hours) in days.range((year, month, 1)..=(year, month, 31)) {
                writeln!(self.output, "  {day:2}: {hours:6.2}")?;
            }
            let money = self.money(*total);
            writeln!(self.output, "{} {year}: {total} hrs.{money}", month_name(month))?;
        }
        let all: f64 = months.values().sum();
        let money = self.money(all);
        writeln!(self.output, "\nTotal: {count} jobs, {all} hrs.{money}")?;
        Ok(())
    }

    pub fn tags(&mut self) -> Result<()> {
        let registry = self.store.tags();
        if registry.is_empty() {
            writeln!(self.output, "There are no tags yet")?;
        }
        for tag in registry.iter() {
            writeln!(self.output, "{}", registry.paint(tag))?;
        }
        Ok(())
    }

    fn time(&self, text: Option<&str>) -> Result<TimePoint> {
        match text {
            Some(text) => Ok(self.parser.time(text, false)?),
            None => Ok(self.parser.now()),
        }
    }

    fn filter(&self, text: Option<&str>) -> Result<Filter> {
        match text {
            Some(text) => Ok(Filter::parse(text, &self.parser)?),
            None => Ok(Filter::All),
        }
    }

    /// Ask for an end time until the open job could be finished.
    ///
    /// Returns `None` if the user gave up by entering nothing.
    fn close_open_job(&mut self, question: &str) -> Result<Option<usize>> {
        loop {
            let answer = self.ask(question)?;
            if answer.is_empty() {
                return Ok(None);
            }
            let Some(end) = self.parser.parse_time(&answer, false) else {
                writeln!(self.output, "Please enter a valid time.")?;
                continue;
            };
            match self.store.end_job(end, None) {
                Ok(position) => {
                    writeln!(self.output, "Ending job:")?;
                    self.show_position(position)?;
                    return Ok(Some(position));
                }
                Err(Error::InvalidInterval { .. }) => {
                    writeln!(self.output, "End time is ahead of start time! Please retry.")?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn warn_overlaps(&mut self, overlaps: &[usize]) -> Result<()> {
        if overlaps.is_empty() {
            return Ok(());
        }
        warn!("new job overlaps position(s) {overlaps:?}");
        writeln!(self.output, "Warning: the job overlaps existing job(s):")?;
        for &position in overlaps {
            self.show_position(position)?;
        }
        Ok(())
    }

    fn show_position(&mut self, position: usize) -> Result<()> {
        let job = self.store.get(position)?.clone();
        self.show(position, &job)
    }

    fn show(&mut self, position: usize, job: &Job) -> Result<()> {
        let now = self.parser.now();
        writeln!(self.output, "    Pos: {position}")?;
        writeln!(self.output, "{job}")?;
        if !job.is_open() {
            let hours = job.hours(now, self.config.resolution);
            writeln!(self.output, "  Hours: {hours}")?;
            if let Some(rate) = self.config.rate {
                writeln!(self.output, "  Costs: {:.2}", hours * rate)?;
            }
        }
        if !job.tags.is_empty() {
            let registry = self.store.tags();
            let tags: Vec<String> = job.tags.iter().map(|tag| registry.paint(tag)).collect();
            writeln!(self.output, "   Tags: {}", tags.join(", "))?;
        }
        writeln!(self.output)?;
        Ok(())
    }

    fn money(&self, hours: f64) -> String {
        self.config
            .rate
            .map(|rate| format!(" / ${:.2}", hours * rate))
            .unwrap_or_default()
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .context("Failed to read answer")?;
        Ok(answer.trim().to_string())
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(self.ask(&format!("{question} (y/N)? "))?.eq_ignore_ascii_case("y"))
    }
}

fn hours_to_duration(hours: f64) -> Result<Duration> {
    if !(hours.is_finite() && hours > 0.0) {
        bail!("Duration must be a positive number of hours, got {hours}");
    }
    Duration::try_minutes((hours * 60.0).round() as i64)
        .with_context(|| format!("Duration of {hours} hours is too long"))
}

fn hours_to_string(hours: f64) -> String {
    let minutes = (hours * 60.0).round() as i64;
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

fn month_name(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    month
        .checked_sub(1)
        .and_then(|i| MONTHS.get(i as usize))
        .copied()
        .unwrap_or("???")
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, io::Cursor, path::PathBuf};

    use rstest::rstest;

    use super::{hours_to_string, Session};
    use crate::jobber::{
        config::Config,
        data::JobStore,
        job::Job,
        record::split_tags,
        time::{from_rfc3339, TimeParser},
        Error, Position, TimePoint,
    };

    fn at(s: &str) -> TimePoint {
        from_rfc3339(&format!("2024-03-0{s}:00Z")).unwrap()
    }

    fn config() -> Config {
        Config {
            file: PathBuf::from("jobber.dat"),
            resolution: 0.25,
            rate: Some(10.0),
            verbose: false,
        }
    }

    fn sample() -> JobStore {
        let mut store = JobStore::new();
        let now = at("9T12:00");
        store
            .add_job(at("1T09:00"), at("1T10:00"), "one".into(), BTreeSet::new(), now)
            .unwrap();
        store
            .add_job(at("1T11:00"), at("1T12:30"), "two".into(), BTreeSet::new(), now)
            .unwrap();
        store
    }

    /// Run `f` against a session with the given user input and return the printed text.
    fn run<F>(store: &mut JobStore, input: &str, f: F) -> (anyhow::Result<()>, String)
    where
        F: FnOnce(&mut Session<'_, Cursor<&str>, &mut Vec<u8>>) -> anyhow::Result<()>,
    {
        let config = config();
        let mut output = Vec::new();
        let result = {
            let mut session = Session::new(
                store,
                &config,
                TimeParser::new(at("9T12:00")),
                Cursor::new(input),
                &mut output,
            );
            f(&mut session)
        };
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_start_closes_open_job_first() {
        let mut store = sample();
        store
            .start_job(at("9T08:00"), String::new(), BTreeSet::new(), at("9T12:00"))
            .unwrap();

        let (result, output) = run(&mut store, "soon\n07:00\n10:00\n", |s| {
            s.start(None, Some("next".into()), Some("x".into()))
        });

        result.unwrap();
        assert!(output.contains("Please enter a valid time."));
        assert!(output.contains("End time is ahead of start time!"));
        assert!(output.contains("Starting new job:"));
        assert_eq!(store.get(3).unwrap().end(), Some(at("9T10:00")));
        assert_eq!(store.get(4).unwrap().start(), at("9T12:00"));
        assert!(store.get(4).unwrap().is_open());
    }

    #[test]
    fn test_start_aborted_keeps_open_job() {
        let mut store = sample();
        store
            .start_job(at("9T08:00"), String::new(), BTreeSet::new(), at("9T12:00"))
            .unwrap();

        let (result, _) = run(&mut store, "\n", |s| s.start(None, None, None));

        assert!(result.is_err());
        assert_eq!(store.len(), 3);
        assert!(store.open().is_some());
    }

    #[test]
    fn test_end_without_open_job() {
        let mut store = sample();

        let (result, _) = run(&mut store, "", |s| s.end(None, None));

        let error = result.unwrap_err();
        assert!(matches!(error.downcast_ref::<Error>(), Some(Error::NoOpenJob)));
    }

    #[test]
    fn test_add_with_duration() {
        let mut store = JobStore::new();

        let (result, output) = run(&mut store, "", |s| {
            s.add(Some("2.3.2024,08:00".into()), None, Some(1.5), None, None)
        });

        result.unwrap();
        assert!(output.contains("  Hours: 1.5"));
        assert!(output.contains("  Costs: 15.00"));
        assert_eq!(store.get(1).unwrap().end(), Some(at("2T09:30")));
    }

    #[test]
    fn test_add_duration_back_from_end() {
        let mut store = JobStore::new();

        let (result, _) = run(&mut store, "", |s| {
            s.add(None, Some("10:00".into()), Some(2.0), None, Some("a".into()))
        });

        result.unwrap();
        let job = store.get(1).unwrap();
        assert_eq!(job.start(), at("9T08:00"));
        assert_eq!(job.end(), Some(at("9T10:00")));
    }

    #[rstest]
    #[case::nothing(None, None, None)]
    #[case::only_start(Some("08:00"), None, None)]
    #[case::all_three(Some("08:00"), Some("10:00"), Some(2.0))]
    #[case::negative(Some("08:00"), None, Some(-1.0))]
    fn test_add_rejects(
        #[case] start: Option<&str>,
        #[case] end: Option<&str>,
        #[case] duration: Option<f64>,
    ) {
        let mut store = JobStore::new();

        let (result, _) = run(&mut store, "", |s| {
            s.add(start.map(String::from), end.map(String::from), duration, None, None)
        });

        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[rstest]
    #[case::confirmed("y\n", 1)]
    #[case::declined("n\n", 2)]
    fn test_drop(#[case] input: &str, #[case] remaining: usize) {
        let mut store = sample();

        let (result, _) = run(&mut store, input, |s| s.drop(Position::Last));

        result.unwrap();
        assert_eq!(store.len(), remaining);
    }

    #[test]
    fn test_join_reports_delta() {
        let mut store = sample();

        let (result, output) = run(&mut store, "y\n", |s| s.join(vec![1, 2]));

        result.unwrap();
        assert!(output.contains("This changes the total by +1 hour(s)"));
        assert_eq!(store.len(), 1);
        let merged: &Job = store.get(1).unwrap();
        assert_eq!(merged.message, "one\ntwo");
    }

    #[test]
    fn test_list_last_and_running() {
        let mut store = sample();
        store
            .start_job(at("9T10:30"), String::new(), BTreeSet::new(), at("9T12:00"))
            .unwrap();

        let (result, output) = run(&mut store, "", |s| s.list(Some("1".into()), None));

        result.unwrap();
        assert!(output.contains("    Pos: 3"));
        assert!(!output.contains("    Pos: 1"));
        assert!(output.contains("Job running since 1:30 hour(s)!"));
    }

    #[test]
    fn test_list_invalid_filter() {
        let mut store = sample();

        let (result, _) = run(&mut store, "", |s| s.list(Some("someday".into()), None));

        assert!(result.is_err());
    }

    #[test]
    fn test_report_totals() {
        let mut store = sample();

        let (result, output) = run(&mut store, "", |s| s.report(None, None));

        result.unwrap();
        assert!(output.contains("03/2024"));
        assert!(output.contains("Mar 2024: 2.5 hrs. / $25.00"));
        assert!(output.contains("Total: 2 jobs, 2.5 hrs. / $25.00"));
    }

    #[test]
    fn test_list_by_tag() {
        let mut store = sample();
        store.edit_tags(1, &split_tags("billing")).unwrap();

        let (result, output) = run(&mut store, "", |s| s.list(None, Some("billing".into())));

        result.unwrap();
        assert!(output.contains("    Pos: 1"));
        assert!(!output.contains("    Pos: 2"));
    }

    #[test]
    fn test_report_by_tag() {
        let mut store = sample();
        store.edit_tags(2, &split_tags("billing")).unwrap();

        let (result, output) = run(&mut store, "", |s| s.report(None, Some("billing".into())));

        result.unwrap();
        assert!(output.contains("Total: 1 jobs, 1.5 hrs. / $15.00"));
    }

    #[test]
    fn test_back_reuses_latest_job() {
        let mut store = sample();
        store.edit_tags(2, &split_tags("a,b")).unwrap();

        let (result, output) = run(&mut store, "", |s| {
            s.back(None, None, Some("-a,+c".into()))
        });

        result.unwrap();
        assert!(output.contains("Starting new job:"));
        let job = store.get(3).unwrap();
        assert!(job.is_open());
        assert_eq!(job.message, "two");
        assert_eq!(job.tags, split_tags("b,c"));
    }

    #[test]
    fn test_edit_moves_job() {
        let mut store = sample();

        let (result, output) = run(&mut store, "", |s| {
            s.edit(Position::Index(1), Some("2.3.2024,08:00".into()), Some("2.3.2024,09:00".into()))
        });

        result.unwrap();
        assert!(output.contains("Edited job:"));
        assert_eq!(store.get(2).unwrap().message, "one");
        assert_eq!(store.get(2).unwrap().start(), at("2T08:00"));
    }

    #[test]
    fn test_edit_rejects_empty_interval() {
        let mut store = sample();

        let (result, _) = run(&mut store, "", |s| {
            s.edit(Position::Last, Some("1.3.2024,13:00".into()), None)
        });

        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_tag_and_message() {
        let mut store = sample();

        let (result, output) = run(&mut store, "", |s| {
            s.tag(Position::Index(1), "+billing".into())?;
            s.message(Position::Index(1), "first\\nsecond".into())
        });

        result.unwrap();
        assert!(output.contains("billing"));
        let job = store.get(1).unwrap();
        assert!(job.tags.contains("billing"));
        assert_eq!(job.message, "first\nsecond");
        assert!(store.is_modified());
    }

    #[rstest]
    #[case(0.0, "0:00")]
    #[case(1.5, "1:30")]
    #[case(2.26, "2:16")]
    fn test_hours_to_string(#[case] hours: f64, #[case] expected: &str) {
        assert_eq!(hours_to_string(hours), expected);
    }
}
