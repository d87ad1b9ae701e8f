use std::{collections::BTreeSet, fs, io, path::Path};

use log::{debug, info};

use crate::jobber::{
    error::Result,
    job::Job,
    record,
    tags::{self, TagRegistry},
    time::{Parsed, TimeParser},
    Error, Position, TimePoint, TimeRange,
};

/// Jobs in start order, as read from and written back to the job file.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Vec<Job>,
    modified: bool,
}

/// Which jobs a listing or report covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    All,
    /// Jobs overlapping the range.
    Range(TimeRange),
    /// Jobs starting at or after the instant.
    Since(TimePoint),
    /// The last N jobs.
    Last(usize),
}

/// A prepared join, shown to the user before it is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    /// Sorted, distinct 1-based positions.
    pub positions: Vec<usize>,
    pub merged: Job,
    /// Merged hours minus the sum of the single jobs' hours.
    pub delta: f64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty store.
    pub fn read(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let store = Self::decode(&text)?;
                info!("read {} job(s) from {}", store.len(), path.display());
                Ok(store)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no job file at {}, starting empty", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decode every line; the first corrupt line fails the whole load.
    pub fn decode(text: &str) -> Result<Self> {
        let mut jobs = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                record::decode(line).map_err(|source| Error::Decode {
                    line: n + 1,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by_key(Job::start);
        Ok(Self {
            jobs,
            modified: false,
        })
    }

    /// All jobs sorted by start, one record per line.
    pub fn encode(&self) -> String {
        let mut jobs: Vec<&Job> = self.jobs.iter().collect();
        jobs.sort_by_key(|job| job.start());
        jobs.iter()
            .map(|job| record::encode(job) + "\n")
            .collect()
    }

    /// Rewrite `path` if anything changed. Returns whether the file was written.
    pub fn write(&mut self, path: &Path) -> Result<bool> {
        if !self.modified {
            debug!("no changes, leaving {} untouched", path.display());
            return Ok(false);
        }
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.encode())?;
        self.modified = false;
        info!("wrote {} job(s) to {}", self.len(), path.display());
        Ok(true)
    }

    #[cfg(test)]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job at a 1-based position.
    pub fn get(&self, position: usize) -> Result<&Job> {
        position
            .checked_sub(1)
            .and_then(|i| self.jobs.get(i))
            .ok_or(Error::InvalidPosition(position))
    }

    /// Resolve `last` and check bounds.
    pub fn position(&self, position: Position) -> Result<usize> {
        let position = match position {
            Position::Last => self.len(),
            Position::Index(position) => position,
        };
        self.get(position).map(|_| position)
    }

    /// Position and job that is still running, if any.
    pub fn open(&self) -> Option<(usize, &Job)> {
        self.jobs
            .iter()
            .enumerate()
            .find(|(_, job)| job.is_open())
            .map(|(i, job)| (i + 1, job))
    }

    /// Positions of jobs running at instant `t`.
    pub fn overlapping(&self, t: TimePoint, now: TimePoint) -> Vec<usize> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.intersect(t, now).is_some())
            .map(|(i, _)| i + 1)
            .collect()
    }

    pub fn tags(&self) -> TagRegistry {
        TagRegistry::collect(&self.jobs)
    }

    /// Insert a job at its start-sorted position and return that position.
    fn insert(&mut self, job: Job) -> usize {
        let i = self.jobs.partition_point(|other| other.start() <= job.start());
        self.jobs.insert(i, job);
        self.modified = true;
        i + 1
    }

    /// Open a new job at `t`.
    ///
    /// Returns its position and the positions of jobs already covering `t`,
    /// which are worth a warning but do not prevent the start.
    pub fn start_job(
        &mut self,
        t: TimePoint,
        message: String,
        tags: BTreeSet<String>,
        now: TimePoint,
    ) -> Result<(usize, Vec<usize>)> {
        if let Some((position, _)) = self.open() {
            return Err(Error::OpenJobExists(position));
        }
        if let Some(latest) = self.jobs.last().map(Job::start).filter(|&latest| t < latest) {
            return Err(Error::OpenJobNotLatest(latest));
        }
        let overlaps = self.overlapping(t, now);
        let position = self.insert(Job::open(t, message, tags));
        Ok((position, overlaps))
    }

    /// Record a finished job in one step.
    pub fn add_job(
        &mut self,
        start: TimePoint,
        end: TimePoint,
        message: String,
        tags: BTreeSet<String>,
        now: TimePoint,
    ) -> Result<(usize, Vec<usize>)> {
        let job = Job::finished(start, end, message, tags)?;
        let overlaps = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, other)| job.intersect(*other, now).is_some())
            .map(|(i, _)| i + 1)
            .collect();
        if let Some((_, open)) = self.open() {
            if start > open.start() {
                return Err(Error::OpenJobNotLatest(open.start()));
            }
        }
        let position = self.insert(job);
        Ok((position, overlaps))
    }

    /// Finish the running job at `t`. An empty message is filled from `message`.
    pub fn end_job(&mut self, t: TimePoint, message: Option<&str>) -> Result<usize> {
        let position = self.open().map(|(p, _)| p).ok_or(Error::NoOpenJob)?;
        let job = &mut self.jobs[position - 1];
        job.set_end(t)?;
        if let Some(message) = message.filter(|_| job.message.is_empty()) {
            job.message = message.to_string();
        }
        self.modified = true;
        Ok(position)
    }

    /// Throw away the running job.
    pub fn cancel_open_job(&mut self) -> Result<Job> {
        let position = self.open().map(|(p, _)| p).ok_or(Error::NoOpenJob)?;
        self.modified = true;
        Ok(self.jobs.remove(position - 1))
    }

    /// Remove the job at a 1-based position.
    pub fn drop_job(&mut self, position: usize) -> Result<Job> {
        self.get(position)?;
        self.modified = true;
        Ok(self.jobs.remove(position - 1))
    }

    /// Replace the message of the job at `position`.
    pub fn set_message(&mut self, position: usize, message: String) -> Result<()> {
        self.get(position)?;
        self.jobs[position - 1].message = message;
        self.modified = true;
        Ok(())
    }

    /// Edit the tags of the job at `position`, see [`tags::modify`].
    pub fn edit_tags(&mut self, position: usize, edit: &BTreeSet<String>) -> Result<()> {
        self.get(position)?;
        let job = &mut self.jobs[position - 1];
        job.tags = tags::modify(&job.tags, edit);
        self.modified = true;
        Ok(())
    }

    /// Move start and/or end of the job at `position`.
    ///
    /// Both values are checked together, so a job may be moved past its old
    /// bounds in one step. Returns the position after re-sorting.
    pub fn edit_times(
        &mut self,
        position: usize,
        start: Option<TimePoint>,
        end: Option<TimePoint>,
    ) -> Result<usize> {
        let mut job = self.get(position)?.clone();
        match (start, end) {
            (None, None) => return Ok(position),
            (Some(start), None) => job.set_start(start)?,
            (None, Some(end)) => job.set_end(end)?,
            (Some(start), Some(end)) => {
                if !Job::check(start, end) {
                    return Err(Error::InvalidInterval { start, end });
                }
                if end > job.start() {
                    job.set_end(end)?;
                    job.set_start(start)?;
                } else {
                    job.set_start(start)?;
                    job.set_end(end)?;
                }
            }
        }
        if job.is_open() {
            let latest = self
                .jobs
                .iter()
                .enumerate()
                .filter(|&(i, _)| i + 1 != position)
                .map(|(_, other)| other.start())
                .max();
            if let Some(latest) = latest.filter(|&latest| job.start() < latest) {
                return Err(Error::OpenJobNotLatest(latest));
            }
        }
        self.jobs.remove(position - 1);
        Ok(self.insert(job))
    }

    /// Message and tags for a job that continues the latest one.
    ///
    /// A given message wins over the latest job's. Given tags edit the latest
    /// job's tags, see [`tags::modify`].
    pub fn continued(
        &self,
        message: Option<String>,
        edit: Option<&BTreeSet<String>>,
    ) -> (String, BTreeSet<String>) {
        let Some(last) = self.jobs.last() else {
            return (
                message.unwrap_or_default(),
                edit.cloned().unwrap_or_default(),
            );
        };
        let tags = match edit {
            Some(edit) => tags::modify(&last.tags, edit),
            None => last.tags.clone(),
        };
        (message.unwrap_or_else(|| last.message.clone()), tags)
    }

    /// Merge the jobs at `positions` into one spanning all of them.
    ///
    /// Nothing changes until the returned [`Join`] is passed to [`JobStore::join`].
    pub fn plan_join(&self, positions: &[usize], now: TimePoint, resolution: f64) -> Result<Join> {
        let positions: Vec<usize> = positions
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if positions.len() < 2 {
            return Err(Error::TooFewPositions(positions.len()));
        }
        let mut jobs = Vec::with_capacity(positions.len());
        for &position in &positions {
            let job = self.get(position)?;
            if job.is_open() {
                return Err(Error::JoinOpenJob(position));
            }
            jobs.push(job);
        }
        let start = jobs.iter().map(|job| job.start()).min();
        let end = jobs.iter().filter_map(|job| job.end()).max();
        let (Some(start), Some(end)) = (start, end) else {
            return Err(Error::TooFewPositions(positions.len()));
        };
        let message = jobs
            .iter()
            .map(|job| job.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let tags = jobs.iter().flat_map(|job| job.tags.iter().cloned()).collect();
        let merged = Job::finished(start, end, message, tags)?;
        let before: f64 = jobs.iter().map(|job| job.hours(now, resolution)).sum();
        let delta = merged.hours(now, resolution) - before;
        debug!("join {positions:?}: {before} h -> {} h", before + delta);
        Ok(Join {
            positions,
            merged,
            delta,
        })
    }

    /// Apply a planned join. The merged job takes the lowest position.
    pub fn join(&mut self, join: Join) -> Result<usize> {
        for &position in &join.positions {
            self.get(position)?;
        }
        let Some(&first) = join.positions.first() else {
            return Err(Error::TooFewPositions(0));
        };
        let mut merged = Some(join.merged);
        let jobs: Vec<Job> = self
            .jobs
            .drain(..)
            .enumerate()
            .filter_map(|(i, job)| match i + 1 {
                position if position == first => merged.take(),
                position if join.positions.contains(&position) => None,
                _ => Some(job),
            })
            .collect();
        self.jobs = jobs;
        self.modified = true;
        Ok(first)
    }

    /// Positions and jobs matching a filter and carrying all of `tags`, in
    /// position order. `Last(n)` counts only jobs with matching tags.
    pub fn filter(
        &self,
        filter: &Filter,
        tags: &BTreeSet<String>,
        now: TimePoint,
    ) -> Vec<(usize, &Job)> {
        let indexed = self
            .jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (i + 1, job))
            .filter(|(_, job)| tags.is_subset(&job.tags));
        match *filter {
            Filter::All => indexed.collect(),
            Filter::Range(range) => indexed
                .filter(|(_, job)| job.interval(now).intersect(&range).is_some())
                .collect(),
            Filter::Since(t) => indexed.filter(|(_, job)| job.start() >= t).collect(),
            Filter::Last(n) => {
                let matching: Vec<_> = indexed.collect();
                let skip = matching.len().saturating_sub(n);
                matching.into_iter().skip(skip).collect()
            }
        }
    }
}

impl Filter {
    /// Read a filter: a range first, then an instant, then a job count (`N` or `-N`).
    pub fn parse(text: &str, parser: &TimeParser) -> Result<Self> {
        match parser.parse_expression(text) {
            Parsed::Range(range) => Ok(Filter::Range(range)),
            Parsed::Point(t) => Ok(Filter::Since(t)),
            Parsed::Invalid => {
                let count = text.trim();
                count
                    .strip_prefix('-')
                    .unwrap_or(count)
                    .parse()
                    .map(Filter::Last)
                    .map_err(|_| Error::ParseFailure(text.to_string()))
            }
        }
    }
}
