use thiserror::Error;

use crate::jobber::{record::RecordError, TimePoint};

/// Errors of the job model, the record codec and the job store.
#[derive(Error, Debug)]
pub enum Error {
    #[error("can not read '{0}' as a time")]
    ParseFailure(String),

    #[error("end {end} is not after start {start}")]
    InvalidInterval { start: TimePoint, end: TimePoint },

    #[error("there is no open job")]
    NoOpenJob,

    #[error("there still is an open job at position {0}")]
    OpenJobExists(usize),

    #[error("an open job can not start before the latest job (started {0})")]
    OpenJobNotLatest(TimePoint),

    #[error("line {line} of the job file is corrupt: {source}")]
    Decode {
        line: usize,
        #[source]
        source: RecordError,
    },

    #[error("no job at position {0}")]
    InvalidPosition(usize),

    #[error("joining needs at least two different positions, got {0}")]
    TooFewPositions(usize),

    #[error("job at position {0} is still running and can not be joined")]
    JoinOpenJob(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
