//! One job per line: `"<start>";"<end or 0>";"<message>";"<tags>"`.
//!
//! Newlines in the message are written as the two characters `\n`. Nothing
//! else is escaped. Fields are separated by the three characters `";"`, so a
//! plain `;` in a message is fine but a message containing `";"` does not
//! survive a round trip.

use std::collections::BTreeSet;

use chrono::SecondsFormat;
use thiserror::Error;

use crate::jobber::{job::Job, time::from_rfc3339, TimePoint};

/// Why a single line could not be decoded.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("expected 3 or 4 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("end {end} is not after start {start}")]
    Interval { start: TimePoint, end: TimePoint },
}

const OPEN_END: &str = "0";
const DELIMITER: &str = "\";\"";

/// Serialize a job into one line (without line break).
pub fn encode(job: &Job) -> String {
    let end = job
        .end()
        .map(timestamp)
        .unwrap_or_else(|| OPEN_END.to_string());
    let tags = job.tags.iter().map(String::as_str).collect::<Vec<_>>().join(",");
    let fields = [
        timestamp(job.start()),
        end,
        job.message.replace('\n', "\\n"),
        tags,
    ];
    format!("\"{}\"", fields.join(DELIMITER))
}

/// Deserialize one line. Lines with only three fields carry no tags.
pub fn decode(line: &str) -> Result<Job, RecordError> {
    let fields: Vec<&str> = unquote(line.trim_end()).split(DELIMITER).collect();
    if !(3..=4).contains(&fields.len()) {
        return Err(RecordError::FieldCount(fields.len()));
    }
    let start = parse_timestamp(fields[0])?;
    let message = fields[2].replace("\\n", "\n");
    let tags = fields.get(3).map(|tags| split_tags(tags)).unwrap_or_default();
    if fields[1] == OPEN_END {
        return Ok(Job::open(start, message, tags));
    }
    let end = parse_timestamp(fields[1])?;
    Job::finished(start, end, message, tags).map_err(|_| RecordError::Interval { start, end })
}

/// Comma separated tag list; empty names are dropped.
pub fn split_tags(tags: &str) -> BTreeSet<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn timestamp(t: TimePoint) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn parse_timestamp(value: &str) -> Result<TimePoint, RecordError> {
    from_rfc3339(value).map_err(|source| RecordError::Timestamp {
        value: value.to_string(),
        source,
    })
}

fn unquote(field: &str) -> &str {
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}
