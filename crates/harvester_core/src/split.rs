use std::ops::Range;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use regex::Regex;

const FROM_MARKER: &str = "date%20ge%20";

static FROM_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"date%20ge%20(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}[^Z]*Z)").expect("static regex")
});
static TO_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"date%20lt%20(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}[^Z]*Z)").expect("static regex")
});

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("query has no `date ge` predicate")]
    MissingFrom,
    #[error("`date ge` value is not an RFC 3339 timestamp: {0}")]
    InvalidFrom(String),
    #[error("split window must be positive, got {0}")]
    InvalidWindow(TimeDelta),
}

/// One sub-query covering `[start, end)`; the last one of a split covers `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeJob {
    pub url: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// True when the (space-encoded) url carries a `date ge` predicate.
pub fn is_date_filtered(url: &str) -> bool {
    url.contains(FROM_MARKER)
}

/// Decompose a date-filtered query into consecutive `window`-sized sub-queries.
///
/// Full windows are emitted while `start + window < TO`; the final job keeps
/// the original `date lt` text, so its upper bound is TO exactly, and the
/// first job keeps the original `date ge` text. A missing or
/// unparsable TO is taken as `now`; when TO is missing the final job stays
/// open-ended.
pub fn split_by_date(
    url: &str,
    window: TimeDelta,
    now: DateTime<Utc>,
) -> Result<Vec<DateRangeJob>, SplitError> {
    if window <= TimeDelta::zero() {
        return Err(SplitError::InvalidWindow(window));
    }

    let from_match = FROM_PREDICATE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .ok_or(SplitError::MissingFrom)?;
    let from = parse_timestamp(from_match.as_str())
        .ok_or_else(|| SplitError::InvalidFrom(from_match.as_str().to_string()))?;
    let from_range = from_match.range();

    let to_range = TO_PREDICATE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range());
    let to = to_range
        .clone()
        .and_then(|range| parse_timestamp(&url[range]))
        .unwrap_or(now);

    let mut jobs = Vec::new();
    let mut start = from;
    while start + window < to {
        let end = start + window;
        let upper = match to_range.clone() {
            Some(range) => (range, format_timestamp(end)),
            None => (
                from_range.end..from_range.end,
                format!("%20and%20date%20lt%20{}", format_timestamp(end)),
            ),
        };
        let mut edits = vec![upper];
        if start != from {
            edits.push((from_range.clone(), format_timestamp(start)));
        }
        jobs.push(DateRangeJob {
            url: replace_ranges(url, edits),
            start,
            end,
        });
        start = end;
    }

    let last_url = if jobs.is_empty() {
        url.to_string()
    } else {
        replace_ranges(url, vec![(from_range, format_timestamp(start))])
    };
    jobs.push(DateRangeJob {
        url: last_url,
        start,
        end: to,
    });

    Ok(jobs)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Millisecond precision unless the instant carries finer digits.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    let precision = if ts.timestamp_subsec_nanos() % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else {
        SecondsFormat::Nanos
    };
    ts.to_rfc3339_opts(precision, true)
}

fn replace_ranges(url: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(url.len() + 32);
    let mut cursor = 0;
    for (range, text) in edits {
        out.push_str(&url[cursor..range.start]);
        out.push_str(&text);
        cursor = range.end;
    }
    out.push_str(&url[cursor..]);
    out
}
