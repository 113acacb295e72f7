use chrono::{DateTime, TimeDelta, Utc};
use harvester_core::{
    split_by_date, PaginationError, PaginationScheme, SetupError, SourceQuery, SplitError,
};
use pretty_assertions::assert_eq;

fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}

fn assert_tiles(jobs: &[harvester_core::DateRangeJob], from: DateTime<Utc>, to: DateTime<Utc>) {
    assert_eq!(jobs.first().unwrap().start, from);
    assert_eq!(jobs.last().unwrap().end, to);
    for pair in jobs.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap or overlap between windows");
        assert!(pair[0].start < pair[0].end);
    }
}

#[test]
fn spaces_are_encoded_and_offset_pagination_detected() {
    let query = SourceQuery::parse(
        "https://api.example.com/odata/Items?$filter=kind eq 'a'&$skip=0&$top=500",
    )
    .unwrap();

    assert_eq!(
        query.url(),
        "https://api.example.com/odata/Items?$filter=kind%20eq%20'a'&$skip=0&$top=500"
    );
    assert!(matches!(query.pagination(), PaginationScheme::Offset(_)));
    assert!(!query.is_date_filtered());
    assert_eq!(
        query.pagination().next(query.url(), 500).unwrap(),
        "https://api.example.com/odata/Items?$filter=kind%20eq%20'a'&$skip=500&$top=500"
    );
}

#[test]
fn query_without_filter_is_an_unsupported_source() {
    let err = SourceQuery::parse("https://api.example.com/items?$skip=0").unwrap_err();
    assert_eq!(
        err,
        SetupError::UnsupportedSource("https://api.example.com/items?$skip=0".to_string())
    );
}

#[test]
fn skiptoken_pagination_fails_fast() {
    let err =
        SourceQuery::parse("https://api.example.com/items?$filter=a&$skiptoken=xyz").unwrap_err();
    assert!(matches!(err, SetupError::UnsupportedPagination { .. }));
    assert!(err.to_string().contains("$skiptoken"));
}

#[test]
fn missing_skip_is_unsupported_pagination() {
    let err = SourceQuery::parse("https://api.example.com/items?$filter=a&$top=10").unwrap_err();
    assert!(matches!(err, SetupError::UnsupportedPagination { .. }));
}

#[test]
fn non_numeric_skip_is_rejected_at_setup() {
    let err = SourceQuery::parse("https://api.example.com/items?$filter=a&$skip=abc").unwrap_err();
    assert_eq!(
        err,
        SetupError::Pagination(PaginationError::InvalidSkip("abc".to_string()))
    );
}

#[test]
fn malformed_url_is_rejected() {
    let err = SourceQuery::parse("not a url $filter $skip=0").unwrap_err();
    assert!(matches!(err, SetupError::InvalidUrl { .. }));
}

#[test]
fn output_filename_replaces_separators() {
    let query = SourceQuery::parse("https://a.example.com/x?$filter=a&$skip=0").unwrap();
    assert_eq!(
        query.output_filename(),
        "https___a_example_com_x?$filter=a&$skip=0.csv"
    );
}

#[test]
fn three_and_a_half_minutes_split_into_four_jobs() {
    let url = "https://api.example.com/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-03-01T10:03:30Z&$skip=0";
    let query = SourceQuery::parse(url).unwrap();
    assert!(query.is_date_filtered());

    let jobs = split_by_date(query.url(), TimeDelta::minutes(1), Utc::now()).unwrap();

    assert_eq!(jobs.len(), 4);
    assert_tiles(
        &jobs,
        ts("2024-03-01T10:00:00Z"),
        ts("2024-03-01T10:03:30Z"),
    );
    assert_eq!(
        jobs[0].url,
        "https://api.example.com/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-03-01T10:01:00.000Z&$skip=0"
    );
    assert_eq!(
        jobs[3].url,
        "https://api.example.com/items?$filter=date%20ge%202024-03-01T10:03:00.000Z%20and%20date%20lt%202024-03-01T10:03:30Z&$skip=0"
    );
}

#[test]
fn sub_millisecond_lower_bound_is_not_truncated() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00.1234567Z%20and%20date%20lt%202024-03-01T10:02:30Z&$skip=0";
    let from = ts("2024-03-01T10:00:00.1234567Z");
    let to = ts("2024-03-01T10:02:30Z");

    let jobs = split_by_date(url, TimeDelta::minutes(1), Utc::now()).unwrap();

    assert_eq!(jobs.len(), 3);
    assert_tiles(&jobs, from, to);
    assert_eq!(
        jobs[0].url,
        "https://h/items?$filter=date%20ge%202024-03-01T10:00:00.1234567Z%20and%20date%20lt%202024-03-01T10:01:00.123456700Z&$skip=0"
    );
    assert_eq!(
        jobs[1].url,
        "https://h/items?$filter=date%20ge%202024-03-01T10:01:00.123456700Z%20and%20date%20lt%202024-03-01T10:02:00.123456700Z&$skip=0"
    );
    assert_eq!(
        jobs[2].url,
        "https://h/items?$filter=date%20ge%202024-03-01T10:02:00.123456700Z%20and%20date%20lt%202024-03-01T10:02:30Z&$skip=0"
    );
    for job in &jobs {
        let lower = job.url.split("ge%20").nth(1).unwrap().split("%20").next().unwrap();
        assert_eq!(ts(lower), job.start, "lower bound in url differs from window start");
    }
}

#[test]
fn exact_multiple_of_window_has_no_empty_tail() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-03-01T10:03:00Z&$skip=0";
    let jobs = split_by_date(url, TimeDelta::minutes(1), Utc::now()).unwrap();

    assert_eq!(jobs.len(), 3);
    assert_tiles(&jobs, ts("2024-03-01T10:00:00Z"), ts("2024-03-01T10:03:00Z"));
    assert!(jobs[2].url.contains("date%20lt%202024-03-01T10:03:00Z"));
}

#[test]
fn sub_second_upper_bound_is_kept_verbatim() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-03-01T10:01:15.123456Z&$skip=0";
    let jobs = split_by_date(url, TimeDelta::minutes(1), Utc::now()).unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].end, ts("2024-03-01T10:01:15.123456Z"));
    assert!(jobs[1].url.contains("date%20lt%202024-03-01T10:01:15.123456Z"));
}

#[test]
fn range_shorter_than_window_is_a_single_unchanged_job() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-03-01T10:00:20Z&$skip=0";
    let jobs = split_by_date(url, TimeDelta::minutes(1), Utc::now()).unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].url, url);
}

#[test]
fn missing_upper_bound_defaults_to_now_and_leaves_the_tail_open() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z&$skip=0";
    let now = ts("2024-03-01T10:02:10Z");
    let jobs = split_by_date(url, TimeDelta::minutes(1), now).unwrap();

    assert_eq!(jobs.len(), 3);
    assert_tiles(&jobs, ts("2024-03-01T10:00:00Z"), now);
    assert_eq!(
        jobs[0].url,
        "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-03-01T10:01:00.000Z&$skip=0"
    );
    assert_eq!(
        jobs[2].url,
        "https://h/items?$filter=date%20ge%202024-03-01T10:02:00.000Z&$skip=0"
    );
}

#[test]
fn unparsable_upper_bound_defaults_to_now() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z%20and%20date%20lt%202024-13-45T99:00:00Z&$skip=0";
    let now = ts("2024-03-01T10:01:30Z");
    let jobs = split_by_date(url, TimeDelta::minutes(1), now).unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].end, now);
}

#[test]
fn missing_lower_bound_is_an_error() {
    let err = split_by_date("https://h/items?$filter=a&$skip=0", TimeDelta::minutes(1), Utc::now())
        .unwrap_err();
    assert_eq!(err, SplitError::MissingFrom);
}

#[test]
fn non_positive_window_is_rejected() {
    let url = "https://h/items?$filter=date%20ge%202024-03-01T10:00:00Z&$skip=0";
    let err = split_by_date(url, TimeDelta::zero(), Utc::now()).unwrap_err();
    assert!(matches!(err, SplitError::InvalidWindow(_)));
}
