use std::ops::Range;

const SKIP_PARAM: &str = "$skip=";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("url has no $skip parameter: {0}")]
    MissingSkip(String),
    #[error("$skip value is not a non-negative integer: {0:?}")]
    InvalidSkip(String),
}

/// Offset pagination over the OData `$skip` query option.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPagination;

impl OffsetPagination {
    /// Current `$skip` value of `url`.
    pub fn offset(&self, url: &str) -> Result<u64, PaginationError> {
        let range =
            skip_value_range(url).ok_or_else(|| PaginationError::MissingSkip(url.to_string()))?;
        let raw = &url[range];
        raw.parse::<u64>()
            .map_err(|_| PaginationError::InvalidSkip(raw.to_string()))
    }

    /// URL of the page after one that returned `items_returned` items.
    ///
    /// Only the `$skip` value changes; every other byte of the url is kept.
    pub fn next(&self, url: &str, items_returned: usize) -> Result<String, PaginationError> {
        let range =
            skip_value_range(url).ok_or_else(|| PaginationError::MissingSkip(url.to_string()))?;
        let raw = &url[range.clone()];
        let skip = raw
            .parse::<u64>()
            .map_err(|_| PaginationError::InvalidSkip(raw.to_string()))?;
        let next = skip.saturating_add(items_returned as u64);

        let mut out = String::with_capacity(url.len() + 4);
        out.push_str(&url[..range.start]);
        out.push_str(&next.to_string());
        out.push_str(&url[range.end..]);
        Ok(out)
    }
}

/// Byte range of the `$skip` value inside the query string of `url`.
fn skip_value_range(url: &str) -> Option<Range<usize>> {
    let query_start = url.find('?')? + 1;
    let query_end = url[query_start..]
        .find('#')
        .map_or(url.len(), |idx| query_start + idx);

    let mut offset = query_start;
    for pair in url[query_start..query_end].split('&') {
        if let Some(value) = pair.strip_prefix(SKIP_PARAM) {
            let start = offset + SKIP_PARAM.len();
            return Some(start..start + value.len());
        }
        offset += pair.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn advances_skip_by_items_returned() {
        let url = "https://api.example.com/items?$filter=x%20eq%201&$skip=0&$top=100";
        let next = OffsetPagination.next(url, 100).unwrap();
        assert_eq!(
            next,
            "https://api.example.com/items?$filter=x%20eq%201&$skip=100&$top=100"
        );
        assert_eq!(OffsetPagination.offset(&next).unwrap(), 100);
    }

    #[test]
    fn skip_as_last_parameter() {
        let url = "https://api.example.com/items?$filter=a&$skip=250";
        assert_eq!(
            OffsetPagination.next(url, 7).unwrap(),
            "https://api.example.com/items?$filter=a&$skip=257"
        );
    }

    #[test]
    fn zero_items_leaves_url_unchanged() {
        let url = "https://api.example.com/items?$skip=40&$filter=a";
        assert_eq!(OffsetPagination.next(url, 0).unwrap(), url);
    }

    #[test]
    fn skiptoken_is_not_mistaken_for_skip() {
        let url = "https://api.example.com/items?$skiptoken=abc&$filter=a";
        assert_eq!(
            OffsetPagination.next(url, 1),
            Err(PaginationError::MissingSkip(url.to_string()))
        );
    }

    #[test]
    fn non_numeric_skip_is_rejected() {
        let url = "https://api.example.com/items?$filter=a&$skip=ten";
        assert_eq!(
            OffsetPagination.next(url, 1),
            Err(PaginationError::InvalidSkip("ten".to_string()))
        );
    }

    #[test]
    fn missing_query_is_rejected() {
        let url = "https://api.example.com/items";
        assert!(matches!(
            OffsetPagination.offset(url),
            Err(PaginationError::MissingSkip(_))
        ));
    }
}
