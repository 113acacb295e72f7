use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::split::is_date_filtered;
use crate::{OffsetPagination, PaginationError};

static FILENAME_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\.,\ /:]").expect("static regex"));

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("invalid query url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("unsupported source type passed '{0}'")]
    UnsupportedSource(String),
    #[error("unsupported pagination: {reason} in '{url}'")]
    UnsupportedPagination { url: String, reason: String },
    #[error("invalid pagination cursor: {0}")]
    Pagination(#[from] PaginationError),
}

/// How successive pages of one lineage are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationScheme {
    Offset(OffsetPagination),
}

impl PaginationScheme {
    pub fn next(&self, url: &str, items_returned: usize) -> Result<String, PaginationError> {
        match self {
            PaginationScheme::Offset(offset) => offset.next(url, items_returned),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    OData { pagination: PaginationScheme },
}

/// A validated top-level query, ready to be split into jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    raw: String,
    url: String,
    kind: SourceKind,
}

impl SourceQuery {
    /// Encode literal spaces, then classify the source and its pagination scheme.
    pub fn parse(raw: &str) -> Result<Self, SetupError> {
        let raw = raw.trim();
        let url = raw.replace(' ', "%20");
        Url::parse(&url).map_err(|err| SetupError::InvalidUrl {
            url: url.clone(),
            message: err.to_string(),
        })?;

        if !url.contains("$filter") {
            return Err(SetupError::UnsupportedSource(raw.to_string()));
        }
        let pagination = detect_pagination(&url)?;

        Ok(Self {
            raw: raw.to_string(),
            url,
            kind: SourceKind::OData { pagination },
        })
    }

    /// The query with spaces encoded as `%20`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pagination(&self) -> PaginationScheme {
        match self.kind {
            SourceKind::OData { pagination } => pagination,
        }
    }

    pub fn is_date_filtered(&self) -> bool {
        is_date_filtered(&self.url)
    }

    /// File name for this query's result rows: the raw query with `. , space / :` replaced by `_`.
    pub fn output_filename(&self) -> String {
        format!("{}.csv", FILENAME_UNSAFE.replace_all(&self.raw, "_"))
    }
}

fn detect_pagination(url: &str) -> Result<PaginationScheme, SetupError> {
    if url.contains("$skiptoken") {
        return Err(SetupError::UnsupportedPagination {
            url: url.to_string(),
            reason: "$skiptoken continuation".to_string(),
        });
    }
    if !url.contains("$skip") {
        return Err(SetupError::UnsupportedPagination {
            url: url.to_string(),
            reason: "can not match pagination method".to_string(),
        });
    }
    let offset = OffsetPagination;
    offset.offset(url)?;
    Ok(PaginationScheme::Offset(offset))
}
