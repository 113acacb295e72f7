use std::fmt;
use std::time::{Duration, Instant};

use harvester_core::{SetupError, SplitError, TokenLifetime};

/// Bearer credential set issued by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Duration,
    pub refresh_expires_in: Duration,
    pub issued_at: Instant,
}

impl Token {
    pub fn lifetime(&self) -> TokenLifetime {
        TokenLifetime::new(self.expires_in, self.refresh_expires_in)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish_non_exhaustive()
    }
}

/// Raw outcome of one GET: any status, full body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportFailure,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportFailure::Cancelled
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    InvalidUrl,
    Timeout,
    Network,
    Cancelled,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::InvalidUrl => write!(f, "invalid url"),
            TransportFailure::Timeout => write!(f, "timeout"),
            TransportFailure::Network => write!(f, "network error"),
            TransportFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure to turn one page URL into a list of items.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PageError {
    #[error("request error: {0}")]
    Transport(TransportError),
    #[error("not authorized (http status {0})")]
    Unauthorized(u16),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("parsing resp error: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("identity provider unreachable: {0}")]
    Network(String),
    #[error("identity provider rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed token response: {0}")]
    Decode(String),
    #[error("authentication cancelled")]
    Cancelled,
}

/// Errors raised before any job is enqueued.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("cannot split date range: {0}")]
    Split(#[from] SplitError),
}

/// Finalized result of one harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Row file name derived from the harvested query.
    pub output_filename: String,
    /// Unique item keys, ascending.
    pub items: Vec<String>,
    pub jobs_enqueued: usize,
    pub pages_fetched: u64,
    pub lineages_completed: u64,
    pub lineages_abandoned: u64,
    pub cancelled: bool,
}

impl HarvestReport {
    /// The items as single-column rows.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.items.iter().map(|item| vec![item.clone()]).collect()
    }
}
