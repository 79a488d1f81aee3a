//! Error types for the exodus edge handlers

use std::fmt;
use thiserror::Error;

/// Result type alias for edge operations
pub type Result<T> = std::result::Result<T, EdgeError>;

/// A failed query against one region of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFailure {
    pub region: String,
    pub message: String,
}

/// A table query which failed in every configured region.
///
/// Failures are kept in the order the regions were attempted, so no
/// per-region error detail is lost when failover is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    pub table: String,
    pub failures: Vec<RegionFailure>,
}

impl LookupError {
    pub fn new(table: impl Into<String>) -> Self {
        LookupError {
            table: table.into(),
            failures: Vec::new(),
        }
    }

    /// Record the failure of one more region
    pub fn push(&mut self, region: impl Into<String>, message: impl Into<String>) {
        self.failures.push(RegionFailure {
            region: region.into(),
            message: message.into(),
        });
    }

    /// The most recent failure, i.e. the one which ended the failover
    pub fn last(&self) -> Option<&RegionFailure> {
        self.failures.last()
    }

    /// Regions attempted, in order
    pub fn regions(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.region.as_str()).collect()
    }

    /// Walk the failures from the last attempted region back to the first.
    ///
    /// Each element is the cause of the one before it.
    pub fn cause_chain(&self) -> impl Iterator<Item = &RegionFailure> {
        self.failures.iter().rev()
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            Some(last) => {
                write!(
                    f,
                    "query for table {} failed in region {}: {}",
                    self.table, last.region, last.message
                )?;
                for cause in self.cause_chain().skip(1) {
                    write!(f, "; caused by region {}: {}", cause.region, cause.message)?;
                }
                Ok(())
            }
            None => write!(f, "query for table {} was not attempted in any region", self.table),
        }
    }
}

impl std::error::Error for LookupError {}

/// Error types that can occur while handling an edge event
#[derive(Error, Debug, Clone)]
pub enum EdgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Malformed item for URI {uri}: {detail}")]
    MalformedItem { uri: String, detail: String },

    #[error("Definitions error: {0}")]
    Definitions(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for EdgeError {
    fn from(err: std::io::Error) -> Self {
        EdgeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(err: serde_json::Error) -> Self {
        EdgeError::Serialization(err.to_string())
    }
}

impl EdgeError {
    /// Whether the error was caused by client input rather than by the
    /// edge itself or its collaborators
    pub fn is_client_error(&self) -> bool {
        matches!(self, EdgeError::InvalidRequest(_))
    }

    /// Convert error to HTTP status code
    ///
    /// - Client input errors: 400
    /// - Table unreachable in every region: 502
    /// - Everything else (bad data, bad config): 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            EdgeError::InvalidRequest(_) => 400,
            EdgeError::Lookup(_) => 502,
            EdgeError::Config(_)
            | EdgeError::InvalidEvent(_)
            | EdgeError::MalformedItem { .. }
            | EdgeError::Definitions(_)
            | EdgeError::Io(_)
            | EdgeError::Serialization(_) => 500,
        }
    }

    pub fn malformed_item(uri: impl Into<String>, detail: impl Into<String>) -> Self {
        EdgeError::MalformedItem {
            uri: uri.into(),
            detail: detail.into(),
        }
    }
}
