use std::fmt;

use crate::model::SourceId;

/// Failure to obtain one source's records.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport failure, missing file, worker died.
    Unreachable(String),
    /// Non-success HTTP status.
    Http { status: u16, message: String },
    /// Payload could not be read as a record list.
    Malformed(String),
    /// Source did not answer within the configured timeout.
    Timeout { after_secs: u64 },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(msg) => write!(f, "source unreachable: {msg}"),
            Self::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Malformed(msg) => write!(f, "malformed payload: {msg}"),
            Self::Timeout { after_secs } => write!(f, "timed out after {after_secs}s"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Failure of a reconciliation pass or of engine setup.
///
/// Any of these aborts the pass; the previously committed snapshot stays
/// authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (non-positive distance, bad threshold, etc.).
    ConfigValidation(String),
    /// One of the two feeds failed.
    Fetch { feed: SourceId, error: FetchError },
    /// Previous-pass state could not be loaded or saved.
    State(String),
    /// CSV export failed.
    Export(String),
    /// Could not start a fetch worker.
    Worker(String),
    /// The in-flight pass ended without producing a result.
    PassAborted,
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Fetch { feed, error } => write!(f, "{feed} feed failed: {error}"),
            Self::State(msg) => write!(f, "state store error: {msg}"),
            Self::Export(msg) => write!(f, "export error: {msg}"),
            Self::Worker(msg) => write!(f, "fetch worker error: {msg}"),
            Self::PassAborted => write!(f, "reconciliation pass aborted"),
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch { error, .. } => Some(error),
            _ => None,
        }
    }
}
