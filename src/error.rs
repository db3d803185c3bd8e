use thiserror::Error;

use crate::diff::DiffError;
use crate::http::FetchError;
use crate::store::StoreError;

/// Errors surfaced to callers of the monitor
///
/// Network failures inside a resolution never show up here: they are
/// recorded as `StoreDecision::Unreachable` instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Document not available: {0}")]
    DocumentNotAvailable(String),

    #[error("Document history not available: {0}")]
    DocumentHistoryNotAvailable(String),

    #[error("Invalid version selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document too large: {url} is {length} bytes (limit {limit})")]
    DocumentTooLarge {
        url: String,
        length: usize,
        limit: usize,
    },

    #[error("Uid error: {0}")]
    Uid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Diff(#[from] DiffError),
}

impl From<FetchError> for MonitorError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::CrossOriginRedirect { .. } => MonitorError::Configuration(e.to_string()),
            FetchError::InvalidUrl(url) => MonitorError::InvalidUrl(url),
            other => MonitorError::DocumentNotAvailable(other.to_string()),
        }
    }
}
