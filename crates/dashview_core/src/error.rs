use crate::ParseNodeIdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ParseNodeIdError> for ExplorerError {
    fn from(e: ParseNodeIdError) -> Self {
        Self::InvalidNodeId(e.to_string())
    }
}

impl ExplorerError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed(message.into())
    }

    /// Message stored in the cache when a fetch fails.
    ///
    /// Connection and fetch errors carry the backend's text verbatim; the
    /// remaining variants use their display form.
    pub fn cache_message(&self) -> String {
        match self {
            Self::ConnectionFailed(message) | Self::FetchFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
