use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong between sending a request to the
/// generation backend and holding a parsed analysis.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request to generation backend failed: {0}")]
    Transport(String),

    #[error("generation backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("generation backend returned an empty response")]
    EmptyResponse,

    #[error("failed to parse generated analysis: {0}")]
    MalformedOutput(String),

    #[error("generation task panicked: {0}")]
    Panicked(String),

    #[error("enrichment task could not be scheduled: {0}")]
    NotScheduled(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err.to_string())
    }
}
