//! Error types for superhighway-jfrog

use superhighway_core::{RecordStoreError, StepError};
use thiserror::Error;

/// Errors talking to Artifactory or driving the JFrog CLI.
#[derive(Error, Debug)]
pub enum JfrogError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(String),

    /// Artifactory answered with a non-success status
    #[error("Artifactory returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Response body is not what Artifactory documents
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A JFrog CLI setup command failed
    #[error(transparent)]
    Command(#[from] StepError),

    /// Missing or inconsistent settings
    #[error("Invalid JFrog settings: {0}")]
    Config(String),
}

impl From<reqwest::Error> for JfrogError {
    fn from(err: reqwest::Error) -> Self {
        JfrogError::Http(err.to_string())
    }
}

impl From<JfrogError> for RecordStoreError {
    fn from(err: JfrogError) -> Self {
        match err {
            JfrogError::Json(e) => RecordStoreError::Decode(e.to_string()),
            other => RecordStoreError::Transport(other.to_string()),
        }
    }
}

/// Result type for JFrog operations
pub type Result<T> = std::result::Result<T, JfrogError>;
