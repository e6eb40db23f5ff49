//! Error taxonomy for the scan engine.
//!
//! "Not found" outcomes (no build record, revision missing from history) are
//! not errors and never appear here; they are resolution decisions. Build-step
//! failures are [`StepError`]s that the driver absorbs. Everything that ends
//! up in [`ScanError`] aborts the branch it happened on.

use crate::executor::PipelineStep;

/// A build number or build-number override that cannot be sequenced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("build number '{value}' has no '.' separator")]
    MissingSeparator { value: String },

    #[error("build number '{value}' does not start with a non-negative integer")]
    NonNumericPrefix { value: String },

    #[error("build number override '{value}' is not a non-negative integer")]
    InvalidOverride { value: String },

    #[error("build number '{value}' cannot be incremented without overflow")]
    Overflow { value: String },
}

/// Failures reading or switching repository history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },

    #[error("not a git work tree: {0}")]
    NotARepository(String),

    #[error("invalid commit hash: {0}")]
    InvalidHash(String),

    #[error("malformed history: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the build record store. "Not found" is `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("build record lookup failed: {0}")]
    Transport(String),

    #[error("build record is not valid build-info: {0}")]
    Decode(String),
}

/// A failed external pipeline step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("`{command}` exited with code {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("`{command}` timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Branch-fatal errors, carrying enough context to report precisely.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("branch '{branch}': checkout failed: {source}")]
    BranchCheckout {
        branch: String,
        #[source]
        source: HistoryError,
    },

    #[error("branch '{branch}': lookup of latest build '{build_name}' failed: {source}")]
    RecordLookup {
        branch: String,
        build_name: String,
        #[source]
        source: RecordStoreError,
    },

    #[error("branch '{branch}': history walk failed: {source}")]
    History {
        branch: String,
        #[source]
        source: HistoryError,
    },

    #[error("branch '{branch}': cannot derive build number: {source}")]
    BuildNumber {
        branch: String,
        #[source]
        source: ParseError,
    },

    #[error("branch '{branch}': checkout of commit {commit} failed: {source}")]
    CommitCheckout {
        branch: String,
        commit: String,
        #[source]
        source: HistoryError,
    },

    #[error("branch '{branch}': {step} step failed for commit {commit}: {source}")]
    Pipeline {
        branch: String,
        commit: String,
        step: PipelineStep,
        #[source]
        source: StepError,
    },
}

impl ScanError {
    /// Branch the error aborted.
    pub fn branch(&self) -> &str {
        match self {
            ScanError::BranchCheckout { branch, .. }
            | ScanError::RecordLookup { branch, .. }
            | ScanError::History { branch, .. }
            | ScanError::BuildNumber { branch, .. }
            | ScanError::CommitCheckout { branch, .. }
            | ScanError::Pipeline { branch, .. } => branch,
        }
    }

    /// Commit being processed when the error happened, if any.
    pub fn commit(&self) -> Option<&str> {
        match self {
            ScanError::CommitCheckout { commit, .. } | ScanError::Pipeline { commit, .. } => {
                Some(commit)
            }
            _ => None,
        }
    }
}

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
