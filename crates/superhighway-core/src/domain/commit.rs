//! Commits as read from a branch's history.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::HistoryError;

/// Length of the abbreviated hash stamped into build numbers.
pub const SHORT_HASH_LEN: usize = 8;

/// Full commit object id: 40 (SHA-1) or 64 (SHA-256) lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Parse and normalise a full object id.
    pub fn parse(value: &str) -> Result<Self, HistoryError> {
        let value = value.trim();
        let valid_len = value.len() == 40 || value.len() == 64;
        if !valid_len || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HistoryError::InvalidHash(value.to_string()));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first [`SHORT_HASH_LEN`] characters.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_HASH_LEN]
    }

    /// Whether `revision` names this commit. Case-insensitive, surrounding
    /// whitespace ignored; abbreviations do not match.
    pub fn matches(&self, revision: &str) -> bool {
        self.0.eq_ignore_ascii_case(revision.trim())
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = HistoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.0
    }
}

/// A commit on a tracked branch. Never mutated once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: CommitHash,

    /// Subject line of the commit message.
    pub message: String,
}

impl Commit {
    pub fn new(hash: CommitHash, message: impl Into<String>) -> Self {
        Self {
            hash,
            message: message.into(),
        }
    }

    pub fn short_hash(&self) -> &str {
        self.hash.short()
    }
}
