//! The set of commits a branch still has to scan.

use serde::{Deserialize, Serialize};

use crate::domain::commit::Commit;

/// Why the resolver fell back to the newest commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No build record, or a record without a revision for this repository.
    NoPriorRevision,

    /// The recorded revision is not reachable from the branch any more,
    /// typically after a force push.
    RevisionNotInHistory { revision: String },
}

/// How a [`ResolutionResult`] was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResolutionKind {
    /// The recorded revision is the branch head.
    UpToDate,

    /// Everything after the recorded revision.
    Incremental { since: String },

    /// Only the branch head.
    Fallback { reason: FallbackReason },

    /// The entire branch, on an explicit first-scan opt-in.
    FullHistory,
}

/// Commits to scan, oldest first, with unique hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub kind: ResolutionKind,
    commits: Vec<Commit>,
}

impl ResolutionResult {
    /// `commits` must already be ordered oldest first.
    pub(crate) fn new(kind: ResolutionKind, commits: Vec<Commit>) -> Self {
        Self { kind, commits }
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// The newest commit in the result.
    pub fn newest(&self) -> Option<&Commit> {
        self.commits.last()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.kind, ResolutionKind::Fallback { .. })
    }
}

impl IntoIterator for ResolutionResult {
    type Item = Commit;
    type IntoIter = std::vec::IntoIter<Commit>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.into_iter()
    }
}
