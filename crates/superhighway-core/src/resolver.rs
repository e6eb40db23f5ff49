//! Which commits of a branch still need to be scanned.
//!
//! The branch frontier is reconstructed on every run from the revision in the
//! last published build record and the live history, so nothing has to be
//! persisted between runs:
//!
//! - recorded revision found at position k → every commit newer than k
//! - recorded revision missing (force push) → only the branch head
//! - no recorded revision → only the branch head, or the whole branch under
//!   [`FirstScanPolicy::FullHistory`]

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    Commit, FallbackReason, HistoryError, ResolutionKind, ResolutionResult,
};
use crate::history::RevisionHistory;

/// What to scan when a branch has no recorded revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstScanPolicy {
    /// Scan the branch head only. Cost is one build regardless of history size.
    #[default]
    NewestOnly,

    /// Scan every commit on the branch, oldest first. Cost grows with the
    /// branch length and every commit shares one build-number base.
    FullHistory,
}

/// Computes the resolution result for a branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitResolver {
    first_scan: FirstScanPolicy,
}

impl CommitResolver {
    pub fn new(first_scan: FirstScanPolicy) -> Self {
        Self { first_scan }
    }

    pub fn first_scan_policy(&self) -> FirstScanPolicy {
        self.first_scan
    }

    /// Resolve the commits of the checked-out branch that come after
    /// `last_revision`, oldest first.
    ///
    /// Only a failing history walk is an error. A missing or unknown
    /// `last_revision` degrades to the branch head.
    pub fn resolve(
        &self,
        last_revision: Option<&str>,
        history: &dyn RevisionHistory,
    ) -> Result<ResolutionResult, HistoryError> {
        let last_revision = last_revision.map(str::trim).filter(|r| !r.is_empty());

        let Some(revision) = last_revision else {
            let walk = history.walk_commits()?;
            return match self.first_scan {
                FirstScanPolicy::NewestOnly => {
                    info!("No previous revision recorded, scanning only the latest commit");
                    newest_only(walk, FallbackReason::NoPriorRevision)
                }
                FirstScanPolicy::FullHistory => {
                    info!("No previous revision recorded, scanning the whole branch");
                    full_history(walk)
                }
            };
        };

        // A revision the repository has never heard of cannot be on the
        // branch, so skip the full walk.
        if history.resolve_commit(revision)?.is_none() {
            warn!(
                revision = %revision,
                "Revision wasn't found in the repository, probably due to a force push. Scanning only the latest commit"
            );
            return newest_only(
                history.walk_commits()?,
                FallbackReason::RevisionNotInHistory {
                    revision: revision.to_string(),
                },
            );
        }

        resolve_walk(revision, history.walk_commits()?)
    }
}

/// Resolve against an explicit newest-first walk.
///
/// Collects commits until `last_revision` is met; if the walk ends first the
/// result is the newest commit alone.
pub fn resolve_walk<I>(last_revision: &str, walk: I) -> Result<ResolutionResult, HistoryError>
where
    I: IntoIterator<Item = Result<Commit, HistoryError>>,
{
    let mut newer = Vec::new();
    let mut seen = HashSet::new();
    let mut found = false;

    for commit in walk {
        let commit = commit?;
        if commit.hash.matches(last_revision) {
            found = true;
            break;
        }
        if !seen.insert(commit.hash.clone()) {
            return Err(HistoryError::Malformed(format!(
                "commit {} appears twice in the walk",
                commit.hash
            )));
        }
        newer.push(commit);
    }

    if !found {
        warn!(
            revision = %last_revision,
            "Revision wasn't found in the branch history, probably due to a force push. Scanning only the latest commit"
        );
        newer.truncate(1);
        return Ok(ResolutionResult::new(
            ResolutionKind::Fallback {
                reason: FallbackReason::RevisionNotInHistory {
                    revision: last_revision.to_string(),
                },
            },
            newer,
        ));
    }

    if newer.is_empty() {
        debug!(revision = %last_revision, "Branch head already scanned");
        return Ok(ResolutionResult::new(ResolutionKind::UpToDate, newer));
    }

    newer.reverse();
    info!(count = newer.len(), "Found commits that haven't been scanned yet");
    Ok(ResolutionResult::new(
        ResolutionKind::Incremental {
            since: last_revision.to_string(),
        },
        newer,
    ))
}

fn newest_only<I>(walk: I, reason: FallbackReason) -> Result<ResolutionResult, HistoryError>
where
    I: IntoIterator<Item = Result<Commit, HistoryError>>,
{
    let head = walk.into_iter().next().transpose()?;
    Ok(ResolutionResult::new(
        ResolutionKind::Fallback { reason },
        head.into_iter().collect(),
    ))
}

fn full_history<I>(walk: I) -> Result<ResolutionResult, HistoryError>
where
    I: IntoIterator<Item = Result<Commit, HistoryError>>,
{
    let mut commits = Vec::new();
    let mut seen = HashSet::new();
    for commit in walk {
        let commit = commit?;
        if !seen.insert(commit.hash.clone()) {
            return Err(HistoryError::Malformed(format!(
                "commit {} appears twice in the walk",
                commit.hash
            )));
        }
        commits.push(commit);
    }
    commits.reverse();
    Ok(ResolutionResult::new(ResolutionKind::FullHistory, commits))
}
