//! Read-only view over one branch's commit graph.

use crate::domain::{Commit, CommitHash, HistoryError};

/// A lazy, newest-first, single-pass walk over a branch.
///
/// Ancestors always come after their descendants. Dropping the walk early
/// releases whatever produces it.
pub type CommitWalk<'a> = Box<dyn Iterator<Item = Result<Commit, HistoryError>> + 'a>;

/// Repository history for the branch currently checked out.
///
/// Implementations own the working tree: checkouts are exclusive and happen
/// one at a time.
pub trait RevisionHistory: Send {
    /// Switch the working tree to the tip of `name`.
    fn checkout_branch(&mut self, name: &str) -> Result<(), HistoryError>;

    /// Switch the working tree to `hash` (detached).
    fn checkout_commit(&mut self, hash: &CommitHash) -> Result<(), HistoryError>;

    /// Walk the checked-out branch from its head backwards.
    fn walk_commits(&self) -> Result<CommitWalk<'_>, HistoryError>;

    /// Look up a commit anywhere in the repository. `Ok(None)` when the
    /// revision does not name a commit.
    fn resolve_commit(&self, revision: &str) -> Result<Option<Commit>, HistoryError>;
}
