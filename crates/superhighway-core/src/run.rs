//! One agent run across every configured branch.
//!
//! [`ScanRun`] feeds branches to a [`ScanDriver`] in configuration order.
//! A branch-fatal error is recorded and the run moves on to the next branch,
//! unless `fail_fast` is set.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::{BranchReport, BranchTarget, ScanDriver};
use crate::history::RevisionHistory;
use crate::obs::{emit_branch_aborted, emit_run_finished, emit_run_started};

/// Result of one branch within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum BranchOutcome {
    Completed { report: BranchReport },
    Aborted { branch: String, error: String },

    /// Not attempted because an earlier branch aborted under `fail_fast`.
    NotAttempted { branch: String },
}

impl BranchOutcome {
    pub fn branch(&self) -> &str {
        match self {
            BranchOutcome::Completed { report } => &report.branch,
            BranchOutcome::Aborted { branch, .. } | BranchOutcome::NotAttempted { branch } => {
                branch
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, BranchOutcome::Aborted { .. })
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub branches: Vec<BranchOutcome>,
}

impl RunOutcome {
    /// `true` when no branch aborted.
    pub fn overall_success(&self) -> bool {
        self.failed_branches() == 0
    }

    pub fn failed_branches(&self) -> usize {
        self.branches.iter().filter(|b| b.is_aborted()).count()
    }

    /// Commits that went through the full pipeline, across branches.
    pub fn scanned_commits(&self) -> usize {
        self.reports().map(|r| r.scanned.len()).sum()
    }

    pub fn skipped_commits(&self) -> usize {
        self.reports().map(|r| r.skipped.len()).sum()
    }

    fn reports(&self) -> impl Iterator<Item = &BranchReport> {
        self.branches.iter().filter_map(|b| match b {
            BranchOutcome::Completed { report } => Some(report),
            _ => None,
        })
    }
}

/// Drives a list of branches through one [`ScanDriver`].
pub struct ScanRun {
    targets: Vec<BranchTarget>,
    fail_fast: bool,
}

impl ScanRun {
    pub fn new(targets: Vec<BranchTarget>) -> Self {
        Self {
            targets,
            fail_fast: false,
        }
    }

    /// Stop at the first aborted branch.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn targets(&self) -> &[BranchTarget] {
        &self.targets
    }

    pub async fn execute<H: RevisionHistory>(&self, driver: &mut ScanDriver<H>) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        emit_run_started(&run_id, self.targets.len());

        let mut branches = Vec::with_capacity(self.targets.len());
        let mut stopped = false;
        for target in &self.targets {
            if stopped {
                branches.push(BranchOutcome::NotAttempted {
                    branch: target.branch.clone(),
                });
                continue;
            }
            match driver.scan_branch(target).await {
                Ok(report) => branches.push(BranchOutcome::Completed { report }),
                Err(error) => {
                    emit_branch_aborted(&target.branch, &error);
                    branches.push(BranchOutcome::Aborted {
                        branch: target.branch.clone(),
                        error: error.to_string(),
                    });
                    stopped = self.fail_fast;
                }
            }
        }

        let outcome = RunOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            branches,
        };
        emit_run_finished(
            &outcome.run_id,
            clock.elapsed().as_millis() as u64,
            outcome.failed_branches(),
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::BuildRecord;
    use crate::executor::PipelineStep;
    use crate::fakes::{
        synthetic_commit, synthetic_hash, MemoryBuildRecordStore, MemoryHistory, RecordingExecutor,
    };

    fn two_branch_history() -> MemoryHistory {
        let mut history = MemoryHistory::linear("main", &["m1", "m2"]);
        history.add_branch("dev", vec![synthetic_commit("d1"), synthetic_commit("d2")]);
        history
    }

    fn targets() -> Vec<BranchTarget> {
        vec![
            BranchTarget::new("main", "proj-main"),
            BranchTarget::new("dev", "proj-dev"),
        ]
    }

    #[tokio::test]
    async fn aborted_branch_does_not_stop_the_next_one() {
        let store = Arc::new(MemoryBuildRecordStore::new());
        store.make_unreachable("proj-main");
        let executor = Arc::new(RecordingExecutor::new());
        let mut driver = ScanDriver::new(two_branch_history(), store, executor.clone());

        let outcome = ScanRun::new(targets()).execute(&mut driver).await;

        assert!(!outcome.overall_success());
        assert_eq!(outcome.failed_branches(), 1);
        assert!(outcome.branches[0].is_aborted());
        assert!(matches!(outcome.branches[1], BranchOutcome::Completed { .. }));
        assert_eq!(outcome.scanned_commits(), 1);
    }

    #[tokio::test]
    async fn fail_fast_leaves_later_branches_untouched() {
        let store = Arc::new(MemoryBuildRecordStore::new());
        store.insert(BuildRecord::new(
            "proj-main",
            "3.0-aaaa1111",
            "https://example.com/r.git",
            synthetic_hash("m1").as_str(),
        ));
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_on(PipelineStep::Scan, synthetic_hash("m2").short());
        let mut driver = ScanDriver::new(two_branch_history(), store, executor.clone());

        let outcome = ScanRun::new(targets())
            .fail_fast(true)
            .execute(&mut driver)
            .await;

        assert_eq!(
            outcome.branches[1],
            BranchOutcome::NotAttempted {
                branch: "dev".to_string()
            }
        );
        assert!(executor.calls().iter().all(|c| c.build_name == "proj-main"));
    }

    #[tokio::test]
    async fn counts_scanned_and_skipped_commits() {
        let store = Arc::new(MemoryBuildRecordStore::new());
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_on(PipelineStep::Build, synthetic_hash("d2").short());
        let mut driver = ScanDriver::new(two_branch_history(), store, executor);

        let outcome = ScanRun::new(targets()).execute(&mut driver).await;

        assert!(outcome.overall_success());
        assert_eq!(outcome.scanned_commits(), 1);
        assert_eq!(outcome.skipped_commits(), 1);
        assert_eq!(outcome.branches[1].branch(), "dev");
        assert!(outcome.finished_at >= outcome.started_at);
    }
}
