//! Per-branch scan driver.
//!
//! A branch pass moves through
//! `Idle → CheckedOutBranch → ResolvingHistory → {NoWork | PerCommitLoop} → BranchDone`,
//! and every commit in the loop through
//! `CheckedOutCommit → IdentityStamped → Built → VcsCollected → Published → Scanned → CommitDone`
//! or, when its build fails, `… → BuildFailed → CommitSkipped`.
//!
//! Failure policy:
//! - a failed build skips that commit and the loop carries on
//! - any other failure aborts the branch and is returned to the caller

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::error::Result;
use crate::domain::{BuildIdentity, BuildRecord, Commit, ResolutionKind, ScanError};
use crate::executor::{run_step, BuildExecutor, PipelineStep};
use crate::history::RevisionHistory;
use crate::obs::{
    emit_branch_done, emit_branch_no_work, emit_branch_started, emit_commit_done,
    emit_commit_skipped, emit_commit_started,
};
use crate::resolver::CommitResolver;
use crate::sequencer::{BranchSequence, BuildSequencer};
use crate::store::BuildRecordStore;

/// A branch to scan and the build name its builds are published under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchTarget {
    pub branch: String,
    pub build_name: String,
}

impl BranchTarget {
    pub fn new(branch: impl Into<String>, build_name: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            build_name: build_name.into(),
        }
    }
}

/// States of a branch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    Idle,
    CheckedOutBranch,
    ResolvingHistory,
    NoWork,
    PerCommitLoop,
    BranchDone,
}

/// Stages of one commit inside the per-commit loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    CheckedOutCommit,
    IdentityStamped,
    Built,
    VcsCollected,
    Published,
    Scanned,
    CommitDone,
    BuildFailed,
    CommitSkipped,
}

impl CommitStage {
    /// Stage reached once `step` succeeded.
    fn after(step: PipelineStep) -> Self {
        match step {
            PipelineStep::Build => CommitStage::Built,
            PipelineStep::CollectVcs => CommitStage::VcsCollected,
            PipelineStep::Publish => CommitStage::Published,
            PipelineStep::Scan => CommitStage::Scanned,
        }
    }
}

/// A commit whose build failed and whose remaining steps were skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCommit {
    pub commit: String,
    pub build_number: String,
    pub reason: String,
}

/// What a completed branch pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    pub branch: String,
    pub build_name: String,

    /// How the commits to scan were chosen; `None` if nothing was resolved.
    pub resolution: Option<ResolutionKind>,

    /// Identities of commits that went through the full pipeline.
    pub scanned: Vec<BuildIdentity>,

    pub skipped: Vec<SkippedCommit>,
}

impl BranchReport {
    fn new(target: &BranchTarget) -> Self {
        Self {
            branch: target.branch.clone(),
            build_name: target.build_name.clone(),
            resolution: None,
            scanned: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Whether the branch had nothing new to scan.
    pub fn is_no_work(&self) -> bool {
        self.scanned.is_empty() && self.skipped.is_empty()
    }
}

enum CommitOutcome {
    Scanned(BuildIdentity),
    Skipped(SkippedCommit),
}

/// Drives branches through resolve → sequence → build/publish/scan.
///
/// Owns the working tree for its whole lifetime; branches and commits are
/// processed strictly one after another.
pub struct ScanDriver<H> {
    history: H,
    store: Arc<dyn BuildRecordStore>,
    executor: Arc<dyn BuildExecutor>,
    resolver: CommitResolver,
    sequencer: BuildSequencer,
    vcs_url: Option<String>,
}

impl<H: RevisionHistory> ScanDriver<H> {
    pub fn new(
        history: H,
        store: Arc<dyn BuildRecordStore>,
        executor: Arc<dyn BuildExecutor>,
    ) -> Self {
        Self {
            history,
            store,
            executor,
            resolver: CommitResolver::default(),
            sequencer: BuildSequencer::default(),
            vcs_url: None,
        }
    }

    pub fn with_resolver(mut self, resolver: CommitResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use `sequencer` (and its override) for this run.
    pub fn with_sequencer(mut self, sequencer: BuildSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// Read the previous revision recorded for `url` instead of the first
    /// repository of the build record.
    pub fn with_vcs_url(mut self, url: impl Into<String>) -> Self {
        self.vcs_url = Some(url.into());
        self
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn into_history(self) -> H {
        self.history
    }

    /// Run one branch pass.
    ///
    /// Returns `Ok` whenever no fatal error occurred, even if some commits
    /// were skipped.
    #[instrument(
        name = "superhighway.branch",
        skip_all,
        fields(branch = %target.branch, build_name = %target.build_name)
    )]
    pub async fn scan_branch(&mut self, target: &BranchTarget) -> Result<BranchReport> {
        let mut report = BranchReport::new(target);
        transition(BranchState::Idle);

        emit_branch_started(&target.branch, &target.build_name);
        self.history
            .checkout_branch(&target.branch)
            .map_err(|source| ScanError::BranchCheckout {
                branch: target.branch.clone(),
                source,
            })?;
        transition(BranchState::CheckedOutBranch);

        let record = self
            .store
            .fetch_latest(&target.build_name)
            .await
            .map_err(|source| ScanError::RecordLookup {
                branch: target.branch.clone(),
                build_name: target.build_name.clone(),
                source,
            })?;
        let last_revision = record.as_ref().and_then(|r| self.recorded_revision(r));

        transition(BranchState::ResolvingHistory);
        let resolution = self
            .resolver
            .resolve(last_revision, &self.history)
            .map_err(|source| ScanError::History {
                branch: target.branch.clone(),
                source,
            })?;
        report.resolution = Some(resolution.kind.clone());

        if resolution.is_empty() {
            transition(BranchState::NoWork);
            emit_branch_no_work(&target.branch);
            return Ok(report);
        }

        let sequence = self
            .sequencer
            .start_branch(&target.build_name, record.as_ref().map(|r| r.number.as_str()))
            .map_err(|source| ScanError::BuildNumber {
                branch: target.branch.clone(),
                source,
            })?;

        transition(BranchState::PerCommitLoop);
        for (index, commit) in resolution.commits().iter().enumerate() {
            match self.scan_commit(target, &sequence, index, commit).await? {
                CommitOutcome::Scanned(identity) => report.scanned.push(identity),
                CommitOutcome::Skipped(skipped) => report.skipped.push(skipped),
            }
        }

        transition(BranchState::BranchDone);
        emit_branch_done(&target.branch, report.scanned.len(), report.skipped.len());
        Ok(report)
    }

    async fn scan_commit(
        &mut self,
        target: &BranchTarget,
        sequence: &BranchSequence,
        index: usize,
        commit: &Commit,
    ) -> Result<CommitOutcome> {
        self.history
            .checkout_commit(&commit.hash)
            .map_err(|source| ScanError::CommitCheckout {
                branch: target.branch.clone(),
                commit: commit.hash.to_string(),
                source,
            })?;
        stage(commit, CommitStage::CheckedOutCommit);

        let identity = sequence.identity(index, commit);
        let label = identity.label();
        stage(commit, CommitStage::IdentityStamped);
        emit_commit_started(commit.short_hash(), &label);

        for step in PipelineStep::ALL {
            match run_step(self.executor.as_ref(), step, &identity).await {
                Ok(()) => stage(commit, CommitStage::after(step)),
                Err(error) if step.is_commit_local() => {
                    stage(commit, CommitStage::BuildFailed);
                    emit_commit_skipped(commit.short_hash(), &label, &error);
                    stage(commit, CommitStage::CommitSkipped);
                    return Ok(CommitOutcome::Skipped(SkippedCommit {
                        commit: commit.hash.to_string(),
                        build_number: identity.build_number.to_string(),
                        reason: error.to_string(),
                    }));
                }
                Err(source) => {
                    return Err(ScanError::Pipeline {
                        branch: target.branch.clone(),
                        commit: commit.hash.to_string(),
                        step,
                        source,
                    });
                }
            }
        }

        stage(commit, CommitStage::CommitDone);
        emit_commit_done(commit.short_hash(), &label);
        Ok(CommitOutcome::Scanned(identity))
    }

    fn recorded_revision<'r>(&self, record: &'r BuildRecord) -> Option<&'r str> {
        let revision = match &self.vcs_url {
            Some(url) => record.revision_for(url),
            None => record.primary_revision(),
        };
        if revision.is_none() {
            warn!(
                build = %record.name,
                number = %record.number,
                "Latest build has no revision for this repository"
            );
        }
        revision
    }
}

fn transition(state: BranchState) {
    debug!(state = ?state, "Branch state");
}

fn stage(commit: &Commit, stage: CommitStage) {
    debug!(commit = %commit.short_hash(), stage = ?stage, "Commit stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BuildRecord;
    use crate::fakes::{synthetic_hash, MemoryBuildRecordStore, MemoryHistory, RecordingExecutor};
    use crate::resolver::FirstScanPolicy;
    use tracing_test::traced_test;

    const URL: &str = "https://github.com/org/project.git";

    struct Fixture {
        store: Arc<MemoryBuildRecordStore>,
        executor: Arc<RecordingExecutor>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryBuildRecordStore::new()),
                executor: Arc::new(RecordingExecutor::new()),
            }
        }

        fn driver(&self, history: MemoryHistory) -> ScanDriver<MemoryHistory> {
            ScanDriver::new(history, self.store.clone(), self.executor.clone())
        }

        fn record(&self, build_name: &str, number: &str, revision_label: &str) {
            let revision = synthetic_hash(revision_label);
            self.store
                .insert(BuildRecord::new(build_name, number, URL, revision.as_str()));
        }
    }

    fn short(label: &str) -> String {
        synthetic_hash(label).short().to_string()
    }

    #[tokio::test]
    async fn full_pipeline_runs_for_every_new_commit() {
        let fx = Fixture::new();
        fx.record("proj-main", "17.0-aaaa1111", "c1");
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();

        let numbers: Vec<String> = report
            .scanned
            .iter()
            .map(|i| i.build_number.to_string())
            .collect();
        assert_eq!(
            numbers,
            vec![format!("18.0-{}", short("c2")), format!("18.1-{}", short("c3"))]
        );
        assert_eq!(fx.executor.steps_for(&short("c2")), PipelineStep::ALL.to_vec());
        assert_eq!(fx.executor.steps_for(&short("c3")), PipelineStep::ALL.to_vec());
        assert!(fx.executor.steps_for(&short("c1")).is_empty());
    }

    #[tokio::test]
    async fn checkouts_follow_branch_then_commits_in_order() {
        let fx = Fixture::new();
        fx.record("proj-main", "1.0-aaaa1111", "c1");
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));
        driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();

        let checkouts = driver.history().checkouts().to_vec();
        assert_eq!(
            checkouts,
            vec![
                "main".to_string(),
                synthetic_hash("c2").to_string(),
                synthetic_hash("c3").to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn up_to_date_branch_does_nothing() {
        let fx = Fixture::new();
        fx.record("proj-main", "5.1-aaaa1111", "c3");
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();
        assert!(report.is_no_work());
        assert_eq!(report.resolution, Some(ResolutionKind::UpToDate));
        assert!(fx.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn never_published_build_scans_head_with_first_base() {
        let fx = Fixture::new();
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();
        assert_eq!(report.scanned.len(), 1);
        assert_eq!(
            report.scanned[0].build_number.to_string(),
            format!("1.0-{}", short("c3"))
        );
    }

    #[tokio::test]
    async fn full_history_first_scan_numbers_every_commit() {
        let fx = Fixture::new();
        let mut driver = fx
            .driver(MemoryHistory::linear("main", &["c1", "c2"]))
            .with_resolver(CommitResolver::new(FirstScanPolicy::FullHistory));

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();
        let numbers: Vec<String> = report
            .scanned
            .iter()
            .map(|i| i.build_number.to_string())
            .collect();
        assert_eq!(
            numbers,
            vec![format!("1.0-{}", short("c1")), format!("1.1-{}", short("c2"))]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_build_skips_only_that_commit() {
        let fx = Fixture::new();
        fx.record("proj-main", "17.0-aaaa1111", "c1");
        fx.executor.fail_on(PipelineStep::Build, &short("c2"));
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();

        assert_eq!(fx.executor.steps_for(&short("c2")), vec![PipelineStep::Build]);
        assert_eq!(fx.executor.steps_for(&short("c3")), PipelineStep::ALL.to_vec());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].commit, synthetic_hash("c2").to_string());
        assert_eq!(report.scanned.len(), 1);
        // The skipped commit keeps its slot; c3 is still index 1.
        assert_eq!(
            report.scanned[0].build_number.to_string(),
            format!("18.1-{}", short("c3"))
        );
        assert!(logs_contain("commit.skipped"));
        assert!(logs_contain("superhighway.branch"));
    }

    #[tokio::test]
    async fn failed_publish_aborts_the_branch() {
        let fx = Fixture::new();
        fx.record("proj-main", "17.0-aaaa1111", "c1");
        fx.executor.fail_on(PipelineStep::Publish, &short("c2"));
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));

        let err = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap_err();

        match &err {
            ScanError::Pipeline { step, commit, .. } => {
                assert_eq!(*step, PipelineStep::Publish);
                assert_eq!(commit, &synthetic_hash("c2").to_string());
            }
            other => panic!("expected pipeline error, got {other:?}"),
        }
        assert!(fx.executor.steps_for(&short("c3")).is_empty());
        assert!(!driver
            .history()
            .checkouts()
            .contains(&synthetic_hash("c3").to_string()));
    }

    #[tokio::test]
    async fn failed_collect_and_scan_are_fatal_too() {
        for step in [PipelineStep::CollectVcs, PipelineStep::Scan] {
            let fx = Fixture::new();
            fx.record("proj-main", "2.0-aaaa1111", "c1");
            fx.executor.fail_on(step, &short("c2"));
            let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]));

            let err = driver
                .scan_branch(&BranchTarget::new("main", "proj-main"))
                .await
                .unwrap_err();
            assert!(matches!(err, ScanError::Pipeline { step: s, .. } if s == step));
            assert!(fx.executor.steps_for(&short("c3")).is_empty());
        }
    }

    #[tokio::test]
    async fn unreachable_store_aborts_before_checkout_of_commits() {
        let fx = Fixture::new();
        fx.store.make_unreachable("proj-main");
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1"]));

        let err = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::RecordLookup { .. }));
        assert!(fx.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_previous_number_is_fatal() {
        let fx = Fixture::new();
        fx.record("proj-main", "abc.3", "c1");
        let mut driver = fx.driver(MemoryHistory::linear("main", &["c1", "c2"]));

        let err = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::BuildNumber { .. }));
        assert!(err.to_string().contains("abc.3"));
        assert!(fx.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn commit_checkout_failure_is_fatal() {
        let fx = Fixture::new();
        fx.record("proj-main", "2.0-aaaa1111", "c1");
        let mut history = MemoryHistory::linear("main", &["c1", "c2"]);
        history.break_checkout(synthetic_hash("c2").as_str());
        let mut driver = fx.driver(history);

        let err = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::CommitCheckout { .. }));
        assert!(fx.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn vcs_url_selects_the_matching_revision() {
        let fx = Fixture::new();
        let mut record = BuildRecord::new(
            "proj-main",
            "4.0-aaaa1111",
            "https://github.com/org/other.git",
            synthetic_hash("c2").as_str(),
        );
        record.vcs.push(crate::domain::VcsRevision {
            url: URL.to_string(),
            revision: synthetic_hash("c1").to_string(),
        });
        fx.store.insert(record);
        let mut driver = fx
            .driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]))
            .with_vcs_url(URL);

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();
        assert_eq!(report.scanned.len(), 2);
    }

    #[tokio::test]
    async fn record_for_another_repository_falls_back_to_head() {
        let fx = Fixture::new();
        fx.store.insert(BuildRecord::new(
            "proj-main",
            "4.0-aaaa1111",
            "https://github.com/org/other.git",
            synthetic_hash("c1").as_str(),
        ));
        let mut driver = fx
            .driver(MemoryHistory::linear("main", &["c1", "c2", "c3"]))
            .with_vcs_url(URL);

        let report = driver
            .scan_branch(&BranchTarget::new("main", "proj-main"))
            .await
            .unwrap();
        assert_eq!(report.scanned.len(), 1);
        assert_eq!(
            report.scanned[0].build_number.to_string(),
            format!("5.0-{}", short("c3"))
        );
    }
}
