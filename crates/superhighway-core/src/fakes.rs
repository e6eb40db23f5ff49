//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `MemoryHistory`, `MemoryBuildRecordStore` and `RecordingExecutor`
//! that satisfy the trait contracts without git, a network or a build tool.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{
    BuildIdentity, BuildRecord, Commit, CommitHash, HistoryError, RecordStoreError, StepError,
};
use crate::executor::{BuildExecutor, PipelineStep};
use crate::history::{CommitWalk, RevisionHistory};
use crate::store::BuildRecordStore;

/// Deterministic 40-hex hash derived from a label, so tests can name commits
/// `c1`, `c2`, … and still get distinct short hashes.
pub fn synthetic_hash(label: &str) -> CommitHash {
    let hex: String = label.bytes().map(|b| format!("{b:02x}")).collect();
    let hex = if hex.is_empty() { "0".to_string() } else { hex };
    let full: String = hex.chars().cycle().take(40).collect();
    CommitHash::parse(&full).unwrap()
}

/// Commit with a [`synthetic_hash`] and the label as message.
pub fn synthetic_commit(label: &str) -> Commit {
    Commit::new(synthetic_hash(label), label)
}

// ---------------------------------------------------------------------------
// MemoryHistory
// ---------------------------------------------------------------------------

/// In-memory branches, each stored oldest → newest.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    branches: HashMap<String, Vec<Commit>>,
    current: Option<String>,
    checkouts: Vec<String>,
    broken_walk: bool,
    broken_checkouts: HashSet<String>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single branch built from labels, oldest first.
    pub fn linear(branch: &str, labels: &[&str]) -> Self {
        let mut history = Self::new();
        history.add_branch(branch, labels.iter().map(|l| synthetic_commit(l)).collect());
        history
    }

    /// Add or replace a branch; `commits` oldest first.
    pub fn add_branch(&mut self, name: &str, commits: Vec<Commit>) {
        self.branches.insert(name.to_string(), commits);
    }

    /// Make every subsequent walk fail.
    pub fn break_walk(&mut self) {
        self.broken_walk = true;
    }

    /// Make checking out `target` (branch name or full hash) fail.
    pub fn break_checkout(&mut self, target: &str) {
        self.broken_checkouts.insert(target.to_string());
    }

    /// Every successful checkout, in order: branch names and commit hashes.
    pub fn checkouts(&self) -> &[String] {
        &self.checkouts
    }

    fn checkout(&mut self, target: &str) -> Result<(), HistoryError> {
        if self.broken_checkouts.contains(target) {
            return Err(HistoryError::Command {
                args: format!("checkout {target}"),
                stderr: "simulated checkout failure".to_string(),
            });
        }
        self.checkouts.push(target.to_string());
        Ok(())
    }
}

impl RevisionHistory for MemoryHistory {
    fn checkout_branch(&mut self, name: &str) -> Result<(), HistoryError> {
        if !self.branches.contains_key(name) {
            return Err(HistoryError::Command {
                args: format!("checkout {name}"),
                stderr: format!("unknown branch '{name}'"),
            });
        }
        self.checkout(name)?;
        self.current = Some(name.to_string());
        Ok(())
    }

    fn checkout_commit(&mut self, hash: &CommitHash) -> Result<(), HistoryError> {
        self.checkout(hash.as_str())
    }

    fn walk_commits(&self) -> Result<CommitWalk<'_>, HistoryError> {
        if self.broken_walk {
            return Err(HistoryError::Malformed("simulated walk failure".to_string()));
        }
        let branch = self
            .current
            .as_ref()
            .and_then(|name| self.branches.get(name))
            .ok_or_else(|| HistoryError::Malformed("no branch checked out".to_string()))?;
        Ok(Box::new(branch.iter().rev().cloned().map(Ok)))
    }

    fn resolve_commit(&self, revision: &str) -> Result<Option<Commit>, HistoryError> {
        Ok(self
            .branches
            .values()
            .flatten()
            .find(|commit| commit.hash.matches(revision))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryBuildRecordStore
// ---------------------------------------------------------------------------

/// In-memory build records keyed by build name.
#[derive(Debug, Default)]
pub struct MemoryBuildRecordStore {
    records: Mutex<HashMap<String, BuildRecord>>,
    unreachable: Mutex<HashSet<String>>,
}

impl MemoryBuildRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` as the latest build of its name.
    pub fn insert(&self, record: BuildRecord) {
        let mut records = self.records.lock().unwrap();
        records.insert(record.name.clone(), record);
    }

    /// Make lookups of `build_name` fail with a transport error.
    pub fn make_unreachable(&self, build_name: &str) {
        let mut unreachable = self.unreachable.lock().unwrap();
        unreachable.insert(build_name.to_string());
    }
}

#[async_trait]
impl BuildRecordStore for MemoryBuildRecordStore {
    async fn fetch_latest(
        &self,
        build_name: &str,
    ) -> Result<Option<BuildRecord>, RecordStoreError> {
        if self.unreachable.lock().unwrap().contains(build_name) {
            return Err(RecordStoreError::Transport(format!(
                "simulated outage looking up '{build_name}'"
            )));
        }
        let records = self.records.lock().unwrap();
        Ok(records.get(build_name).cloned())
    }
}

// ---------------------------------------------------------------------------
// RecordingExecutor
// ---------------------------------------------------------------------------

/// One executor call as observed by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorCall {
    pub step: PipelineStep,
    pub build_name: String,
    pub build_number: String,
    pub commit_short_hash: String,
}

/// Executor that records every call and fails on request.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
    failures: Mutex<HashSet<(PipelineStep, String)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `step` for the commit with short hash `commit_short_hash`.
    pub fn fail_on(&self, step: PipelineStep, commit_short_hash: &str) {
        let mut failures = self.failures.lock().unwrap();
        failures.insert((step, commit_short_hash.to_string()));
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Steps invoked for one commit, in order.
    pub fn steps_for(&self, commit_short_hash: &str) -> Vec<PipelineStep> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.commit_short_hash == commit_short_hash)
            .map(|call| call.step)
            .collect()
    }

    fn record(&self, step: PipelineStep, identity: &BuildIdentity) -> Result<(), StepError> {
        self.calls.lock().unwrap().push(ExecutorCall {
            step,
            build_name: identity.build_name.clone(),
            build_number: identity.build_number.to_string(),
            commit_short_hash: identity.commit_short_hash.clone(),
        });

        let failures = self.failures.lock().unwrap();
        if failures.contains(&(step, identity.commit_short_hash.clone())) {
            return Err(StepError::NonZeroExit {
                command: format!("simulated {step}"),
                code: 1,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BuildExecutor for RecordingExecutor {
    async fn run_build(&self, identity: &BuildIdentity) -> Result<(), StepError> {
        self.record(PipelineStep::Build, identity)
    }

    async fn collect_vcs_metadata(&self, identity: &BuildIdentity) -> Result<(), StepError> {
        self.record(PipelineStep::CollectVcs, identity)
    }

    async fn publish(&self, identity: &BuildIdentity) -> Result<(), StepError> {
        self.record(PipelineStep::Publish, identity)
    }

    async fn scan(&self, identity: &BuildIdentity) -> Result<(), StepError> {
        self.record(PipelineStep::Scan, identity)
    }
}
