//! Superhighway Core Library
//!
//! Incremental commit resolution, build-number sequencing and the per-commit
//! build/publish/scan driver. External systems (git, the artifact store, the
//! build tool) sit behind the [`RevisionHistory`], [`BuildRecordStore`] and
//! [`BuildExecutor`] traits.

pub mod domain;
pub mod driver;
pub mod executor;
pub mod fakes;
pub mod git;
pub mod history;
pub mod obs;
pub mod resolver;
pub mod run;
pub mod sequencer;
pub mod store;
pub mod telemetry;

pub use domain::{
    BuildIdentity, BuildNumber, BuildRecord, Commit, CommitHash, FallbackReason, HistoryError,
    ParseError, RecordStoreError, ResolutionKind, ResolutionResult, ScanError, StepError,
    VcsRevision,
};

pub use driver::{BranchReport, BranchTarget, ScanDriver, SkippedCommit};
pub use executor::{BuildExecutor, PipelineStep};
pub use git::{is_git_repo, Credentials, GitRepository};
pub use history::{CommitWalk, RevisionHistory};
pub use resolver::{CommitResolver, FirstScanPolicy};
pub use run::{BranchOutcome, RunOutcome, ScanRun};
pub use sequencer::{next_build_number, BranchSequence, BuildSequencer};
pub use store::BuildRecordStore;

/// Crate version, as reported by `superhighway --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
