//! Structured lifecycle events for runs, branches and commits.
//!
//! Branch passes run inside the `superhighway.branch` span opened by
//! [`ScanDriver::scan_branch`](crate::driver::ScanDriver::scan_branch).
//! Every event carries an `event` field (`branch.started`,
//! `commit.skipped`, ...) so JSON log lines can be filtered without parsing
//! messages.

use tracing::{info, warn};

pub fn emit_run_started(run_id: &str, branches: usize) {
    info!(event = "run.started", run_id = %run_id, branches = branches);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, failed_branches: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failed_branches = failed_branches,
        success = failed_branches == 0,
    );
}

pub fn emit_branch_started(branch: &str, build_name: &str) {
    info!(event = "branch.started", branch = %branch, build_name = %build_name, "Checkout to '{}' branch", branch);
}

pub fn emit_branch_no_work(branch: &str) {
    info!(
        event = "branch.no_work",
        branch = %branch,
        "'{}' branch has no new commits since the last run. Skipping...",
        branch
    );
}

pub fn emit_branch_done(branch: &str, scanned: usize, skipped: usize) {
    info!(event = "branch.done", branch = %branch, scanned = scanned, skipped = skipped);
}

/// Warn level: the branch was abandoned part way.
pub fn emit_branch_aborted(branch: &str, error: &dyn std::fmt::Display) {
    warn!(event = "branch.aborted", branch = %branch, error = %error);
}

pub fn emit_commit_started(commit: &str, build_label: &str) {
    info!(event = "commit.started", commit = %commit, build = %build_label, "Generating build {}", build_label);
}

/// Warn level: the commit's build failed and its remaining steps were skipped.
pub fn emit_commit_skipped(commit: &str, build_label: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "commit.skipped",
        commit = %commit,
        build = %build_label,
        error = %error,
        "Build failed, skipping the rest of the pipeline for this commit"
    );
}

pub fn emit_commit_done(commit: &str, build_label: &str) {
    info!(event = "commit.done", commit = %commit, build = %build_label);
}
