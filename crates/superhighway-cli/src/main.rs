//! Superhighway - incremental build, publish and scan agent
//!
//! ## Commands
//!
//! - `run`: clone the configured repository and drive every branch's new
//!   commits through build, publish and scan
//! - `resolve`: show which commits of a local repository would be scanned and
//!   the build numbers they would get, without building anything

mod agent;
mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use superhighway_core::{
    BranchOutcome, BuildRecordStore, BuildSequencer, Commit, CommitResolver, FirstScanPolicy,
    GitRepository, ResolutionKind, RunOutcome,
};
use superhighway_jfrog::ArtifactoryRecordStore;
use tracing::{info, Level};

use crate::agent::{run_agent, RunOptions};
use crate::config::BuildConfig;

#[derive(Parser)]
#[command(name = "superhighway")]
#[command(version = superhighway_core::VERSION)]
#[command(about = "Builds, publishes and scans every new commit of a git repository's branches", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the new commits of every configured branch
    Run {
        /// Config file (ignored when SUPERHIGHWAY_CONFIG is set)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Build number base for the first branch with new commits
        #[arg(long, env = "BUILD_NUMBER")]
        build_number: Option<String>,

        /// Only scan this branch (repeatable)
        #[arg(short, long = "branch")]
        branches: Vec<String>,

        /// Scan the whole branch when it was never published
        #[arg(long)]
        full_history: bool,

        /// Stop at the first branch that fails
        #[arg(long)]
        fail_fast: bool,

        /// Directory the project is cloned into
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Leave the clone in place after the run
        #[arg(long)]
        keep_clone: bool,
    },

    /// Show what the next run would scan on one branch
    Resolve {
        /// Build name to look up in Artifactory
        #[arg(long)]
        build_name: String,

        /// Config file providing the Artifactory connection
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Local work tree
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Branch to inspect (default: current HEAD). The work tree is left
        /// as it is.
        #[arg(short, long)]
        branch: Option<String>,

        /// Build number base the next run would be given
        #[arg(long, env = "BUILD_NUMBER")]
        build_number: Option<String>,

        /// Apply the full-history policy to never-published builds
        #[arg(long)]
        full_history: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    superhighway_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            build_number,
            branches,
            full_history,
            fail_fast,
            workdir,
            keep_clone,
        } => {
            let options = RunOptions {
                build_number,
                branches,
                full_history,
                fail_fast,
                workdir,
                keep_clone,
            };
            cmd_run(config.as_deref(), &options, cli.json).await
        }
        Commands::Resolve {
            build_name,
            config,
            repo,
            branch,
            build_number,
            full_history,
        } => {
            let request = ResolveRequest {
                build_name,
                repo,
                branch,
                build_number,
                full_history,
            };
            cmd_resolve(&request, config.as_deref(), cli.json).await
        }
    }
}

async fn cmd_run(config_path: Option<&Path>, options: &RunOptions, json: bool) -> Result<()> {
    let config = BuildConfig::load(config_path).context("Failed to load configuration")?;
    let outcome = run_agent(&config, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_run_summary(&outcome));
    }

    if !outcome.overall_success() {
        anyhow::bail!(
            "{} of {} branches failed",
            outcome.failed_branches(),
            outcome.branches.len()
        );
    }
    Ok(())
}

fn render_run_summary(outcome: &RunOutcome) -> String {
    let mut out = format!("Run {}\n", outcome.run_id);
    for branch in &outcome.branches {
        match branch {
            BranchOutcome::Completed { report } if report.is_no_work() => {
                out.push_str(&format!("  {:<20} up to date\n", report.branch));
            }
            BranchOutcome::Completed { report } => {
                out.push_str(&format!(
                    "  {:<20} {} scanned, {} skipped\n",
                    report.branch,
                    report.scanned.len(),
                    report.skipped.len()
                ));
                for identity in &report.scanned {
                    out.push_str(&format!("    ✓ {}\n", identity.label()));
                }
                for skipped in &report.skipped {
                    out.push_str(&format!(
                        "    ✗ {}/{}: {}\n",
                        report.build_name, skipped.build_number, skipped.reason
                    ));
                }
            }
            BranchOutcome::Aborted { branch, error } => {
                out.push_str(&format!("  {:<20} FAILED: {}\n", branch, error));
            }
            BranchOutcome::NotAttempted { branch } => {
                out.push_str(&format!("  {:<20} not attempted\n", branch));
            }
        }
    }
    out
}

#[derive(Debug, Serialize)]
struct ResolvePlan {
    build_name: String,
    previous_build_number: Option<String>,
    resolution: ResolutionKind,
    commits: Vec<PlannedCommit>,
}

#[derive(Debug, Serialize)]
struct PlannedCommit {
    commit: String,
    build_number: String,
    subject: String,
}

/// Arguments of `superhighway resolve`.
struct ResolveRequest {
    build_name: String,
    repo: PathBuf,
    branch: Option<String>,
    build_number: Option<String>,
    full_history: bool,
}

async fn cmd_resolve(
    request: &ResolveRequest,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let build_name = request.build_name.as_str();
    let mut sequencer = BuildSequencer::new(request.build_number.as_deref())
        .context("Invalid build number override")?;
    let config = BuildConfig::load(config_path).context("Failed to load configuration")?;
    let mut history = GitRepository::open(&request.repo)?;
    if let Some(branch) = &request.branch {
        history.select_branch(branch)?;
    }

    let store = ArtifactoryRecordStore::new(config.artifactory())?;
    let record = store.fetch_latest(build_name).await?;
    let last_revision = record
        .as_ref()
        .and_then(|r| r.revision_for(&config.vcs.url));
    info!(build_name = %build_name, revision = ?last_revision, "Resolving");

    let policy = if request.full_history {
        FirstScanPolicy::FullHistory
    } else {
        FirstScanPolicy::NewestOnly
    };
    let resolution = CommitResolver::new(policy).resolve(last_revision, &history)?;

    let commits = plan_commits(
        &mut sequencer,
        build_name,
        record.as_ref().map(|r| r.number.as_str()),
        resolution.commits(),
    )?;
    let plan = ResolvePlan {
        build_name: build_name.to_string(),
        previous_build_number: record.map(|r| r.number),
        resolution: resolution.kind,
        commits,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}

/// Number `commits` the way a run would, consuming an override only when
/// there is something to number.
fn plan_commits(
    sequencer: &mut BuildSequencer,
    build_name: &str,
    previous_build_number: Option<&str>,
    commits: &[Commit],
) -> Result<Vec<PlannedCommit>> {
    if commits.is_empty() {
        return Ok(Vec::new());
    }
    let sequence = sequencer.start_branch(build_name, previous_build_number)?;
    Ok(commits
        .iter()
        .enumerate()
        .map(|(index, commit)| PlannedCommit {
            commit: commit.hash.to_string(),
            build_number: sequence.identity(index, commit).build_number.to_string(),
            subject: commit.message.clone(),
        })
        .collect())
}

fn render_plan(plan: &ResolvePlan) -> String {
    let mut out = format!(
        "{} (previous: {})\n",
        plan.build_name,
        plan.previous_build_number.as_deref().unwrap_or("none")
    );
    if plan.commits.is_empty() {
        out.push_str("  nothing to scan\n");
    }
    for commit in &plan.commits {
        out.push_str(&format!(
            "  {:<24} {} {}\n",
            commit.build_number,
            &commit.commit[..8.min(commit.commit.len())],
            commit.subject
        ));
    }
    out
}
