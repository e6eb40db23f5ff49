//! Agent lifecycle: workspace, clone, JFrog CLI setup, scan run, cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use superhighway_core::{
    BuildSequencer, CommitResolver, FirstScanPolicy, GitRepository, RunOutcome, ScanDriver,
    ScanRun,
};
use superhighway_jfrog::{ArtifactoryRecordStore, JfrogCliExecutor};
use tracing::{info, warn};

use crate::config::BuildConfig;

/// Name of the clone directory inside the agent's working directory.
pub const CLONE_DIR: &str = "project";

/// Options for one `superhighway run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Base for the first branch with new commits.
    pub build_number: Option<String>,

    /// Restrict the run to these configured branches.
    pub branches: Vec<String>,

    pub full_history: bool,

    pub fail_fast: bool,

    pub workdir: PathBuf,

    pub keep_clone: bool,
}

/// Scratch directory holding the clone for the duration of a run.
#[derive(Debug)]
pub struct AgentWorkspace {
    clone_dir: PathBuf,
    keep: bool,
}

impl AgentWorkspace {
    /// Reserve `<workdir>/project`, removing whatever a previous run left.
    pub fn prepare(workdir: &Path, keep: bool) -> Result<Self> {
        let clone_dir = workdir.join(CLONE_DIR);
        if clone_dir.exists() {
            info!(path = %clone_dir.display(), "Removing previous clone");
            std::fs::remove_dir_all(&clone_dir)
                .with_context(|| format!("Failed to remove {}", clone_dir.display()))?;
        }
        std::fs::create_dir_all(workdir)
            .with_context(|| format!("Failed to create {}", workdir.display()))?;
        Ok(Self { clone_dir, keep })
    }

    pub fn clone_dir(&self) -> &Path {
        &self.clone_dir
    }

    /// Remove the clone unless it is being kept. Failures are logged.
    pub fn cleanup(&self) {
        if self.keep || !self.clone_dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.clone_dir) {
            warn!(path = %self.clone_dir.display(), error = %e, "Failed to remove clone");
        }
    }
}

/// Clone the repository, scan every target branch and clean up.
pub async fn run_agent(config: &BuildConfig, options: &RunOptions) -> Result<RunOutcome> {
    let targets = config.targets(&options.branches)?;
    let sequencer = BuildSequencer::new(options.build_number.as_deref())
        .context("Invalid build number override")?;
    let policy = if options.full_history {
        FirstScanPolicy::FullHistory
    } else {
        FirstScanPolicy::NewestOnly
    };

    let workspace = AgentWorkspace::prepare(&options.workdir, options.keep_clone)?;
    let executor = Arc::new(JfrogCliExecutor::new(
        workspace.clone_dir(),
        config.build_command.clone(),
    ));

    let result = async {
        let repo = GitRepository::clone_from(
            &config.vcs.url,
            workspace.clone_dir(),
            config.vcs_credentials().as_ref(),
        )
        .context("Failed to clone the project")?;

        executor
            .setup_server(&config.server_details())
            .await
            .context("Failed to configure the Artifactory server")?;
        executor
            .configure_tools(&config.jfrog.repositories)
            .await
            .context("Failed to configure build tools")?;

        let store = ArtifactoryRecordStore::new(config.artifactory())?;
        let mut driver = ScanDriver::new(repo, Arc::new(store), executor.clone())
            .with_resolver(CommitResolver::new(policy))
            .with_sequencer(sequencer)
            .with_vcs_url(config.vcs.url.clone());

        Ok::<_, anyhow::Error>(
            ScanRun::new(targets)
                .fail_fast(options.fail_fast)
                .execute(&mut driver)
                .await,
        )
    }
    .await;

    if let Err(e) = executor.delete_server().await {
        warn!(error = %e, "Failed to delete the Artifactory server configuration");
    }
    workspace.cleanup();
    result
}
