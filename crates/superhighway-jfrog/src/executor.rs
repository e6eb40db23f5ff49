//! Pipeline steps backed by the JFrog CLI.
//!
//! Build name and number reach the CLI through `JFROG_CLI_BUILD_NAME` and
//! `JFROG_CLI_BUILD_NUMBER`, set on each child command only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use superhighway_core::{BuildExecutor, BuildIdentity, StepError};
use tracing::info;

use crate::error::Result;
use crate::runner::{CommandRunner, CommandSpec, ProcessRunner};
use crate::tool::BuildTool;

/// Server id the agent registers with the JFrog CLI.
pub const SERVER_ID: &str = "vcs-superhighway";

pub const BUILD_NAME_ENV: &str = "JFROG_CLI_BUILD_NAME";
pub const BUILD_NUMBER_ENV: &str = "JFROG_CLI_BUILD_NUMBER";

/// Default per-command timeout, generous enough for a cold dependency cache.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Artifactory server registered with the CLI.
#[derive(Debug, Clone)]
pub struct ServerDetails {
    pub url: String,
    pub user: String,
    pub password: String,
}

/// [`BuildExecutor`] that shells out to the project's build command and to
/// `jfrog rt bag/bp/bs`.
pub struct JfrogCliExecutor {
    cli: String,
    server_id: String,
    project_dir: PathBuf,
    build_command: String,
    timeout_secs: u64,
    runner: Arc<dyn CommandRunner>,
}

impl JfrogCliExecutor {
    pub fn new(project_dir: impl Into<PathBuf>, build_command: impl Into<String>) -> Self {
        Self {
            cli: "jfrog".to_string(),
            server_id: SERVER_ID.to_string(),
            project_dir: project_dir.into(),
            build_command: build_command.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            runner: Arc::new(ProcessRunner),
        }
    }

    /// Path or name of the `jfrog` binary.
    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.cli = cli.into();
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Register the Artifactory server under [`SERVER_ID`].
    pub async fn setup_server(&self, server: &ServerDetails) -> Result<()> {
        info!(url = %server.url, "Setting up Artifactory server on agent");
        let spec = self.cli_command([
            "rt".to_string(),
            "c".to_string(),
            self.server_id.clone(),
            "--interactive=false".to_string(),
            format!("--url={}", server.url),
            format!("--user={}", server.user),
            format!("--password={}", server.password),
        ]);
        self.runner.run(&spec).await?;
        Ok(())
    }

    /// Point every configured build tool at its Artifactory repository.
    pub async fn configure_tools(&self, repositories: &BTreeMap<BuildTool, String>) -> Result<()> {
        for (tool, repo) in repositories {
            info!(tool = %tool, repo = %repo, "Configuring build tool");
            let spec = self
                .cli_command(tool.configure_args(&self.server_id, repo))
                .current_dir(&self.project_dir);
            self.runner.run(&spec).await?;
        }
        Ok(())
    }

    /// Remove the server registered by [`Self::setup_server`].
    pub async fn delete_server(&self) -> Result<()> {
        let spec = self.cli_command([
            "rt".to_string(),
            "c".to_string(),
            "delete".to_string(),
            self.server_id.clone(),
            "--interactive=false".to_string(),
        ]);
        self.runner.run(&spec).await?;
        Ok(())
    }

    fn cli_command<I>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = String>,
    {
        CommandSpec::new(self.cli.clone(), args).timeout_secs(self.timeout_secs)
    }

    /// `jfrog rt <sub> --server-id=…` stamped with `identity`.
    fn build_info_command(&self, sub: &str, identity: &BuildIdentity) -> CommandSpec {
        stamp(
            self.cli_command([
                "rt".to_string(),
                sub.to_string(),
                format!("--server-id={}", self.server_id),
            ]),
            identity,
        )
        .current_dir(&self.project_dir)
    }
}

fn stamp(spec: CommandSpec, identity: &BuildIdentity) -> CommandSpec {
    spec.env(BUILD_NAME_ENV, identity.build_name.clone())
        .env(BUILD_NUMBER_ENV, identity.build_number.to_string())
}

#[async_trait]
impl BuildExecutor for JfrogCliExecutor {
    async fn run_build(&self, identity: &BuildIdentity) -> std::result::Result<(), StepError> {
        info!(command = %self.build_command, build = %identity.label(), "Executing build command");
        let spec = stamp(CommandSpec::shell(&self.build_command), identity)
            .current_dir(&self.project_dir)
            .timeout_secs(self.timeout_secs);
        self.runner.run(&spec).await.map(drop)
    }

    async fn collect_vcs_metadata(
        &self,
        identity: &BuildIdentity,
    ) -> std::result::Result<(), StepError> {
        info!("Collecting VCS details...");
        let spec = self.build_info_command("bag", identity);
        self.runner.run(&spec).await.map(drop)
    }

    async fn publish(&self, identity: &BuildIdentity) -> std::result::Result<(), StepError> {
        info!(build = %identity.label(), "Publishing the build to Artifactory...");
        let spec = self.build_info_command("bp", identity);
        self.runner.run(&spec).await.map(drop)
    }

    async fn scan(&self, identity: &BuildIdentity) -> std::result::Result<(), StepError> {
        info!(build = %identity.label(), "Scanning the published build with Xray...");
        let spec = self.build_info_command("bs", identity);
        self.runner.run(&spec).await.map(drop)
    }
}
