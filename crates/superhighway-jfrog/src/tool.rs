//! Build tools the JFrog CLI can be configured for.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A package manager whose resolution and deployment are routed through
/// Artifactory. Keys of the `jfrog.repositories` map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum BuildTool {
    /// jfrog rt mvnc
    #[serde(alias = "mvn")]
    Maven,

    /// jfrog rt gradlec
    Gradle,

    /// jfrog rt npmc
    Npm,
}

impl BuildTool {
    pub const ALL: [BuildTool; 3] = [BuildTool::Maven, BuildTool::Gradle, BuildTool::Npm];

    pub fn name(&self) -> &'static str {
        match self {
            BuildTool::Maven => "maven",
            BuildTool::Gradle => "gradle",
            BuildTool::Npm => "npm",
        }
    }

    /// The `jfrog rt` sub-command that writes this tool's configuration.
    pub fn config_command(&self) -> &'static str {
        match self {
            BuildTool::Maven => "mvnc",
            BuildTool::Gradle => "gradlec",
            BuildTool::Npm => "npmc",
        }
    }

    /// Arguments after `jfrog`, resolving from and deploying to `repo` on
    /// `server_id`.
    pub fn configure_args(&self, server_id: &str, repo: &str) -> Vec<String> {
        let mut args = vec![
            "rt".to_string(),
            self.config_command().to_string(),
            "--global".to_string(),
            format!("--server-id-resolve={server_id}"),
            format!("--server-id-deploy={server_id}"),
        ];
        match self {
            BuildTool::Maven => args.extend([
                format!("--repo-resolve-releases={repo}"),
                format!("--repo-resolve-snapshots={repo}"),
                format!("--repo-deploy-releases={repo}"),
                format!("--repo-deploy-snapshots={repo}"),
            ]),
            BuildTool::Gradle | BuildTool::Npm => args.extend([
                format!("--repo-resolve={repo}"),
                format!("--repo-deploy={repo}"),
            ]),
        }
        args
    }
}

impl fmt::Display for BuildTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
