//! Agent configuration.
//!
//! Read from the base64-encoded YAML in `SUPERHIGHWAY_CONFIG` when set,
//! otherwise from a YAML file (default `agent_home/config/config.yaml`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use superhighway_core::{BranchTarget, Credentials};
use superhighway_jfrog::{ArtifactoryConfig, BuildTool, ServerDetails};
use tracing::info;

/// Environment variable holding base64-encoded YAML configuration.
pub const CONFIG_ENV: &str = "SUPERHIGHWAY_CONFIG";

/// Default configuration file, relative to the working directory.
pub fn default_config_path() -> PathBuf {
    Path::new("agent_home").join("config").join("config.yaml")
}

/// Build name template used when `jfrog.buildName` is not set.
pub const DEFAULT_BUILD_NAME: &str = "${projectName}-${branch}";

/// Contents of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub project_name: String,

    /// Shell command that builds the project, run from the clone root.
    pub build_command: String,

    pub vcs: VcsConfig,

    pub jfrog: JfrogConfig,
}

/// Repository to clone and the branches to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcsConfig {
    pub url: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Access token; preferred over `password` when both are set.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub branches: Vec<String>,
}

/// Artifactory server, per-tool repositories and build naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JfrogConfig {
    pub art_url: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub repositories: BTreeMap<BuildTool, String>,

    /// Supports `${projectName}` and `${branch}`.
    #[serde(default = "default_build_name")]
    pub build_name: String,
}

fn default_build_name() -> String {
    DEFAULT_BUILD_NAME.to_string()
}

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to decode environment variable 'SUPERHIGHWAY_CONFIG': {0}")]
    Decode(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Branch '{0}' is not listed in vcs.branches")]
    UnknownBranch(String),
}

impl BuildConfig {
    /// Load from [`CONFIG_ENV`] if set, else from `path` (or the default
    /// path), then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(CONFIG_ENV).ok();
        let default_path = default_config_path();
        Self::from_sources(from_env.as_deref(), path.unwrap_or(&default_path))
    }

    /// A non-blank `encoded` value wins over the file at `path`.
    pub fn from_sources(encoded: Option<&str>, path: &Path) -> Result<Self, ConfigError> {
        let config = match encoded.map(str::trim).filter(|v| !v.is_empty()) {
            Some(encoded) => {
                info!("Loading configuration from {}", CONFIG_ENV);
                Self::from_base64(encoded)?
            }
            None => {
                info!(path = %path.display(), "Loading configuration file");
                Self::from_file(path)?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.display().to_string(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ConfigError::Decode(e.to_string()))?;
        let yaml = String::from_utf8(bytes).map_err(|e| ConfigError::Decode(e.to_string()))?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject configurations the agent cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("projectName", &self.project_name),
            ("buildCommand", &self.build_command),
            ("vcs.url", &self.vcs.url),
            ("jfrog.artUrl", &self.jfrog.art_url),
            ("jfrog.buildName", &self.jfrog.build_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("'{field}' must be set")));
            }
        }
        if self.vcs.branches.is_empty() {
            return Err(ConfigError::Invalid(
                "'vcs.branches' must list at least one branch".to_string(),
            ));
        }
        Ok(())
    }

    /// Build name for `branch`, with `${projectName}` and `${branch}`
    /// substituted.
    pub fn build_name_for(&self, branch: &str) -> String {
        self.jfrog
            .build_name
            .replace("${projectName}", &self.project_name)
            .replace("${branch}", branch)
    }

    /// Branches to scan, in configuration order, optionally narrowed to
    /// `only`.
    pub fn targets(&self, only: &[String]) -> Result<Vec<BranchTarget>, ConfigError> {
        if let Some(unknown) = only.iter().find(|b| !self.vcs.branches.contains(b)) {
            return Err(ConfigError::UnknownBranch(unknown.clone()));
        }
        Ok(self
            .vcs
            .branches
            .iter()
            .filter(|b| only.is_empty() || only.contains(b))
            .map(|b| {
                let build_name = self.build_name_for(b);
                info!(branch = %b, build_name = %build_name, "Associated branch build name");
                BranchTarget::new(b.clone(), build_name)
            })
            .collect())
    }

    /// Clone credentials; the token wins over the password.
    pub fn vcs_credentials(&self) -> Option<Credentials> {
        let secret = if !self.vcs.token.is_empty() {
            &self.vcs.token
        } else if !self.vcs.password.is_empty() {
            &self.vcs.password
        } else {
            return None;
        };
        Some(Credentials {
            user: self.vcs.user.clone(),
            secret: secret.clone(),
        })
    }

    pub fn artifactory(&self) -> ArtifactoryConfig {
        ArtifactoryConfig::new(&self.jfrog.art_url, &self.jfrog.user, &self.jfrog.password)
    }

    pub fn server_details(&self) -> ServerDetails {
        ServerDetails {
            url: self.jfrog.art_url.clone(),
            user: self.jfrog.user.clone(),
            password: self.jfrog.password.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
projectName: npm-example
buildCommand: npm i
vcs:
  url: https://github.com/acme/npm-example.git
  user: test
  password: ""
  token: 7e272967ada4d4be4920c1bd7ac0fd988a77e72b
  branches:
  - main
  - dev
jfrog:
  artUrl: http://localhost:8080/artifactory/
  user: admin
  password: password
  repositories:
    npm: npm-virtual
    mvn: mvn-virtual
    gradle: gradle-virtual
  buildName: ${projectName}-${branch}
"#;

    fn expected() -> BuildConfig {
        BuildConfig {
            project_name: "npm-example".to_string(),
            build_command: "npm i".to_string(),
            vcs: VcsConfig {
                url: "https://github.com/acme/npm-example.git".to_string(),
                user: "test".to_string(),
                password: String::new(),
                token: "7e272967ada4d4be4920c1bd7ac0fd988a77e72b".to_string(),
                branches: vec!["main".to_string(), "dev".to_string()],
            },
            jfrog: JfrogConfig {
                art_url: "http://localhost:8080/artifactory/".to_string(),
                user: "admin".to_string(),
                password: "password".to_string(),
                repositories: BTreeMap::from([
                    (BuildTool::Npm, "npm-virtual".to_string()),
                    (BuildTool::Maven, "mvn-virtual".to_string()),
                    (BuildTool::Gradle, "gradle-virtual".to_string()),
                ]),
                build_name: "${projectName}-${branch}".to_string(),
            },
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = BuildConfig::from_sources(None, &path).unwrap();
        assert_eq!(config, expected());
    }

    #[test]
    fn test_env_value_wins_over_file() {
        let encoded = STANDARD.encode(SAMPLE);
        let missing = Path::new("/definitely/not/here/config.yaml");

        let config = BuildConfig::from_sources(Some(encoded.as_str()), missing).unwrap();
        assert_eq!(config, expected());
    }

    #[test]
    fn test_blank_env_value_falls_back_to_file() {
        let err =
            BuildConfig::from_sources(Some("  "), Path::new("/nope/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }

    #[test]
    fn test_bad_base64_is_a_decode_error() {
        let err = BuildConfig::from_base64("not base64!").unwrap_err();
        assert!(matches!(err, ConfigError::Decode(_)));
        assert!(err.to_string().contains(CONFIG_ENV));
    }

    #[test]
    fn test_build_name_template() {
        let config = expected();
        assert_eq!(config.build_name_for("dev"), "npm-example-dev");
    }

    #[test]
    fn test_build_name_defaults_when_omitted() {
        let yaml = SAMPLE.replace("  buildName: ${projectName}-${branch}\n", "");
        let config = BuildConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.jfrog.build_name, DEFAULT_BUILD_NAME);
    }

    #[test]
    fn test_targets_keep_config_order_and_filter() {
        let config = expected();
        let all = config.targets(&[]).unwrap();
        assert_eq!(
            all,
            vec![
                BranchTarget::new("main", "npm-example-main"),
                BranchTarget::new("dev", "npm-example-dev"),
            ]
        );

        let dev = config.targets(&["dev".to_string()]).unwrap();
        assert_eq!(dev, vec![BranchTarget::new("dev", "npm-example-dev")]);

        let err = config.targets(&["feature".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBranch(_)));
    }

    #[test]
    fn test_token_wins_over_password() {
        let mut config = expected();
        config.vcs.password = "pw".to_string();
        assert_eq!(config.vcs_credentials().unwrap().secret, config.vcs.token);

        config.vcs.token.clear();
        assert_eq!(config.vcs_credentials().unwrap().secret, "pw");

        config.vcs.password.clear();
        assert!(config.vcs_credentials().is_none());
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let mut config = expected();
        config.vcs.branches.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = expected();
        config.build_command = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buildCommand"));
    }

    #[test]
    fn test_unknown_repository_key_is_a_parse_error() {
        let yaml = SAMPLE.replace("npm: npm-virtual", "pip: pip-virtual");
        assert!(matches!(
            BuildConfig::from_yaml(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }
}
