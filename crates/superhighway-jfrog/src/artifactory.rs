//! Artifactory build-info lookup
//!
//! Published build-info documents live in the `artifactory-build-info`
//! repository under one folder per build name. The newest one is found with
//! an AQL query sorted by creation time and then downloaded as JSON.

use async_trait::async_trait;
use serde::Deserialize;
use superhighway_core::{BuildRecord, BuildRecordStore, RecordStoreError};
use tracing::{debug, info};

use crate::error::{JfrogError, Result};

/// Repository Artifactory stores build-info documents in.
pub const BUILD_INFO_REPO: &str = "artifactory-build-info";

/// Connection settings for an Artifactory instance.
#[derive(Debug, Clone)]
pub struct ArtifactoryConfig {
    /// Base URL, e.g. `https://acme.jfrog.io/artifactory`
    pub url: String,
    pub user: String,
    pub password: String,
}

impl ArtifactoryConfig {
    pub fn new(url: &str, user: &str, password: &str) -> Self {
        ArtifactoryConfig {
            url: url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AqlResponse {
    #[serde(default)]
    results: Vec<AqlItem>,
}

#[derive(Debug, Deserialize)]
struct AqlItem {
    repo: String,
    path: String,
    name: String,
}

impl AqlItem {
    fn relative_path(&self) -> String {
        if self.path.is_empty() || self.path == "." {
            format!("{}/{}", self.repo, self.name)
        } else {
            format!("{}/{}/{}", self.repo, self.path, self.name)
        }
    }
}

/// AQL query selecting the newest build-info document of `build_name`.
pub fn latest_build_info_query(build_name: &str) -> String {
    let criteria = serde_json::json!({
        "repo": BUILD_INFO_REPO,
        "path": build_name,
    });
    format!(
        "items.find({criteria}).include(\"repo\",\"path\",\"name\",\"created\").sort({{\"$desc\":[\"created\"]}}).limit(1)"
    )
}

/// [`BuildRecordStore`] backed by Artifactory's REST API.
pub struct ArtifactoryRecordStore {
    config: ArtifactoryConfig,
    http_client: reqwest::Client,
}

impl ArtifactoryRecordStore {
    pub fn new(config: ArtifactoryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("superhighway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ArtifactoryRecordStore {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ArtifactoryConfig {
        &self.config
    }

    /// Repository path of the newest build-info document, if any.
    pub async fn latest_build_info_path(&self, build_name: &str) -> Result<Option<String>> {
        let url = format!("{}/api/search/aql", self.config.url);
        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(latest_build_info_query(build_name))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(JfrogError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let body = response.bytes().await?;
        let parsed: AqlResponse = serde_json::from_slice(&body)?;
        Ok(parsed.results.first().map(AqlItem::relative_path))
    }

    /// Download and decode one build-info document.
    pub async fn download_build_info(&self, path: &str) -> Result<Option<BuildRecord>> {
        let url = format!("{}/{}", self.config.url, path);
        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Deleted between the search and the download.
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(JfrogError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let body = response.bytes().await?;
        Ok(Some(BuildRecord::from_json(&body)?))
    }
}

#[async_trait]
impl BuildRecordStore for ArtifactoryRecordStore {
    async fn fetch_latest(
        &self,
        build_name: &str,
    ) -> std::result::Result<Option<BuildRecord>, RecordStoreError> {
        info!(build_name = %build_name, "Searching the latest build...");
        let Some(path) = self.latest_build_info_path(build_name).await? else {
            info!(build_name = %build_name, "Build is not found in Artifactory");
            return Ok(None);
        };
        debug!(path = %path, "Downloading build-info");
        let record = self.download_build_info(&path).await?;
        if let Some(record) = &record {
            info!(build_name = %build_name, number = %record.number, "Found latest build");
        }
        Ok(record)
    }
}
