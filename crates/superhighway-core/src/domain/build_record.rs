//! Published build records.

use serde::{Deserialize, Serialize};

/// A revision of one repository that took part in a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRevision {
    /// Source URL of the repository.
    #[serde(default)]
    pub url: String,

    /// Commit the build was produced from.
    pub revision: String,
}

/// The most recently published build for a build name.
///
/// Mirrors the subset of Artifactory build-info the agent relies on; unknown
/// fields in the stored document are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Logical build name.
    pub name: String,

    /// Build number string, e.g. `17.0-aaaa1111`.
    pub number: String,

    /// Start timestamp as recorded by the publisher (opaque).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,

    /// Revisions the build was produced from, one per repository.
    #[serde(default, rename = "vcs")]
    pub vcs: Vec<VcsRevision>,
}

impl BuildRecord {
    /// Record for a single repository, as written by `jfrog rt bag`.
    pub fn new(
        name: impl Into<String>,
        number: impl Into<String>,
        url: &str,
        revision: &str,
    ) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
            started: None,
            vcs: vec![VcsRevision {
                url: url.to_string(),
                revision: revision.to_string(),
            }],
        }
    }

    /// Decode a build-info JSON document.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Revision recorded for the repository at `vcs_url`.
    ///
    /// URLs are compared after dropping a trailing `/` and `.git`, so
    /// `https://host/org/repo.git` and `https://host/org/repo/` are the same
    /// repository.
    pub fn revision_for(&self, vcs_url: &str) -> Option<&str> {
        let wanted = normalize_url(vcs_url);
        self.vcs
            .iter()
            .find(|vcs| normalize_url(&vcs.url) == wanted)
            .map(|vcs| vcs.revision.as_str())
            .filter(|revision| !revision.trim().is_empty())
    }

    /// Revision of the first recorded repository, for records written by a
    /// single-repository build.
    pub fn primary_revision(&self) -> Option<&str> {
        self.vcs
            .first()
            .map(|vcs| vcs.revision.as_str())
            .filter(|revision| !revision.trim().is_empty())
    }
}

fn normalize_url(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url)
}
