//! External build-tool pipeline steps.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{BuildIdentity, StepError};

/// One step of a commit's pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Run the project's build command.
    Build,

    /// Attach VCS details (url, revision) to the build.
    CollectVcs,

    /// Publish build-info to the artifact store.
    Publish,

    /// Scan the published build.
    Scan,
}

impl PipelineStep {
    /// All steps, in the order the driver runs them.
    pub const ALL: [PipelineStep; 4] = [
        PipelineStep::Build,
        PipelineStep::CollectVcs,
        PipelineStep::Publish,
        PipelineStep::Scan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::Build => "build",
            PipelineStep::CollectVcs => "collect_vcs",
            PipelineStep::Publish => "publish",
            PipelineStep::Scan => "scan",
        }
    }

    /// Whether a failure of this step only costs the current commit.
    ///
    /// A failed build leaves nothing behind in the artifact store. The later
    /// steps would leave a half-published build, so they abort the branch.
    pub fn is_commit_local(&self) -> bool {
        matches!(self, PipelineStep::Build)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pass-through to the external build tool.
///
/// Every call receives the identity of the commit being processed; the
/// executor keeps no per-commit state between calls.
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn run_build(&self, identity: &BuildIdentity) -> Result<(), StepError>;

    async fn collect_vcs_metadata(&self, identity: &BuildIdentity) -> Result<(), StepError>;

    async fn publish(&self, identity: &BuildIdentity) -> Result<(), StepError>;

    async fn scan(&self, identity: &BuildIdentity) -> Result<(), StepError>;
}

/// Dispatch `step` to the matching executor call.
pub async fn run_step(
    executor: &dyn BuildExecutor,
    step: PipelineStep,
    identity: &BuildIdentity,
) -> Result<(), StepError> {
    match step {
        PipelineStep::Build => executor.run_build(identity).await,
        PipelineStep::CollectVcs => executor.collect_vcs_metadata(identity).await,
        PipelineStep::Publish => executor.publish(identity).await,
        PipelineStep::Scan => executor.scan(identity).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_build_is_commit_local() {
        assert!(PipelineStep::Build.is_commit_local());
        assert!(!PipelineStep::CollectVcs.is_commit_local());
        assert!(!PipelineStep::Publish.is_commit_local());
        assert!(!PipelineStep::Scan.is_commit_local());
    }

    #[test]
    fn steps_are_ordered_build_first() {
        assert_eq!(PipelineStep::ALL[0], PipelineStep::Build);
        assert_eq!(PipelineStep::ALL[3], PipelineStep::Scan);
    }

    #[test]
    fn step_names_are_snake_case() {
        assert_eq!(PipelineStep::CollectVcs.to_string(), "collect_vcs");
        let json = serde_json::to_string(&PipelineStep::CollectVcs).unwrap();
        assert_eq!(json, "\"collect_vcs\"");
    }
}
