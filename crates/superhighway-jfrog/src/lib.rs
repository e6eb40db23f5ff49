//! JFrog integration for superhighway
//!
//! - [`JfrogCliExecutor`]: runs the build command and `jfrog rt bag/bp/bs`
//! - [`ArtifactoryRecordStore`]: finds the latest published build-info
//! - [`BuildTool`]: Maven, Gradle and npm configuration commands

pub mod artifactory;
pub mod error;
pub mod executor;
pub mod runner;
pub mod tool;

pub use artifactory::{latest_build_info_query, ArtifactoryConfig, ArtifactoryRecordStore};
pub use error::{JfrogError, Result};
pub use executor::{JfrogCliExecutor, ServerDetails, SERVER_ID};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use tool::BuildTool;
