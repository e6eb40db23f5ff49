//! Build record lookup.

use async_trait::async_trait;

use crate::domain::{BuildRecord, RecordStoreError};

/// Source of previously published build records.
///
/// Inject the Artifactory client in production, or
/// [`crate::fakes::MemoryBuildRecordStore`] in tests.
#[async_trait]
pub trait BuildRecordStore: Send + Sync {
    /// The most recently published record for `build_name`.
    ///
    /// `Ok(None)` means the build was never published; callers treat that as
    /// "no prior revision", never as a failure.
    async fn fetch_latest(&self, build_name: &str)
        -> Result<Option<BuildRecord>, RecordStoreError>;
}
