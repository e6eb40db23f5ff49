//! Domain models for superhighway.
//!
//! Canonical definitions for the core entities:
//! - `Commit`: An immutable commit read from a branch's history
//! - `BuildRecord`: The latest published build for a build name
//! - `BuildNumber` / `BuildIdentity`: Per-commit build stamp
//! - `ResolutionResult`: Commits a branch still has to scan

pub mod build_record;
pub mod commit;
pub mod error;
pub mod identity;
pub mod resolution;

// Re-export main types and errors
pub use build_record::{BuildRecord, VcsRevision};
pub use commit::{Commit, CommitHash, SHORT_HASH_LEN};
pub use error::{HistoryError, ParseError, RecordStoreError, ScanError, StepError};
pub use identity::{BuildIdentity, BuildNumber};
pub use resolution::{FallbackReason, ResolutionKind, ResolutionResult};
