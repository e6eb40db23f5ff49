//! Per-commit build identity.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A stamped build number, rendered as `{base}.{index}-{short_hash}`.
///
/// `base` is shared by every commit resolved in one branch pass and `index`
/// is the commit's position in that pass, so ordering is by `(base, index)`.
/// The hash suffix keeps the string unique per commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildNumber {
    pub base: u64,
    pub index: usize,
    pub short_hash: String,
}

impl BuildNumber {
    pub fn new(base: u64, index: usize, short_hash: impl Into<String>) -> Self {
        Self {
            base,
            index,
            short_hash: short_hash.into(),
        }
    }
}

impl Ord for BuildNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.base, self.index, &self.short_hash).cmp(&(other.base, other.index, &other.short_hash))
    }
}

impl PartialOrd for BuildNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}-{}", self.base, self.index, self.short_hash)
    }
}

/// Identity stamped on one commit's build.
///
/// Created by the sequencer, handed by reference to every pipeline step of
/// that commit and dropped when the commit is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdentity {
    pub build_name: String,
    pub build_number: BuildNumber,
    pub commit_short_hash: String,
    pub sequence_index: usize,
}

impl BuildIdentity {
    /// `build_name/build_number`, the way build-info is addressed.
    pub fn label(&self) -> String {
        format!("{}/{}", self.build_name, self.build_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_number_renders_base_index_and_hash() {
        let number = BuildNumber::new(18, 1, "c3c3c3c3");
        assert_eq!(number.to_string(), "18.1-c3c3c3c3");
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        let ninth = BuildNumber::new(4, 9, "ffffffff");
        let tenth = BuildNumber::new(4, 10, "00000000");
        assert!(ninth < tenth);
        assert!(ninth.to_string() > tenth.to_string());

        let next_base = BuildNumber::new(5, 0, "00000000");
        assert!(tenth < next_base);
    }

    #[test]
    fn label_joins_name_and_number() {
        let identity = BuildIdentity {
            build_name: "proj-main".to_string(),
            build_number: BuildNumber::new(2, 0, "abcdef12"),
            commit_short_hash: "abcdef12".to_string(),
            sequence_index: 0,
        };
        assert_eq!(identity.label(), "proj-main/2.0-abcdef12");
    }
}
