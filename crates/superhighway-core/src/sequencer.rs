//! Build-number sequencing.
//!
//! Every commit resolved for a branch gets `{base}.{index}-{short_hash}`:
//! `base` is one more than the base of the last published build (or the
//! external override, once per run), `index` is the commit's position in the
//! resolution result.

use tracing::{debug, info};

use crate::domain::{BuildIdentity, BuildNumber, Commit, ParseError};

/// Base used when a build name has never been published.
pub const FIRST_BASE: u64 = 1;

/// Compute the stamped build number for one commit.
///
/// `external_override` wins over `previous_build_number` when set.
pub fn next_build_number(
    previous_build_number: Option<&str>,
    external_override: Option<&str>,
    run_sequence_index: usize,
    commit_short_hash: &str,
) -> Result<String, ParseError> {
    let base = match external_override {
        Some(value) => parse_override(value)?,
        None => next_base(previous_build_number)?,
    };
    Ok(BuildNumber::new(base, run_sequence_index, commit_short_hash).to_string())
}

/// One more than the integer before the first `.` of `previous`.
///
/// `None` (never published) starts at [`FIRST_BASE`]. Anything that is not
/// `<digits>.<rest>` is rejected rather than guessed at.
pub fn next_base(previous: Option<&str>) -> Result<u64, ParseError> {
    let Some(previous) = previous else {
        return Ok(FIRST_BASE);
    };
    let (prefix, _) = previous
        .split_once('.')
        .ok_or_else(|| ParseError::MissingSeparator {
            value: previous.to_string(),
        })?;
    let base = parse_digits(prefix).ok_or_else(|| ParseError::NonNumericPrefix {
        value: previous.to_string(),
    })?;
    base.checked_add(1).ok_or_else(|| ParseError::Overflow {
        value: previous.to_string(),
    })
}

/// Parse an externally supplied base, used verbatim.
pub fn parse_override(value: &str) -> Result<u64, ParseError> {
    parse_digits(value.trim()).ok_or_else(|| ParseError::InvalidOverride {
        value: value.to_string(),
    })
}

fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Hands out build-number bases for the branches of one run.
///
/// The external override is consulted for the first branch pass that has
/// work and then dropped, so it pins exactly one base per process.
#[derive(Debug, Clone, Default)]
pub struct BuildSequencer {
    external_override: Option<u64>,
}

impl BuildSequencer {
    /// Validate the override once; blank counts as unset.
    pub fn new(external_override: Option<&str>) -> Result<Self, ParseError> {
        let external_override = external_override
            .filter(|value| !value.trim().is_empty())
            .map(parse_override)
            .transpose()?;
        Ok(Self { external_override })
    }

    /// Whether the override is still waiting to be used.
    pub fn has_pending_override(&self) -> bool {
        self.external_override.is_some()
    }

    /// Start numbering a branch pass for `build_name`.
    pub fn start_branch(
        &mut self,
        build_name: &str,
        previous_build_number: Option<&str>,
    ) -> Result<BranchSequence, ParseError> {
        let base = match self.external_override.take() {
            Some(base) => {
                info!(build_name = %build_name, base, "Using external build number override");
                base
            }
            None => next_base(previous_build_number)?,
        };
        debug!(
            build_name = %build_name,
            previous = previous_build_number.unwrap_or("<none>"),
            base,
            "Derived build number base"
        );
        Ok(BranchSequence {
            build_name: build_name.to_string(),
            base,
        })
    }
}

/// Numbering for the commits of one branch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSequence {
    build_name: String,
    base: u64,
}

impl BranchSequence {
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn build_name(&self) -> &str {
        &self.build_name
    }

    /// Identity for the commit at `index` of the resolution result.
    pub fn identity(&self, index: usize, commit: &Commit) -> BuildIdentity {
        let short = commit.short_hash().to_string();
        BuildIdentity {
            build_name: self.build_name.clone(),
            build_number: BuildNumber::new(self.base, index, short.clone()),
            commit_short_hash: short,
            sequence_index: index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::synthetic_commit;

    #[test]
    fn scenario_d_numbers_share_incremented_base() {
        let c2 = synthetic_commit("c2");
        let c3 = synthetic_commit("c3");
        let mut sequencer = BuildSequencer::new(None).unwrap();
        let sequence = sequencer
            .start_branch("proj-main", Some("17.0-aaaa1111"))
            .unwrap();

        let first = sequence.identity(0, &c2);
        let second = sequence.identity(1, &c3);
        assert_eq!(
            first.build_number.to_string(),
            format!("18.0-{}", c2.short_hash())
        );
        assert_eq!(
            second.build_number.to_string(),
            format!("18.1-{}", c3.short_hash())
        );
        assert!(first.build_number < second.build_number);
    }

    #[test]
    fn next_build_number_matches_sequence_identity() {
        let number = next_build_number(Some("17.0-aaaa1111"), None, 1, "c3c3c3c3").unwrap();
        assert_eq!(number, "18.1-c3c3c3c3");
    }

    #[test]
    fn next_build_number_prefers_override() {
        let number = next_build_number(Some("17.0-aaaa1111"), Some("42"), 0, "abcdef12").unwrap();
        assert_eq!(number, "42.0-abcdef12");
    }

    #[test]
    fn non_numeric_prefix_is_a_parse_error() {
        let err = next_build_number(Some("abc.3"), None, 0, "abcdef12").unwrap_err();
        assert_eq!(
            err,
            ParseError::NonNumericPrefix {
                value: "abc.3".to_string()
            }
        );
    }

    #[test]
    fn missing_separator_is_a_parse_error() {
        let err = next_base(Some("17")).unwrap_err();
        assert!(matches!(err, ParseError::MissingSeparator { .. }));
    }

    #[test]
    fn signed_and_empty_prefixes_are_rejected() {
        assert!(next_base(Some("+5.0-x")).is_err());
        assert!(next_base(Some("-5.0-x")).is_err());
        assert!(next_base(Some(".0-x")).is_err());
    }

    #[test]
    fn overflow_is_reported() {
        let previous = format!("{}.0-x", u64::MAX);
        assert!(matches!(
            next_base(Some(&previous)),
            Err(ParseError::Overflow { .. })
        ));
    }

    #[test]
    fn never_published_starts_at_first_base() {
        assert_eq!(next_base(None).unwrap(), FIRST_BASE);
    }

    #[test]
    fn invalid_override_is_rejected_up_front() {
        let err = BuildSequencer::new(Some("12a")).unwrap_err();
        assert!(matches!(err, ParseError::InvalidOverride { .. }));
        assert!(!BuildSequencer::new(Some("  ")).unwrap().has_pending_override());
    }

    #[test]
    fn override_is_consumed_by_the_first_branch_only() {
        let mut sequencer = BuildSequencer::new(Some("100")).unwrap();
        assert!(sequencer.has_pending_override());

        let main = sequencer.start_branch("proj-main", Some("7.2-aaaa1111")).unwrap();
        assert_eq!(main.base(), 100);
        assert!(!sequencer.has_pending_override());

        let dev = sequencer.start_branch("proj-dev", Some("7.2-aaaa1111")).unwrap();
        assert_eq!(dev.base(), 8);
    }

    #[test]
    fn distinct_commits_get_distinct_numbers_under_one_base() {
        let sequence = BuildSequencer::new(None)
            .unwrap()
            .start_branch("b", Some("3.0-x"))
            .unwrap();
        let numbers: Vec<String> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, l)| sequence.identity(i, &synthetic_commit(l)).build_number.to_string())
            .collect();
        let unique: std::collections::HashSet<_> = numbers.iter().collect();
        assert_eq!(unique.len(), numbers.len());
    }

    #[test]
    fn numbers_increase_with_index() {
        let sequence = BuildSequencer::new(None)
            .unwrap()
            .start_branch("b", Some("3.0-x"))
            .unwrap();
        let commit = synthetic_commit("same");
        let numbers: Vec<BuildNumber> = (0..12)
            .map(|i| sequence.identity(i, &commit).build_number)
            .collect();
        assert!(numbers.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
