//! Size and release routing policy.

use serde::Serialize;

/// The only ONIX release that is ever split.
pub const SPLIT_RELEASE: &str = "3.0";

/// Outcome of the policy, computed once per source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDecision {
    /// Copy the file unchanged (apart from its name).
    PassThrough,
    /// Stream the file into size-bounded parts.
    Split,
}

impl SplitDecision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::Split => "split",
        }
    }
}

/// Decide whether a file is split.
///
/// Only release 3.0 files strictly larger than `max_file_size` are split;
/// every other file passes through, whatever its size.
///
/// # Examples
/// ```
/// use onix_splitter::policy::{decide, SplitDecision};
///
/// assert_eq!(decide(600, "3.0", 500), SplitDecision::Split);
/// assert_eq!(decide(500, "3.0", 500), SplitDecision::PassThrough);
/// assert_eq!(decide(600, "2.1", 500), SplitDecision::PassThrough);
/// ```
#[must_use]
pub fn decide(file_size: u64, release_version: &str, max_file_size: u64) -> SplitDecision {
    if release_version.trim() == SPLIT_RELEASE && file_size > max_file_size {
        SplitDecision::Split
    } else {
        SplitDecision::PassThrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_large_release_3_is_split() {
        assert_eq!(decide(600 * MB, "3.0", 500 * MB), SplitDecision::Split);
        assert_eq!(decide(500 * MB + 1, " 3.0 ", 500 * MB), SplitDecision::Split);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(decide(500 * MB, "3.0", 500 * MB), SplitDecision::PassThrough);
        assert_eq!(decide(500 * MB - 1, "3.0", 500 * MB), SplitDecision::PassThrough);
    }

    #[test]
    fn test_other_releases_pass_through() {
        assert_eq!(decide(10 * MB, "2.1", 500 * MB), SplitDecision::PassThrough);
        assert_eq!(decide(900 * MB, "2.1", 500 * MB), SplitDecision::PassThrough);
        assert_eq!(decide(900 * MB, "3.1", 500 * MB), SplitDecision::PassThrough);
        assert_eq!(decide(900 * MB, "3", 500 * MB), SplitDecision::PassThrough);
    }

    #[test]
    fn test_decision_as_str() {
        assert_eq!(SplitDecision::Split.as_str(), "split");
        assert_eq!(SplitDecision::PassThrough.as_str(), "pass-through");
    }
}
