use std::fmt;

use serde::{Deserialize, Serialize};

/// How a candidate file name is compared against a match target.
///
/// All comparisons are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    Prefix,
    Substring,
    #[default]
    All,
}

impl MatchMode {
    /// Parses a user or definition supplied mode. Unknown values fall back to
    /// [`MatchMode::All`].
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" => Self::Exact,
            "prefix" => Self::Prefix,
            "substring" => Self::Substring,
            _ => Self::All,
        }
    }

    /// Tests an already lowercased candidate against an already lowercased target.
    pub fn matches_folded(self, candidate: &str, target: &str) -> bool {
        if target.is_empty() {
            return false;
        }
        match self {
            Self::Exact => candidate == target,
            Self::Prefix => candidate.starts_with(target),
            Self::Substring => candidate.contains(target),
            Self::All => {
                candidate == target || candidate.starts_with(target) || candidate.contains(target)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Substring => "substring",
            Self::All => "all",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
