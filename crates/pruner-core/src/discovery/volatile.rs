use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_ROOT: &str = "/var/folders/";
const DEFAULT_TYPE_TOKENS: &[&str] = &["c", "t", "0"];

/// Shape of the session-scoped temporary root: `<root>/<session>/<type>/<name>/...`.
///
/// The `<type>` position and tokens are not documented by the OS, so both are
/// configurable rather than guessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileLayout {
    pub root: PathBuf,
    /// Component index (relative to `root`) expected to hold the `<type>` token.
    pub preferred_type_index: usize,
    /// Lowercased tokens accepted as a `<type>` segment.
    pub type_tokens: Vec<String>,
    /// Accept any single-character segment when scanning away from the preferred index.
    pub single_char_fallback: bool,
}

impl Default for VolatileLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            preferred_type_index: 2,
            type_tokens: DEFAULT_TYPE_TOKENS.iter().map(|t| (*t).to_string()).collect(),
            single_char_fallback: true,
        }
    }
}

/// How the `<type>` segment of a volatile path was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSegment {
    Preferred(usize),
    Scanned(usize),
}

impl TypeSegment {
    pub fn index(self) -> usize {
        match self {
            Self::Preferred(idx) | Self::Scanned(idx) => idx,
        }
    }
}

impl VolatileLayout {
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    fn is_token(&self, segment: &str) -> bool {
        let folded = segment.to_lowercase();
        self.type_tokens.iter().any(|token| *token == folded)
    }

    /// Finds the `<type>` segment among `comps`, the components below the root.
    ///
    /// A segment is only reported when a candidate name follows it. Several
    /// qualifying segments away from the preferred index yield `None`.
    pub fn locate_type_segment(&self, comps: &[&str]) -> Option<TypeSegment> {
        let preferred = self.preferred_type_index;
        if let Some(segment) = comps.get(preferred) {
            if self.is_token(segment) {
                return (preferred + 1 < comps.len()).then_some(TypeSegment::Preferred(preferred));
            }
        }
        let (_, scan) = comps.split_last()?;
        let mut found = scan.iter().enumerate().filter(|(_, segment)| {
            self.is_token(segment) || (self.single_char_fallback && segment.chars().count() == 1)
        });
        let (idx, _) = found.next()?;
        if found.next().is_some() {
            return None;
        }
        Some(TypeSegment::Scanned(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_position_wins() {
        let layout = VolatileLayout::default();
        assert_eq!(
            layout.locate_type_segment(&["zz", "abc123", "C", "MyAppCache"]),
            Some(TypeSegment::Preferred(2))
        );
        assert_eq!(
            layout.locate_type_segment(&["zz", "abc123", "T", "MyAppCache", "inner"]),
            Some(TypeSegment::Preferred(2))
        );
    }

    #[test]
    fn type_segment_without_candidate_is_ignored() {
        let layout = VolatileLayout::default();
        assert_eq!(layout.locate_type_segment(&["zz", "abc123", "C"]), None);
        assert_eq!(layout.locate_type_segment(&["zz"]), None);
        assert_eq!(layout.locate_type_segment(&[]), None);
    }

    #[test]
    fn fallback_scan_accepts_a_single_qualifying_segment() {
        let layout = VolatileLayout::default();
        assert_eq!(
            layout.locate_type_segment(&["session", "X", "MyApp"]),
            Some(TypeSegment::Scanned(1))
        );
    }

    #[test]
    fn ambiguous_fallback_yields_no_match() {
        let layout = VolatileLayout::default();
        assert_eq!(layout.locate_type_segment(&["s", "X", "MyApp"]), None);
    }

    #[test]
    fn fallback_respects_configuration() {
        let layout = VolatileLayout {
            single_char_fallback: false,
            type_tokens: vec!["cache".to_string()],
            ..VolatileLayout::default()
        };
        assert_eq!(layout.locate_type_segment(&["session", "X", "MyApp"]), None);
        assert_eq!(
            layout.locate_type_segment(&["session", "Cache", "MyApp"]),
            Some(TypeSegment::Scanned(1))
        );
    }

    #[test]
    fn root_comparison_ignores_trailing_separator() {
        let layout = VolatileLayout::default();
        assert!(layout.is_root(Path::new("/var/folders")));
        assert!(!layout.is_root(Path::new("/var/folders/zz")));
    }
}
