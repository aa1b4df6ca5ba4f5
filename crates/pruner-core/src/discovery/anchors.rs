use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Discovery result kept as an antichain: no member is an ancestor of another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorSet {
    paths: BTreeSet<PathBuf>,
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `anchor`, first dropping members it subsumes.
    ///
    /// Returns `false` when an existing member already covers `anchor`.
    pub fn insert(&mut self, anchor: PathBuf) -> bool {
        self.paths.retain(|existing| !existing.starts_with(&anchor));
        if self.covers(&anchor) {
            return false;
        }
        self.paths.insert(anchor)
    }

    /// Whether `path` is a member or lies beneath one.
    pub fn covers(&self, path: &Path) -> bool {
        self.paths.iter().any(|existing| path.starts_with(existing))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn into_inner(self) -> BTreeSet<PathBuf> {
        self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_antichain(set: &AnchorSet) {
        for a in set.iter() {
            for b in set.iter() {
                if a != b {
                    assert!(!b.starts_with(a), "{} contains {}", a.display(), b.display());
                }
            }
        }
    }

    #[test]
    fn shallower_anchor_subsumes_deeper_ones() {
        let mut set = AnchorSet::new();
        assert!(set.insert(PathBuf::from("/Library/App Support/Foo/cache")));
        assert!(set.insert(PathBuf::from("/Library/App Support/Foo/logs")));
        assert!(set.insert(PathBuf::from("/Library/App Support/Foo")));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![&PathBuf::from("/Library/App Support/Foo")]
        );
    }

    #[test]
    fn covered_anchor_is_not_inserted() {
        let mut set = AnchorSet::new();
        set.insert(PathBuf::from("/Applications/Foo.app"));
        assert!(!set.insert(PathBuf::from("/Applications/Foo.app/Contents")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn sibling_prefixes_are_not_ancestors() {
        let mut set = AnchorSet::new();
        set.insert(PathBuf::from("/Applications/Foo"));
        assert!(set.insert(PathBuf::from("/Applications/FooBar.app")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn result_is_an_antichain_regardless_of_insertion_order() {
        let paths = [
            "/a/b/c",
            "/a/b",
            "/a/x",
            "/a/b/c/d",
            "/z",
            "/a/x/y",
            "/z/1",
        ];
        let forward = paths.iter().fold(AnchorSet::new(), |mut set, path| {
            set.insert(PathBuf::from(path));
            set
        });
        let backward = paths.iter().rev().fold(AnchorSet::new(), |mut set, path| {
            set.insert(PathBuf::from(path));
            set
        });
        assert_antichain(&forward);
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 3);
    }
}
