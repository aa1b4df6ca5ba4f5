use indexmap::IndexSet;
use pruner_domain::{MatchMode, UninstallSpec};

/// Case-folded, de-duplicated names a candidate is compared against.
#[derive(Debug, Clone, Default)]
pub struct MatchTargets {
    targets: IndexSet<String>,
}

impl MatchTargets {
    /// `{appName, bundleId} ∪ additionalPaths ∪ alternativeNames`, in that order.
    pub fn from_spec(spec: &UninstallSpec) -> Self {
        let names = [spec.app_name.as_str(), spec.bundle_id.as_str()]
            .into_iter()
            .chain(spec.additional_paths().iter().map(String::as_str))
            .chain(spec.alternative_names().iter().map(String::as_str));
        Self::from_names(names)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let targets = names
            .into_iter()
            .map(str::to_lowercase)
            .filter(|name| !name.is_empty())
            .collect();
        Self { targets }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    /// First target the candidate satisfies under `mode`.
    pub fn first_match(&self, candidate: &str, mode: MatchMode) -> Option<&str> {
        let folded = candidate.to_lowercase();
        self.iter()
            .find(|target| mode.matches_folded(&folded, target))
    }

    /// Whether the candidate equals a target, ignoring case.
    pub fn is_exact(&self, candidate: &str) -> bool {
        self.targets.contains(&candidate.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_folded_and_deduplicated() {
        let targets = MatchTargets::from_names(["MyApp", "myapp", "", "com.Foo.MyApp"]);
        assert_eq!(targets.iter().collect::<Vec<_>>(), vec!["myapp", "com.foo.myapp"]);
    }

    #[test]
    fn first_satisfied_target_wins() {
        let targets = MatchTargets::from_names(["Foo", "FooBar"]);
        assert_eq!(targets.first_match("FooBarHelper", MatchMode::Prefix), Some("foo"));
        assert_eq!(targets.first_match("FooBar", MatchMode::Exact), Some("foobar"));
        assert_eq!(targets.first_match("Baz", MatchMode::All), None);
        assert!(targets.is_exact("FOOBAR"));
        assert!(!targets.is_exact("FooBarHelper"));
    }
}
