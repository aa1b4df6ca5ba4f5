use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Remote manifest of every published definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    pub schema_version: i64,
    pub generated_at: String,
    pub items: Vec<IndexItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexItem {
    /// Stable identifier, usually the bundle id.
    pub id: String,
    pub name: String,
    pub version: String,
    pub updated_at: String,
    /// Path of the definition document relative to the catalog base URL.
    pub path: String,
    /// Lowercase hex SHA-256 of the definition document.
    pub sha256: String,
}

impl IndexItem {
    /// Expected digest normalized to lowercase.
    pub fn expected_sha256(&self) -> String {
        self.sha256.trim().to_ascii_lowercase()
    }

    pub fn entry_file_name(&self) -> String {
        entry_file_name(&self.id, &self.version)
    }
}

/// Percent-encodes path separators, `@` and `%` so an id can be used as a
/// single file name component. Distinct inputs always map to distinct outputs.
pub fn escape_id(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            '@' => escaped.push_str("%40"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Cache entry name for `(id, version)`: `{escaped-id}@{version}.json`.
pub fn entry_file_name(id: &str, version: &str) -> String {
    format!("{}@{}.json", escape_id(id), escape_id(version))
}

/// Picks the definition to use for `name`.
///
/// With a version, the newest item carrying exactly that version wins. Without
/// one, or when the version is unknown, the newest item for the name wins.
/// "Newest" orders by `updated_at` and breaks ties by a lexicographic version
/// comparison.
pub fn select_definition<'a>(
    items: &'a [IndexItem],
    name: &str,
    version: Option<&str>,
) -> Option<&'a IndexItem> {
    let candidates: Vec<&IndexItem> = items.iter().filter(|item| item.name == name).collect();
    if candidates.is_empty() {
        return None;
    }
    if let Some(version) = version {
        let pinned = candidates
            .iter()
            .copied()
            .filter(|item| item.version == version)
            .max_by(|a, b| recency(a, b));
        if pinned.is_some() {
            return pinned;
        }
    }
    candidates.into_iter().max_by(|a, b| recency(a, b))
}

fn recency(a: &IndexItem, b: &IndexItem) -> Ordering {
    compare_timestamps(&a.updated_at, &b.updated_at).then_with(|| a.version.cmp(&b.version))
}

fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (
        OffsetDateTime::parse(a, &Rfc3339),
        OffsetDateTime::parse(b, &Rfc3339),
    ) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, version: &str, updated_at: &str) -> IndexItem {
        IndexItem {
            id: format!("com.example.{name}"),
            name: name.to_string(),
            version: version.to_string(),
            updated_at: updated_at.to_string(),
            path: format!("defs/{name}/{version}.json"),
            sha256: "00".repeat(32),
        }
    }

    #[test]
    fn newest_wins_without_version() {
        let items = vec![
            item("demo", "v1", "2025-01-01T00:00:00Z"),
            item("demo", "v2", "2025-02-01T00:00:00Z"),
        ];
        let best = select_definition(&items, "demo", None).expect("selected");
        assert_eq!(best.version, "v2");
    }

    #[test]
    fn explicit_version_beats_recency() {
        let items = vec![
            item("demo", "v1", "2025-01-01T00:00:00Z"),
            item("demo", "v2", "2025-02-01T00:00:00Z"),
        ];
        let best = select_definition(&items, "demo", Some("v1")).expect("selected");
        assert_eq!(best.version, "v1");
    }

    #[test]
    fn unknown_version_falls_back_to_newest() {
        let items = vec![
            item("demo", "v1", "2025-01-01T00:00:00Z"),
            item("demo", "v2", "2025-02-01T00:00:00Z"),
        ];
        let best = select_definition(&items, "demo", Some("v9")).expect("selected");
        assert_eq!(best.version, "v2");
    }

    #[test]
    fn equal_timestamps_compare_versions_lexicographically() {
        let items = vec![
            item("demo", "10", "2025-01-01T00:00:00Z"),
            item("demo", "9", "2025-01-01T00:00:00Z"),
        ];
        let best = select_definition(&items, "demo", None).expect("selected");
        assert_eq!(best.version, "9");
    }

    #[test]
    fn timestamps_compare_by_instant_across_offsets() {
        let items = vec![
            item("demo", "a", "2025-01-01T10:00:00+02:00"),
            item("demo", "b", "2025-01-01T09:00:00Z"),
        ];
        let best = select_definition(&items, "demo", None).expect("selected");
        assert_eq!(best.version, "b");
    }

    #[test]
    fn unknown_name_selects_nothing() {
        let items = vec![item("demo", "1", "2025-01-01T00:00:00Z")];
        assert!(select_definition(&items, "other", None).is_none());
    }

    #[test]
    fn entry_names_escape_separators() {
        assert_eq!(entry_file_name("com.foo.app", "2"), "com.foo.app@2.json");
        assert_eq!(entry_file_name("vendor/app", "1"), "vendor%2Fapp@1.json");
        assert_eq!(entry_file_name("a\\b", "1"), "a%5Cb@1.json");
    }

    #[test]
    fn escaped_names_never_collide() {
        let names = [
            entry_file_name("a/b", "1"),
            entry_file_name("a_b", "1"),
            entry_file_name("a%2Fb", "1"),
            entry_file_name("a@b", "1"),
            entry_file_name("a", "b@1"),
        ];
        let unique: std::collections::HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
