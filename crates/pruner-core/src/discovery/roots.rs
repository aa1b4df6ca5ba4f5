use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use pruner_domain::UninstallSpec;

use super::VolatileLayout;

/// Placeholder for the system volatile root; replaced by the configured layout root.
const VOLATILE_ROOT: &str = "/var/folders/";

pub const DEFAULT_ROOTS: &[&str] = &[
    "/Applications/",
    "/Applications/Utilities/",
    "/Library/Application Support/",
    "/Library/PrivilegedHelperTools/",
    "/usr/local/bin/",
    "/usr/local/sbin/",
    "/usr/local/share/",
    "/usr/local/opt/",
    "/usr/local/etc/",
    "/usr/local/var/",
    "/Users/Shared/",
    "/usr/local/lib/",
    "/usr/local/include/",
    "/Users/Shared/Library/Application Support/",
    "/Library/SystemExtensions/",
    "/Library/LaunchAgents/",
    "/Library/LaunchDaemons/",
    "/Library/Frameworks/",
    "/Library/PreferencePanes/",
    "/Library/QuickLook/",
    "/Library/Services/",
    "/Library/Audio/Plug-Ins/",
    "/Library/Extensions/",
    "/Library/Internet Plug-Ins/",
    "/Library/Logs/",
    "/Library/Logs/DiagnosticReports/",
    "/Library/Preferences/",
    VOLATILE_ROOT,
    "~/Applications/",
];

pub const USER_HIVE_ROOTS: &[&str] = &[
    "~/Library/Application Support/",
    "~/Library/Application Support/CrashReporter/",
    "~/Library/Caches/",
    "~/Library/Preferences/",
    "~/Library/WebKit/",
    "~/Library/HTTPStorages/",
    "~/Library/Containers/",
    "~/Library/Group Containers/",
    "~/Library/Logs/",
    "~/Library/Logs/DiagnosticReports/",
    "~/Library/Saved Application State/",
    "~/Library/",
    "~/Library/Services/",
    "~/Library/LaunchAgents/",
    "~/Library/Preferences/ByHost/",
    "~/Library/PreferencePanes/",
    "~/Library/QuickLook/",
    "~/Library/Application Scripts/",
    "~/Library/Audio/Plug-Ins/",
    "~/Library/Internet Plug-Ins/",
    "~/",
];

/// Expands a leading `~` against `home`.
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    match raw.strip_prefix('~') {
        Some(rest) => home.join(rest.trim_start_matches('/')),
        None => PathBuf::from(raw),
    }
}

/// Ordered, de-duplicated search roots for one definition.
///
/// `searchFilePaths` replaces the defaults; the user hive and `additionalPaths`
/// are appended in that order.
pub fn search_roots(
    spec: &UninstallSpec,
    include_user_hive: bool,
    home: &Path,
    volatile: &VolatileLayout,
) -> IndexSet<PathBuf> {
    let base: Vec<&str> = match &spec.search_file_paths {
        Some(paths) => paths.iter().map(String::as_str).collect(),
        None => DEFAULT_ROOTS.to_vec(),
    };
    let hive: &[&str] = if include_user_hive { USER_HIVE_ROOTS } else { &[] };

    base.into_iter()
        .chain(hive.iter().copied())
        .chain(spec.additional_paths().iter().map(String::as_str))
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            if Path::new(raw) == Path::new(VOLATILE_ROOT) {
                volatile.root.clone()
            } else {
                expand_home(raw, home)
            }
        })
        .collect()
}
