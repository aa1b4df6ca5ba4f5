//! Resolve a definition into the on-disk paths that belong to the application.
//!
//! Every search root is enumerated two levels deep, except the volatile
//! temporary root, which is walked fully and matched by position. All anchors
//! pass through one [`AnchorSet`], so the result is an antichain no matter
//! which root produced a path or in which order roots are visited.

mod anchors;
mod matcher;
mod roots;
mod size;
mod volatile;


use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use pruner_domain::{Definition, MatchMode};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use anchors::AnchorSet;
pub use matcher::MatchTargets;
pub use roots::{expand_home, search_roots, DEFAULT_ROOTS, USER_HIVE_ROOTS};
pub use size::{format_bytes, total_size};
pub use volatile::{TypeSegment, VolatileLayout};

use crate::console_user::UserResolutionError;
use crate::effects::ConsoleUserResolver;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("cannot expand home paths: {0}")]
    UserResolution(#[from] UserResolutionError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub match_mode: MatchMode,
    pub include_user_hive: bool,
}

/// A directory that could not be read during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDir {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub paths: BTreeSet<PathBuf>,
    pub roots: Vec<PathBuf>,
    pub skipped: Vec<SkippedDir>,
}

pub struct DiscoveryEngine<'a> {
    layout: &'a VolatileLayout,
    users: &'a dyn ConsoleUserResolver,
}

struct Child {
    path: PathBuf,
    name: String,
    is_dir: bool,
}

struct Scan<'s> {
    roots: &'s IndexSet<PathBuf>,
    targets: &'s MatchTargets,
    mode: MatchMode,
    anchors: AnchorSet,
    skipped: Vec<SkippedDir>,
}

impl Scan<'_> {
    fn record(&mut self, anchor: PathBuf, target: &str) {
        debug!(path = %anchor.display(), matched = target, "matched application path");
        if !self.anchors.insert(anchor.clone()) {
            debug!(path = %anchor.display(), "already covered by a recorded ancestor");
        }
    }

    fn skip(&mut self, path: &Path, reason: impl ToString) {
        let reason = reason.to_string();
        warn!(path = %path.display(), %reason, "skipping unreadable directory");
        self.skipped.push(SkippedDir {
            path: path.to_path_buf(),
            reason,
        });
    }

    /// The item itself on an exact hit or when its parent is a search root;
    /// otherwise the directory holding it.
    fn anchor_for(&self, item: &Path, name: &str) -> PathBuf {
        if self.targets.is_exact(name) {
            return item.to_path_buf();
        }
        match item.parent() {
            Some(parent) if !self.roots.contains(parent) => parent.to_path_buf(),
            _ => item.to_path_buf(),
        }
    }

    fn match_child(&mut self, child: &Child) -> bool {
        let Some(target) = self.targets.first_match(&child.name, self.mode) else {
            return false;
        };
        let target = target.to_string();
        let anchor = self.anchor_for(&child.path, &child.name);
        self.record(anchor, &target);
        true
    }

    fn scan_shallow(&mut self, root: &Path) {
        let children = match read_children(root) {
            Ok(children) => children,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %root.display(), "search root does not exist");
                return;
            }
            Err(err) => {
                self.skip(root, err);
                return;
            }
        };
        for child in children {
            if self.match_child(&child) || !child.is_dir {
                continue;
            }
            match read_children(&child.path) {
                Ok(grandchildren) => {
                    for grandchild in &grandchildren {
                        self.match_child(grandchild);
                    }
                }
                Err(err) => self.skip(&child.path, err),
            }
        }
    }

    fn scan_volatile(&mut self, root: &Path, layout: &VolatileLayout) {
        if !root.exists() {
            debug!(path = %root.display(), "volatile root does not exist");
            return;
        }
        let mut walker = WalkDir::new(root).min_depth(1).into_iter();
        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    self.skip(&path, err);
                    continue;
                }
            };
            if self.anchors.covers(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let owned: Vec<String> = relative
                .iter()
                .map(|part| part.to_string_lossy().into_owned())
                .collect();
            let comps: Vec<&str> = owned.iter().map(String::as_str).collect();
            let Some(segment) = layout.locate_type_segment(&comps) else {
                continue;
            };
            let candidate = segment.index() + 1;
            let is_dir = entry.file_type().is_dir();
            if let Some(target) = self.targets.first_match(comps[candidate], self.mode) {
                let target = target.to_string();
                let anchor = comps[..=candidate]
                    .iter()
                    .fold(root.to_path_buf(), |path, part| path.join(part));
                self.record(anchor, &target);
                if is_dir {
                    walker.skip_current_dir();
                }
            } else if is_dir
                && comps.len() == candidate + 1
                && matches!(segment, TypeSegment::Preferred(_))
            {
                walker.skip_current_dir();
            }
        }
    }
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(layout: &'a VolatileLayout, users: &'a dyn ConsoleUserResolver) -> Self {
        Self { layout, users }
    }

    /// Walks the search roots for `definition` and returns the antichain of
    /// anchor paths. Unreadable directories are reported, not fatal.
    ///
    /// # Errors
    /// Fails only when the console user cannot be resolved.
    pub fn discover(
        &self,
        definition: &Definition,
        options: DiscoveryOptions,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let user = self.users.current()?;
        let spec = &definition.uninstall;
        let roots = search_roots(spec, options.include_user_hive, &user.home, self.layout);
        let targets = MatchTargets::from_spec(spec);
        if options.include_user_hive {
            info!(user = %user.username, app = %spec.app_name, "including user hive paths");
        }
        if !spec.additional_paths().is_empty() {
            info!(app = %spec.app_name, "including additional paths");
        }
        debug!(
            mode = %options.match_mode,
            targets = ?targets.iter().collect::<Vec<_>>(),
            roots = roots.len(),
            "discovering application paths"
        );

        let mut scan = Scan {
            roots: &roots,
            targets: &targets,
            mode: options.match_mode,
            anchors: AnchorSet::new(),
            skipped: Vec::new(),
        };
        for root in &roots {
            if self.layout.is_root(root) {
                scan.scan_volatile(root, self.layout);
            } else {
                scan.scan_shallow(root);
            }
        }
        let Scan {
            anchors, skipped, ..
        } = scan;
        Ok(DiscoveryReport {
            paths: anchors.into_inner(),
            roots: roots.into_iter().collect(),
            skipped,
        })
    }
}

/// `discover(definition, mode, include_user_hive)` returning only the path set.
///
/// # Errors
/// See [`DiscoveryEngine::discover`].
pub fn discover(
    definition: &Definition,
    match_mode: MatchMode,
    include_user_hive: bool,
    layout: &VolatileLayout,
    users: &dyn ConsoleUserResolver,
) -> Result<BTreeSet<PathBuf>, DiscoveryError> {
    let options = DiscoveryOptions {
        match_mode,
        include_user_hive,
    };
    DiscoveryEngine::new(layout, users)
        .discover(definition, options)
        .map(|report| report.paths)
}

fn read_children(dir: &Path) -> io::Result<Vec<Child>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
        children.push(Child {
            path: entry.path(),
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
        });
    }
    Ok(children)
}
