//! Uninstall orchestration: sync, load, discover, then remove.

mod brew;
mod launchd;
mod pkgutil;
mod steps;


use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pruner_domain::{Definition, MatchMode};
use pruner_store::{CatalogError, CatalogErrorKind, CatalogStore};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

pub use brew::{BrewEnv, BrewKind, BrewTidy, BREW_CANDIDATES};
pub use launchd::{
    retry_strategy, BootoutFailure, BootoutRetry, LaunchKind, LaunchdUnloader, LAUNCHCTL,
    LAUNCH_AGENTS, LAUNCH_DAEMONS,
};
pub use pkgutil::{forget_receipts, PKGUTIL};
pub use steps::{Action, ActionResult, Step, StepRunner};

use crate::context::CommandContext;
use crate::discovery::{format_bytes, total_size, DiscoveryEngine, DiscoveryOptions};
use crate::outcome::ExecutionOutcome;
use crate::process::ProcessError;

const PGREP: &str = "/usr/bin/pgrep";
const PS: &str = "/bin/ps";
const KILL: &str = "/bin/kill";
const MAX_ANCESTRY: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct UninstallRequest {
    pub definition_name: Option<String>,
    pub definition_path: Option<PathBuf>,
    pub version: Option<String>,
    /// Overrides the definition's own `matchMode`.
    pub match_mode: Option<String>,
    pub dry_run: bool,
    pub remove_user_hive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPath {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Removal {
    pub removed: Vec<PathBuf>,
    pub would_remove: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<FailedPath>,
}

/// Flag first, then the definition's `matchMode`, then `all`.
pub fn resolve_match_mode(flag: Option<&str>, definition: &Definition) -> MatchMode {
    flag.map(MatchMode::parse_lossy)
        .or_else(|| definition.uninstall.preferred_match_mode())
        .unwrap_or_default()
}

/// Removes the application described by the request.
///
/// # Errors
/// Returns an error only for unexpected I/O while reading a definition file;
/// expected failures become user-error or failure outcomes.
pub fn uninstall(ctx: &CommandContext, request: &UninstallRequest) -> Result<ExecutionOutcome> {
    if request.definition_name.is_none() && request.definition_path.is_none() {
        return Ok(ExecutionOutcome::user_error(
            "a definition name or definition path is required",
            json!({ "hint": "pass --definition-name <name> or --definition-path <file>" }),
        ));
    }

    let store = ctx.store();
    match &store {
        Ok(store) => match store.sync_catalog(true) {
            Ok(summary) => debug!(
                items = summary.items,
                fetched = summary.fetched,
                failed = summary.failed,
                "catalog synced"
            ),
            Err(err) => warn!(%err, "catalog sync failed; continuing with the local cache"),
        },
        Err(err) => warn!(err = %format!("{err:#}"), "catalog store unavailable"),
    }

    let bytes = match read_definition(store.as_ref().ok(), request)? {
        Ok(bytes) => bytes,
        Err(outcome) => return Ok(outcome),
    };
    let definition = match Definition::from_slice(&bytes) {
        Ok(definition) => definition,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                "definition could not be decoded",
                json!({ "error": format!("{err:#}") }),
            ))
        }
    };
    let spec = &definition.uninstall;
    let mode = resolve_match_mode(request.match_mode.as_deref(), &definition);
    info!(name = %definition.name, version = %definition.version, %mode, "found definition");

    let options = DiscoveryOptions {
        match_mode: mode,
        include_user_hive: request.remove_user_hive,
    };
    let engine = DiscoveryEngine::new(&ctx.config().discovery().volatile, ctx.console_user());
    let report = match engine.discover(&definition, options) {
        Ok(report) => report,
        Err(err) => {
            error!(%err, "discovery aborted");
            return Ok(ExecutionOutcome::failure(
                format!("unable to discover files for {}", spec.app_name),
                json!({ "error": err.to_string(), "reason": "console_user" }),
            ));
        }
    };

    let base = json!({
        "definition": definition.name,
        "version": definition.version,
        "app_name": spec.app_name,
        "match_mode": mode.as_str(),
        "dry_run": request.dry_run,
        "skipped_dirs": report.skipped,
    });
    if report.paths.is_empty() {
        info!(app = %spec.app_name, "no files found; nothing to uninstall");
        return Ok(ExecutionOutcome::success(
            format!("no files found for {}; nothing to uninstall", spec.app_name),
            merge(base, json!({ "paths": [], "total_size_bytes": 0 })),
        ));
    }
    let size = total_size(report.paths.iter().map(PathBuf::as_path));
    info!(count = report.paths.len(), size = %format_bytes(size), "found files to remove");

    let runner = StepRunner::new(ctx.process(), ctx.config().process().timeout, request.dry_run);
    let mut actions = Vec::new();
    if spec.unload_launch_daemons {
        match ctx.console_user().current() {
            Ok(user) => actions.extend(LaunchdUnloader::system(&runner).unload(spec, user.uid)),
            Err(err) => {
                return Ok(ExecutionOutcome::failure(
                    "unable to resolve the console user for launchd",
                    json!({ "error": err.to_string(), "reason": "console_user" }),
                ))
            }
        }
    }
    actions.extend(kill_processes(&runner, &spec.app_name));
    let removal = remove_paths(&report.paths, request.dry_run);
    if spec.forget_pkg {
        actions.extend(forget_receipts(&runner, spec));
    }
    if let Some(brew_name) = spec.brew_name.as_deref().filter(|name| !name.is_empty()) {
        actions.extend(BrewTidy::new(&runner).tidy(brew_name));
    }

    let details = merge(
        base,
        json!({
            "paths": report.paths,
            "total_size_bytes": size,
            "total_size": format_bytes(size),
            "removed": removal.removed,
            "would_remove": removal.would_remove,
            "missing": removal.missing,
            "failed": removal.failed,
            "actions": actions,
        }),
    );
    let count = report.paths.len();
    if !removal.failed.is_empty() {
        return Ok(ExecutionOutcome::failure(
            format!("failed to remove {} of {count} paths", removal.failed.len()),
            details,
        ));
    }
    let message = if request.dry_run {
        format!("dry run: would remove {count} paths ({})", format_bytes(size))
    } else {
        format!(
            "removed {} paths for {} ({})",
            removal.removed.len(),
            spec.app_name,
            format_bytes(size)
        )
    };
    Ok(ExecutionOutcome::success(message, details))
}

/// Definition bytes from `--definition-path` or the catalog. The inner error
/// is an outcome for the caller to return as is.
fn read_definition(
    store: Option<&CatalogStore>,
    request: &UninstallRequest,
) -> Result<std::result::Result<Vec<u8>, ExecutionOutcome>> {
    if let Some(path) = request.definition_path.as_deref().filter(|path| path.exists()) {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read definition {}", path.display()))?;
        return Ok(Ok(bytes));
    }
    let Some(name) = request.definition_name.as_deref() else {
        let path = request.definition_path.as_deref().unwrap_or(Path::new(""));
        return Ok(Err(ExecutionOutcome::user_error(
            format!("definition file {} not found", path.display()),
            json!({ "definition_path": path }),
        )));
    };
    let Some(store) = store else {
        return Ok(Err(ExecutionOutcome::failure(
            "catalog cache is unavailable",
            json!({ "definition": name }),
        )));
    };
    let version = request.version.as_deref();
    match store.load_definition(name, version) {
        Ok(bytes) => Ok(Ok(bytes)),
        Err(err) => Ok(Err(catalog_outcome(&err, name, version))),
    }
}

fn catalog_outcome(err: &CatalogError, name: &str, version: Option<&str>) -> ExecutionOutcome {
    let details = json!({
        "definition": name,
        "version": version,
        "error": err.to_string(),
    });
    match err.kind() {
        CatalogErrorKind::NotFound => ExecutionOutcome::user_error(
            format!("no definition named {name} in the catalog"),
            merge(details, json!({ "hint": "run `pruner list` to see available definitions" })),
        ),
        CatalogErrorKind::Decode | CatalogErrorKind::Io => ExecutionOutcome::failure(
            "catalog index is unavailable; sync the catalog first",
            details,
        ),
        _ => ExecutionOutcome::failure(format!("unable to load definition {name}"), details),
    }
}

/// Signals every process whose command line mentions the app, except this
/// process and its ancestors: `pruner`'s own arguments (or a wrapping `sudo`)
/// often contain the app name too.
fn kill_processes(runner: &StepRunner<'_>, app_name: &str) -> Vec<Action> {
    kill_matching(runner, app_name, std::process::id())
}

fn kill_matching(runner: &StepRunner<'_>, app_name: &str, own_pid: u32) -> Vec<Action> {
    let pattern = vec!["-f".to_string(), app_name.to_string()];
    let found = match runner.query(PGREP, &pattern) {
        Ok(out) => parse_pids(&out),
        // pgrep exits 1 when nothing matches.
        Err(ProcessError::ExecutionFailed { code: 1, .. }) => BTreeSet::new(),
        Err(err) => {
            return vec![Action::failed(
                Step::Kill,
                steps::render(PGREP, &pattern),
                &err,
            )]
        }
    };
    if found.is_empty() {
        info!(app = app_name, "process not running (skipped)");
        return Vec::new();
    }
    let protected = ancestry(runner, own_pid);
    let targets: Vec<String> = found
        .difference(&protected)
        .map(u32::to_string)
        .collect();
    if targets.is_empty() {
        debug!(app = app_name, "only pruner itself matched; nothing to kill");
        return Vec::new();
    }
    let mut args = vec!["-TERM".to_string()];
    args.extend(targets);
    vec![runner.attempt(Step::Kill, KILL, &args)]
}

fn parse_pids(out: &[u8]) -> BTreeSet<u32> {
    String::from_utf8_lossy(out)
        .split_whitespace()
        .filter_map(|raw| raw.parse().ok())
        .collect()
}

/// `pid` and its parent chain up to (not including) `init`.
fn ancestry(runner: &StepRunner<'_>, pid: u32) -> BTreeSet<u32> {
    let mut chain = BTreeSet::new();
    let mut current = pid;
    while current > 1 && chain.len() < MAX_ANCESTRY && chain.insert(current) {
        let args = vec![
            "-o".to_string(),
            "ppid=".to_string(),
            "-p".to_string(),
            current.to_string(),
        ];
        let parent = runner
            .query(PS, &args)
            .ok()
            .and_then(|out| String::from_utf8_lossy(&out).trim().parse::<u32>().ok());
        match parent {
            Some(parent) => current = parent,
            None => {
                debug!(pid = current, "parent process unknown; stopping ancestry walk");
                break;
            }
        }
    }
    chain
}

pub fn remove_paths(paths: &BTreeSet<PathBuf>, dry_run: bool) -> Removal {
    let mut removal = Removal::default();
    for path in paths {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "file not found (skipped)");
                removal.missing.push(path.clone());
                continue;
            }
            Err(err) => {
                error!(path = %path.display(), %err, "failed to inspect path");
                removal.failed.push(FailedPath {
                    path: path.clone(),
                    error: err.to_string(),
                });
                continue;
            }
        };
        if dry_run {
            info!(path = %path.display(), "dry run, would remove");
            removal.would_remove.push(path.clone());
            continue;
        }
        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                info!(path = %path.display(), "removed");
                removal.removed.push(path.clone());
            }
            Err(err) => {
                error!(path = %path.display(), %err, "failed to remove");
                removal.failed.push(FailedPath {
                    path: path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    removal
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(base), serde_json::Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}
