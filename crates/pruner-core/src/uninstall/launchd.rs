use std::fs;
use std::path::{Path, PathBuf};

use pruner_domain::UninstallSpec;
use tracing::{debug, warn};

use super::steps::{args, render, Action, Step, StepRunner};
use crate::process::ProcessError;

pub const LAUNCHCTL: &str = "/bin/launchctl";
const PLUTIL: &str = "/usr/bin/plutil";
pub const LAUNCH_AGENTS: &str = "/Library/LaunchAgents";
pub const LAUNCH_DAEMONS: &str = "/Library/LaunchDaemons";

/// launchctl exit status for "Input/output error".
const EXIT_IO: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    Agent,
    Daemon,
}

impl LaunchKind {
    fn domain(self, uid: u32) -> String {
        match self {
            LaunchKind::Agent => format!("gui/{uid}"),
            LaunchKind::Daemon => "system".to_string(),
        }
    }
}

/// Why a path-form `launchctl bootout` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootoutFailure {
    /// The service is loaded under a label that no longer matches the plist.
    Io,
    Exit,
    Timeout,
    Spawn,
}

impl BootoutFailure {
    pub fn classify(err: &ProcessError) -> Self {
        match err {
            ProcessError::ExecutionFailed { code, .. } if *code == EXIT_IO => Self::Io,
            ProcessError::ExecutionFailed { .. } => Self::Exit,
            ProcessError::Timeout { .. } => Self::Timeout,
            ProcessError::Spawn { .. } => Self::Spawn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootoutRetry {
    ByLabel,
    GiveUp,
}

const RETRY_TABLE: &[(BootoutFailure, BootoutRetry)] = &[
    (BootoutFailure::Io, BootoutRetry::ByLabel),
    (BootoutFailure::Exit, BootoutRetry::GiveUp),
    (BootoutFailure::Timeout, BootoutRetry::GiveUp),
    (BootoutFailure::Spawn, BootoutRetry::GiveUp),
];

pub fn retry_strategy(failure: BootoutFailure) -> BootoutRetry {
    RETRY_TABLE
        .iter()
        .find(|(kind, _)| *kind == failure)
        .map_or(BootoutRetry::GiveUp, |(_, retry)| *retry)
}

/// Boots out launch agents and daemons whose plist names mention the app.
pub struct LaunchdUnloader<'a> {
    runner: &'a StepRunner<'a>,
    folders: Vec<(PathBuf, LaunchKind)>,
}

impl<'a> LaunchdUnloader<'a> {
    pub fn system(runner: &'a StepRunner<'a>) -> Self {
        Self::with_folders(
            runner,
            vec![
                (PathBuf::from(LAUNCH_AGENTS), LaunchKind::Agent),
                (PathBuf::from(LAUNCH_DAEMONS), LaunchKind::Daemon),
            ],
        )
    }

    pub fn with_folders(runner: &'a StepRunner<'a>, folders: Vec<(PathBuf, LaunchKind)>) -> Self {
        Self { runner, folders }
    }

    pub fn unload(&self, spec: &UninstallSpec, uid: u32) -> Vec<Action> {
        let mut actions = Vec::new();
        for (folder, kind) in &self.folders {
            let names = match fs::read_dir(folder) {
                Ok(entries) => {
                    let mut names: Vec<String> = entries
                        .flatten()
                        .map(|entry| entry.file_name().to_string_lossy().into_owned())
                        .filter(|name| plist_matches(name, spec))
                        .collect();
                    names.sort();
                    names
                }
                Err(err) => {
                    warn!(path = %folder.display(), %err, "cannot list launchd folder");
                    continue;
                }
            };
            let domain = kind.domain(uid);
            for name in names {
                self.bootout(&folder.join(name), &domain, &mut actions);
            }
        }
        actions
    }

    fn bootout(&self, plist: &Path, domain: &str, actions: &mut Vec<Action>) {
        let plist_arg = plist.display().to_string();
        let path_args = args(["bootout", domain, plist_arg.as_str()]);
        let err = match self.runner.mutate(Step::Bootout, LAUNCHCTL, &path_args) {
            Ok(action) => {
                actions.push(action);
                return;
            }
            Err(err) => err,
        };
        let failure = BootoutFailure::classify(&err);
        actions.push(Action::failed(
            Step::Bootout,
            render(LAUNCHCTL, &path_args),
            &err,
        ));
        if retry_strategy(failure) == BootoutRetry::ByLabel {
            let label = self.label(plist);
            debug!(plist = %plist_arg, %label, "retrying bootout by label");
            let target = format!("{domain}/{label}");
            actions.push(
                self.runner
                    .attempt(Step::Bootout, LAUNCHCTL, &args(["bootout", target.as_str()])),
            );
        }
    }

    /// `Label` from the plist, or the file stem when it cannot be read.
    fn label(&self, plist: &Path) -> String {
        let plist_arg = plist.display().to_string();
        self.runner
            .query(PLUTIL, &args(["-extract", "Label", "raw", "-o", "-", plist_arg.as_str()]))
            .ok()
            .map(|out| String::from_utf8_lossy(&out).trim().to_string())
            .filter(|label| !label.is_empty())
            .or_else(|| {
                plist
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_default()
    }
}

fn plist_matches(name: &str, spec: &UninstallSpec) -> bool {
    std::iter::once(spec.bundle_id.as_str())
        .chain(spec.alternative_names().iter().map(String::as_str))
        .any(|needle| !needle.is_empty() && name.contains(needle))
}
