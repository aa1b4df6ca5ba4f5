use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::effects::ProcessRunner;
use crate::process::ProcessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Bootout,
    Kill,
    ForgetPkg,
    Brew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionResult {
    Ran,
    DryRun,
    Failed { error: String },
}

/// One side-effecting command issued (or planned) during an uninstall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub step: Step,
    pub command: String,
    #[serde(flatten)]
    pub result: ActionResult,
}

impl Action {
    pub fn failed(step: Step, command: String, err: &ProcessError) -> Self {
        warn!(?step, %command, %err, "command failed");
        Self {
            step,
            command,
            result: ActionResult::Failed {
                error: err.to_string(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.result, ActionResult::Failed { .. })
    }
}

pub(crate) fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs collaborator commands with a shared timeout, honoring dry-run for
/// anything that changes the system.
pub struct StepRunner<'a> {
    process: &'a dyn ProcessRunner,
    timeout: Duration,
    dry_run: bool,
}

impl<'a> StepRunner<'a> {
    pub fn new(process: &'a dyn ProcessRunner, timeout: Duration, dry_run: bool) -> Self {
        Self {
            process,
            timeout,
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Read-only command; runs even during a dry run.
    pub fn query(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ProcessError> {
        self.process.run(program, args, &[], Some(self.timeout))
    }

    /// Side-effecting command; only planned during a dry run.
    ///
    /// # Errors
    /// Returns the process error so callers can pick a retry.
    pub fn mutate(&self, step: Step, program: &str, args: &[String]) -> Result<Action, ProcessError> {
        let command = render(program, args);
        if self.dry_run {
            info!(%command, "dry run, would run");
            return Ok(Action {
                step,
                command,
                result: ActionResult::DryRun,
            });
        }
        self.query(program, args)?;
        info!(%command, "ran");
        Ok(Action {
            step,
            command,
            result: ActionResult::Ran,
        })
    }

    /// [`Self::mutate`] with failures folded into the returned action.
    pub fn attempt(&self, step: Step, program: &str, args: &[String]) -> Action {
        self.mutate(step, program, args)
            .unwrap_or_else(|err| Action::failed(step, render(program, args), &err))
    }
}

pub(crate) fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}
