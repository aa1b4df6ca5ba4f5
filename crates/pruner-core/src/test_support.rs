use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::console_user::{ConsoleUser, UserResolutionError};
use crate::effects::{ConsoleUserResolver, Effects, ProcessRunner};
use crate::process::ProcessError;

pub(crate) struct FixedUser(pub Option<PathBuf>);

impl ConsoleUserResolver for FixedUser {
    fn current(&self) -> Result<ConsoleUser, UserResolutionError> {
        self.0
            .as_ref()
            .map(|home| ConsoleUser {
                uid: 501,
                username: "alice".to_string(),
                home: home.clone(),
            })
            .ok_or(UserResolutionError::NotFound)
    }
}

type Responder = dyn Fn(&str, &[String]) -> Result<Vec<u8>, ProcessError> + Send + Sync;

/// Records every invocation and answers from a scripted responder.
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    respond: Box<Responder>,
}

impl RecordingRunner {
    pub(crate) fn new(
        respond: impl Fn(&str, &[String]) -> Result<Vec<u8>, ProcessError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// A runner whose commands all succeed with empty output.
    pub(crate) fn silent() -> Self {
        Self::new(|_, _| Ok(Vec::new()))
    }

    /// Invocations rendered as `program arg arg ...`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        _env: &[(String, String)],
        _timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ProcessError> {
        let rendered = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(rendered);
        }
        (self.respond)(program, args)
    }
}

pub(crate) fn failed(program: &str, code: i32) -> ProcessError {
    ProcessError::ExecutionFailed {
        program: program.to_string(),
        code,
        stderr: String::new(),
    }
}

pub(crate) struct FakeEffects {
    pub user: FixedUser,
    pub process: Arc<RecordingRunner>,
}

impl Effects for FakeEffects {
    fn console_user(&self) -> &dyn ConsoleUserResolver {
        &self.user
    }

    fn process(&self) -> &dyn ProcessRunner {
        self.process.as_ref()
    }
}
