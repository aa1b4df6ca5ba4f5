use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::console_user::{ConsoleUser, SystemConsoleUser, UserResolutionError};
use crate::process::{run_command, ProcessError};

pub trait ConsoleUserResolver: Send + Sync {
    fn current(&self) -> Result<ConsoleUser, UserResolutionError>;
}

pub trait ProcessRunner: Send + Sync {
    /// Runs `program` and returns its stdout.
    ///
    /// # Errors
    /// [`ProcessError::ExecutionFailed`] on a non-zero exit and
    /// [`ProcessError::Timeout`] when `timeout` elapses first.
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ProcessError>;
}

pub trait Effects: Send + Sync {
    fn console_user(&self) -> &dyn ConsoleUserResolver;
    fn process(&self) -> &dyn ProcessRunner;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    console_user: Arc<SystemConsoleUser>,
    process: Arc<SystemProcessRunner>,
}

impl SystemEffects {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let process = Arc::new(SystemProcessRunner);
        let console_user = Arc::new(SystemConsoleUser::new(
            config.user().clone(),
            process.clone(),
        ));
        Self {
            console_user,
            process,
        }
    }
}

impl Effects for SystemEffects {
    fn console_user(&self) -> &dyn ConsoleUserResolver {
        self.console_user.as_ref()
    }

    fn process(&self) -> &dyn ProcessRunner {
        self.process.as_ref()
    }
}

struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ProcessError> {
        run_command(program, args, env, timeout)
    }
}
