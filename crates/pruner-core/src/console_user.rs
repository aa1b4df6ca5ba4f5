use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::UserConfig;
use crate::effects::{ConsoleUserResolver, ProcessRunner};

const ID_PATH: &str = "/usr/bin/id";

/// The logged-in, non-root user whose home directory `~` expands to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleUser {
    pub uid: u32,
    pub username: String,
    pub home: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum UserResolutionError {
    #[error("no console user is logged in")]
    NotFound,
    #[error("console session belongs to root; refusing to expand home paths")]
    RootSession,
    #[error("failed to look up {what} for console user: {reason}")]
    Lookup { what: &'static str, reason: String },
}

/// Resolves the console user from configuration, the owner of `/dev/console`
/// or the invoking user's environment, in that order.
pub struct SystemConsoleUser {
    config: UserConfig,
    process: Arc<dyn ProcessRunner>,
}

impl SystemConsoleUser {
    pub fn new(config: UserConfig, process: Arc<dyn ProcessRunner>) -> Self {
        Self { config, process }
    }

    fn username(&self) -> Result<String, UserResolutionError> {
        if let Some(name) = &self.config.username {
            return Ok(name.clone());
        }
        if let Some(uid) = console_owner() {
            if uid == 0 {
                return Err(UserResolutionError::RootSession);
            }
            return self.lookup("username", &["-nu".to_string(), uid.to_string()]);
        }
        self.config
            .invoking_user
            .clone()
            .ok_or(UserResolutionError::NotFound)
    }

    fn uid(&self, username: &str) -> Result<u32, UserResolutionError> {
        if let Some(uid) = self.config.uid {
            return Ok(uid);
        }
        let raw = self.lookup("uid", &["-u".to_string(), username.to_string()])?;
        raw.parse().map_err(|_| UserResolutionError::Lookup {
            what: "uid",
            reason: format!("unexpected output {raw:?}"),
        })
    }

    fn lookup(&self, what: &'static str, args: &[String]) -> Result<String, UserResolutionError> {
        let out = self
            .process
            .run(ID_PATH, args, &[], None)
            .map_err(|err| UserResolutionError::Lookup {
                what,
                reason: err.to_string(),
            })?;
        let value = String::from_utf8_lossy(&out).trim().to_string();
        if value.is_empty() {
            return Err(UserResolutionError::Lookup {
                what,
                reason: "empty output".to_string(),
            });
        }
        Ok(value)
    }
}

impl ConsoleUserResolver for SystemConsoleUser {
    fn current(&self) -> Result<ConsoleUser, UserResolutionError> {
        let username = self.username()?;
        if username == "root" {
            return Err(UserResolutionError::RootSession);
        }
        let uid = self.uid(&username)?;
        if uid == 0 {
            return Err(UserResolutionError::RootSession);
        }
        let home = self.config.home_base.join(&username);
        tracing::debug!(username = %username, uid, home = %home.display(), "resolved console user");
        Ok(ConsoleUser {
            uid,
            username,
            home,
        })
    }
}

#[cfg(target_os = "macos")]
fn console_owner() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/dev/console")
        .ok()
        .map(|meta| meta.uid())
}

#[cfg(not(target_os = "macos"))]
fn console_owner() -> Option<u32> {
    // Only macOS hands /dev/console to the GUI session user.
    None
}
