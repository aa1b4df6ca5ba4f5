use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Bytes kept per captured stream; the rest is read and discarded.
const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;
/// How long a timed-out command's output readers may take to see EOF.
const READER_GRACE: Duration = Duration::from_secs(2);
const TOOL_PATH: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with code {code}: {stderr}")]
    ExecutionFailed {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },
}

impl ProcessError {
    /// Exit code of a process that ran to completion and failed.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExecutionFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Runs `program` with `args`, returning captured stdout.
///
/// The child sees a PATH that includes the Homebrew prefixes and Homebrew's
/// interactive behaviors disabled. When `timeout` elapses the child is killed.
pub fn run_command(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    timeout: Option<Duration>,
) -> Result<Vec<u8>, ProcessError> {
    let mut command = configured_command(program, args, envs);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    tracing::debug!(program, args = %args.join(" "), "executing");

    let spawn_err = |source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    };
    let mut child = command.spawn().map_err(spawn_err)?;
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let deadline = timeout.map(|limit| Instant::now() + limit);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => return Err(spawn_err(source)),
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            terminate(&mut child);
            for reader in [stdout, stderr] {
                if reader.recv_timeout(READER_GRACE).is_err() {
                    tracing::debug!(program, "output reader still blocked after timeout");
                }
            }
            return Err(ProcessError::Timeout {
                program: program.to_string(),
                after: timeout.unwrap_or_default(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = collect(program, "stdout", &stdout);
    let stderr = collect(program, "stderr", &stderr);
    if status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        let code = status.code().unwrap_or(-1);
        tracing::debug!(program, code, stderr = %stderr, "command failed");
        Err(ProcessError::ExecutionFailed {
            program: program.to_string(),
            code,
            stderr,
        })
    }
}

fn configured_command(program: &str, args: &[String], envs: &[(String, String)]) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group, so a timeout can take down grandchildren as well.
        command.process_group(0);
    }
    let inherited = std::env::var("PATH").unwrap_or_default();
    let path = if inherited.is_empty() {
        TOOL_PATH.to_string()
    } else {
        format!("{TOOL_PATH}:{inherited}")
    };
    command.env("PATH", path);
    command.env("HOMEBREW_NO_AUTO_UPDATE", "1");
    command.env("HOMEBREW_NO_ANALYTICS", "1");
    command.env("HOMEBREW_COLOR", "0");
    for (key, value) in envs {
        command.env(key, value);
    }
    command
}

/// Kills the child and, on unix, the process group it leads, so grandchildren
/// holding the output pipes go away too.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("/bin/kill")
            .args(["-KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

type Captured = (Vec<u8>, bool);

fn spawn_reader(stream: Option<impl Read + Send + 'static>) -> Receiver<Captured> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let captured = match stream {
            Some(stream) => read_limited(stream, MAX_CAPTURE_BYTES),
            None => (Vec::new(), false),
        };
        let _ = tx.send(captured);
    });
    rx
}

fn collect(program: &str, stream: &'static str, reader: &Receiver<Captured>) -> Vec<u8> {
    let (buffer, truncated) = reader.recv().unwrap_or_default();
    if truncated {
        tracing::debug!(program, stream, limit = MAX_CAPTURE_BYTES, "output truncated");
    }
    buffer
}

fn read_limited(mut reader: impl Read, limit: usize) -> Captured {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        let room = limit.saturating_sub(buffer.len());
        if read > room {
            truncated = true;
        }
        buffer.extend_from_slice(&chunk[..read.min(room)]);
    }
    (buffer, truncated)
}
