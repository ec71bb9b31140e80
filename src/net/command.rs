//! Bounded execution of external commands (`ping`, `net use`).

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Errors from running an external command.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program did not exit before the deadline and was killed
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    /// Waiting on the child failed
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Best single-line description of a failure, preferring stderr.
    pub fn failure_message(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if text.is_empty() {
            format!("exited with {}", self.status)
        } else {
            text.lines().next().unwrap_or(text).to_string()
        }
    }
}

/// Run `command` to completion, killing it if it outlives `timeout`.
///
/// Stdout and stderr are drained on helper threads so a chatty child can't
/// block on a full pipe while we poll.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let program = command.get_program().to_string_lossy().to_string();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_until(&mut child, Instant::now() + timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::TimedOut { program, timeout });
        }
        Err(source) => {
            let _ = child.kill();
            return Err(CommandError::Wait { program, source });
        }
    };

    Ok(CommandOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "echo hello; echo oops >&2"]),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_failure_message_prefers_stderr() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "echo out; echo 'System error 1326' >&2; exit 2"]),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(!output.success());
        assert_eq!(output.failure_message(), "System error 1326");
    }

    #[test]
    fn test_times_out() {
        let start = Instant::now();
        let result = run_with_timeout(
            Command::new("sh").args(["-c", "sleep 5"]),
            Duration::from_millis(100),
        );

        assert!(matches!(result, Err(CommandError::TimedOut { .. })));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let result = run_with_timeout(
            &mut Command::new("definitely-not-a-real-program-xyz"),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
