//! Command Runner
//!
//! Executes the resolved commands of a run one after another in the run
//! directory. Execution stops at the first command that fails to launch or
//! exits with a non-zero status; later commands never run.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::run::RunStatus;

/// Interval for polling a running command for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Environment variable overriding the shell used on Unix.
pub const SHELL_ENV_VAR: &str = "SHELLFLOW_SHELL";

/// Lazily-resolved shell that commands are passed to.
pub static SHELL: Lazy<Shell> = Lazy::new(Shell::detect);

/// A shell program and the flag that makes it run a command string.
#[derive(Debug, Clone)]
pub struct Shell {
    pub program: String,
    pub flag: &'static str,
}

impl Shell {
    fn detect() -> Self {
        if cfg!(windows) {
            return Self {
                program: "cmd".to_string(),
                flag: "/C",
            };
        }

        let program = std::env::var(SHELL_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string());
        debug!("Using shell: {}", program);

        Self { program, flag: "-c" }
    }

    fn command(&self, command_text: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(self.flag).arg(command_text);
        cmd
    }
}

/// Final status and diagnostic messages of a command sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub messages: Vec<String>,
}

impl RunOutcome {
    pub fn success() -> Self {
        Self {
            status: RunStatus::Success,
            messages: Vec::new(),
        }
    }

    pub fn error(messages: Vec<String>) -> Self {
        Self {
            status: RunStatus::Error,
            messages,
        }
    }

    fn canceled() -> Self {
        Self::error(vec!["run canceled".to_string()])
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Cancellation signal shared between a worker and the registry.
///
/// Canceling kills the shell process of the command in flight and keeps
/// further commands from starting. Processes started by that shell are not
/// tracked and may outlive the cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    canceled: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);

        if let Some(child) = self.inner.child.lock().as_mut() {
            if let Err(e) = child.kill() {
                debug!("Failed to kill process {}: {}", child.id(), e);
            }
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Takes ownership of a spawned command.
    ///
    /// Returns false (after killing the child) if the token was canceled
    /// before the child could be tracked.
    fn track(&self, mut child: Child) -> bool {
        let mut slot = self.inner.child.lock();
        if self.is_canceled() {
            if let Err(e) = child.kill() {
                debug!("Failed to kill canceled command: {}", e);
            }
            if let Err(e) = child.wait() {
                debug!("Failed to reap canceled command: {}", e);
            }
            return false;
        }
        *slot = Some(child);
        true
    }

    /// Waits for the tracked child to exit.
    ///
    /// The lock is released between polls so that `cancel` can kill the
    /// child while it runs.
    fn wait(&self) -> io::Result<Option<ExitStatus>> {
        loop {
            {
                let mut slot = self.inner.child.lock();
                let Some(child) = slot.as_mut() else {
                    return Ok(None);
                };
                if let Some(status) = child.try_wait()? {
                    slot.take();
                    return Ok(Some(status));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

enum CommandExit {
    Success,
    Failed(String),
    Canceled,
}

/// Sequential shell command executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner {
    verbose: bool,
}

impl CommandRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Runs `commands` in order with `work_dir` as current directory.
    ///
    /// # Returns
    ///
    /// * `Success` with no messages if every command exits with status 0
    /// * `Error` with the captured stderr of the first failing command
    /// * `Error` with the fault and a diagnostic if a command cannot be launched
    pub fn run(&self, commands: &[String], work_dir: &Path, token: &CancelToken) -> RunOutcome {
        for command in commands {
            if token.is_canceled() {
                return RunOutcome::canceled();
            }

            if self.verbose {
                info!("{}", command);
            } else {
                debug!("Executing: {}", command);
            }

            match self.run_command(command, work_dir, token) {
                Ok(CommandExit::Success) => {}
                Ok(CommandExit::Failed(message)) => return RunOutcome::error(vec![message]),
                Ok(CommandExit::Canceled) => return RunOutcome::canceled(),
                Err(e) => {
                    error!("Failed to launch command `{}`: {}", command, e);
                    return RunOutcome::error(vec![
                        e.to_string(),
                        format!(
                            "failed to launch `{}` via {} {} in {}: {:?}",
                            command,
                            SHELL.program,
                            SHELL.flag,
                            work_dir.display(),
                            e
                        ),
                    ]);
                }
            }
        }

        RunOutcome::success()
    }

    fn run_command(
        &self,
        command: &str,
        work_dir: &Path,
        token: &CancelToken,
    ) -> io::Result<CommandExit> {
        let mut child = SHELL
            .command(command)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        if !token.track(child) {
            return Ok(CommandExit::Canceled);
        }
        let Some(status) = token.wait()? else {
            return Ok(CommandExit::Canceled);
        };
        if token.is_canceled() {
            return Ok(CommandExit::Canceled);
        }

        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);

        if status.success() {
            if !stdout.trim().is_empty() {
                debug!("Command output:\n{}", stdout);
            }
            return Ok(CommandExit::Success);
        }

        error!("Command `{}` failed with exit code: {:?}", command, status.code());
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr);
        }

        let message = if stderr.trim().is_empty() {
            format!("command `{}` failed with {}", command, status)
        } else {
            stderr
        };
        Ok(CommandExit::Failed(message))
    }
}

/// Drains a child pipe on a separate thread so the child never blocks on a full pipe.
fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buffer) {
                debug!("Failed to read command output: {}", e);
            }
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;

    fn commands(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_all_commands_succeed() {
        let temp_dir = tempdir().unwrap();
        let outcome = CommandRunner::default().run(
            &commands(&["echo one > a.txt", "cat a.txt > b.txt"]),
            temp_dir.path(),
            &CancelToken::new(),
        );

        assert!(outcome.is_success());
        assert!(outcome.messages.is_empty());
        let copied = std::fs::read_to_string(temp_dir.path().join("b.txt")).unwrap();
        assert_eq!(copied.trim(), "one");
    }

    #[test]
    fn test_empty_command_list() {
        let temp_dir = tempdir().unwrap();
        let outcome = CommandRunner::default().run(&[], temp_dir.path(), &CancelToken::new());
        assert_eq!(outcome, RunOutcome::success());
    }

    #[test]
    fn test_stops_at_first_failure() {
        let temp_dir = tempdir().unwrap();
        let outcome = CommandRunner::default().run(
            &commands(&[
                "echo one > a.txt",
                "echo 'something broke' >&2; exit 3",
                "echo two > b.txt",
            ]),
            temp_dir.path(),
            &CancelToken::new(),
        );

        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].contains("something broke"));
        assert!(temp_dir.path().join("a.txt").exists());
        assert!(!temp_dir.path().join("b.txt").exists());
    }

    #[test]
    fn test_failure_without_stderr() {
        let temp_dir = tempdir().unwrap();
        let outcome =
            CommandRunner::default().run(&commands(&["exit 2"]), temp_dir.path(), &CancelToken::new());

        assert_eq!(outcome.status, RunStatus::Error);
        assert!(outcome.messages[0].contains("exit 2"));
    }

    #[test]
    fn test_unknown_program() {
        let temp_dir = tempdir().unwrap();
        let outcome = CommandRunner::new(true).run(
            &commands(&["definitely-not-a-real-program-xyz"]),
            temp_dir.path(),
            &CancelToken::new(),
        );

        assert_eq!(outcome.status, RunStatus::Error);
        assert!(!outcome.messages.is_empty());
    }

    #[test]
    fn test_launch_fault() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("does/not/exist");
        let outcome =
            CommandRunner::default().run(&commands(&["echo hi"]), &missing, &CancelToken::new());

        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.messages.len(), 2);
        assert!(outcome.messages[1].contains("echo hi"));
    }

    #[test]
    fn test_canceled_before_start() {
        let temp_dir = tempdir().unwrap();
        let token = CancelToken::new();
        token.cancel();

        let outcome = CommandRunner::default().run(
            &commands(&["echo one > a.txt"]),
            temp_dir.path(),
            &token,
        );

        assert_eq!(outcome.status, RunStatus::Error);
        assert!(!temp_dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_cancel_kills_running_command() {
        let temp_dir = tempdir().unwrap();
        let token = CancelToken::new();
        let canceler = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            canceler.cancel();
        });

        let start = Instant::now();
        let outcome = CommandRunner::default().run(
            &commands(&["sleep 30", "echo after > after.txt"]),
            temp_dir.path(),
            &token,
        );
        handle.join().unwrap();

        assert_eq!(outcome.status, RunStatus::Error);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!temp_dir.path().join("after.txt").exists());
    }

    #[test]
    fn test_large_output_does_not_block() {
        let temp_dir = tempdir().unwrap();
        let outcome = CommandRunner::default().run(
            &commands(&["i=0; while [ $i -lt 20000 ]; do echo line $i; echo err $i >&2; i=$((i+1)); done"]),
            temp_dir.path(),
            &CancelToken::new(),
        );
        assert!(outcome.is_success());
    }

    #[test]
    fn test_track_after_cancel_kills_child() {
        let temp_dir = tempdir().unwrap();
        let child = SHELL
            .command("sleep 30")
            .current_dir(temp_dir.path())
            .stdin(Stdio::null())
            .spawn()
            .unwrap();

        let token = CancelToken::new();
        token.cancel();

        let started = Instant::now();
        assert!(!token.track(child));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(token.inner.child.lock().is_none());
    }
}
