//! External process invocation.
//!
//! The render tool, the validate tool and hooks all go through a
//! [`CommandRunner`], so the orchestrator can be driven by a fake in tests.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::{Result, XprinError};

/// A program, its arguments and an optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// `sh -c <command>`.
    pub fn shell(command: &str) -> Self {
        Self::new("sh").arg("-c").arg(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Single-line rendering for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }

    /// Exit code for messages; `-1` stands for "killed by a signal".
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Returns the captured output for any exit status; errors only when the
    /// process could not be run at all.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Spawns real processes with an optional wall-clock limit.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation.display(), cwd = ?invocation.cwd, "running command");
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        let spawn_err = |source| XprinError::Spawn {
            program: invocation.program.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;

        // Drain both pipes while waiting so a chatty child cannot block on a
        // full pipe buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => match child.wait_timeout(limit).map_err(spawn_err)? {
                Some(status) => status,
                None => {
                    warn!(command = %invocation.display(), "command timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(XprinError::Timeout {
                        program: invocation.program.clone(),
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => child.wait().map_err(spawn_err)?,
        };

        let output = CommandOutput {
            stdout: stdout.recv().unwrap_or_default(),
            stderr: stderr.recv().unwrap_or_default(),
            exit_code: status.code(),
        };
        debug!(command = %invocation.program, exit_code = ?output.exit_code, "command finished");
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(buf);
            });
        }
        None => {
            let _ = tx.send(Vec::new());
        }
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let runner = ProcessRunner::default();
        let out = runner
            .run(&Invocation::shell("echo out; echo err >&2; exit 3"))
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[test]
    fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default();
        let out = runner
            .run(&Invocation::shell("pwd").current_dir(dir.path()))
            .unwrap();
        let printed = std::path::PathBuf::from(out.stdout_lossy().trim());
        assert_eq!(
            printed.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn timeout_kills_hung_commands() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(200)));
        let err = runner.run(&Invocation::shell("sleep 5")).unwrap_err();
        assert!(matches!(err, XprinError::Timeout { .. }));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = ProcessRunner::default();
        let err = runner
            .run(&Invocation::new("xprin-definitely-not-a-program"))
            .unwrap_err();
        assert!(matches!(err, XprinError::Spawn { .. }));
    }
}
