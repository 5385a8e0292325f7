//! Remote command executor: one interface for local and ssh-transported commands.
//!
//! Every invocation carries a deadline that the executor enforces itself by
//! polling the child and killing it once the deadline passes. A timeout is
//! reported as `timed_out = true`, distinct from a genuine non-zero exit, so
//! checks can tell "unreachable" from "check failed". The executor never
//! returns an error: launch failures become an output with no exit code and
//! the failure text on stderr.

#![allow(missing_docs)]

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::config::SshConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Process exit code; `None` when the process never started or was killed.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecOutput {
    /// Output of a command that exited with `code`.
    #[must_use]
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Output of a command killed at its deadline.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("command timed out after {}s", timeout.as_secs_f64()),
            timed_out: true,
        }
    }

    /// Output of a command that could not be started at all.
    #[must_use]
    pub fn launch_failure(details: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: details.into(),
            timed_out: false,
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    #[must_use]
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Non-empty, trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|line| !line.is_empty())
    }

    /// Short description of why the command did not succeed.
    #[must_use]
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None if self.timed_out => "timed out".to_string(),
            None => "command did not run".to_string(),
        }
    }
}

/// The single substrate every component uses to touch the cluster.
///
/// `host = None` runs the command on the local machine.
pub trait CommandExecutor {
    fn execute(&self, host: Option<&str>, argv: &[&str], timeout: Duration) -> ExecOutput;
}

/// Display label for an optional host.
#[must_use]
pub fn host_label(host: Option<&str>) -> &str {
    host.unwrap_or("local")
}

/// Executor backed by real processes; remote hosts are reached through ssh.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    ssh: SshConfig,
    connect_timeout_secs: u64,
}

impl SystemExecutor {
    #[must_use]
    pub fn new(ssh: SshConfig, connect_timeout_secs: u64) -> Self {
        Self {
            ssh,
            connect_timeout_secs,
        }
    }

    /// Full argv for running `argv` on `host` (or locally).
    #[must_use]
    pub fn command_line(&self, host: Option<&str>, argv: &[&str]) -> Vec<String> {
        let Some(host) = host else {
            return argv.iter().map(|s| (*s).to_string()).collect();
        };
        let mut line = vec![
            self.ssh.binary.clone(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        for option in &self.ssh.options {
            line.push("-o".to_string());
            line.push(option.clone());
        }
        line.push(host.to_string());
        line.push("--".to_string());
        line.push(
            argv.iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" "),
        );
        line
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, host: Option<&str>, argv: &[&str], timeout: Duration) -> ExecOutput {
        let line = self.command_line(host, argv);
        let Some((program, args)) = line.split_first() else {
            return ExecOutput::launch_failure("empty command");
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match child {
            Ok(child) => wait_with_deadline(child, timeout),
            Err(err) => ExecOutput::launch_failure(format!("failed to start {program}: {err}")),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Wait for `child`, killing it once `timeout` elapses.
///
/// Pipes are drained on background threads so a chatty child cannot block on
/// a full pipe buffer while we poll.
fn wait_with_deadline(mut child: Child, timeout: Duration) -> ExecOutput {
    let stdout_thread = drain(child.stdout.take());
    let stderr_thread = drain(child.stderr.take());
    let started = Instant::now();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return ExecOutput::launch_failure(format!("failed to wait for child: {err}"));
            }
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let Some(status) = status else {
        // A grandchild may still hold the pipes open; the reader threads are
        // left to finish on their own rather than blocking past the deadline.
        drop(stdout_thread);
        drop(stderr_thread);
        return ExecOutput::timeout(timeout);
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    ExecOutput {
        // Signal-terminated children have no code; report them like the shell does.
        exit_code: Some(status.code().unwrap_or(-1)),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        timed_out: false,
    }
}

/// Quote one argument for a POSIX shell.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'-' | b'_' | b'.' | b'/' | b':' | b'=' | b',' | b'%' | b'@' | b'+'
                )
        });
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
