//! In-memory executor that replays canned outputs.
//!
//! Used by the test suites and by library consumers who want to drive the
//! engine without a live cluster. Responses are matched on host and argv
//! prefix; the most recently registered matching rule wins. Every call is
//! recorded so tests can assert what the engine asked for.

#![allow(missing_docs)]

use std::time::Duration;

use parking_lot::Mutex;

use crate::exec::executor::{CommandExecutor, ExecOutput};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostMatch {
    Any,
    Exactly(Option<String>),
}

#[derive(Debug, Clone)]
struct Rule {
    host: HostMatch,
    argv_prefix: Vec<String>,
    output: ExecOutput,
}

impl Rule {
    fn matches(&self, host: Option<&str>, argv: &[&str]) -> bool {
        let host_ok = match &self.host {
            HostMatch::Any => true,
            HostMatch::Exactly(expected) => expected.as_deref() == host,
        };
        host_ok
            && self.argv_prefix.len() <= argv.len()
            && self
                .argv_prefix
                .iter()
                .zip(argv)
                .all(|(want, got)| want == got)
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub host: Option<String>,
    pub argv: Vec<String>,
    pub timeout: Duration,
}

impl RecordedCall {
    /// The argv joined with spaces, handy for substring assertions.
    #[must_use]
    pub fn command(&self) -> String {
        self.argv.join(" ")
    }
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `argv_prefix` on any host.
    pub fn on(&self, argv_prefix: &[&str], output: ExecOutput) -> &Self {
        self.push(HostMatch::Any, argv_prefix, output)
    }

    /// Respond to `argv_prefix` on one specific host (`None` = local).
    pub fn on_host(&self, host: Option<&str>, argv_prefix: &[&str], output: ExecOutput) -> &Self {
        self.push(
            HostMatch::Exactly(host.map(str::to_string)),
            argv_prefix,
            output,
        )
    }

    /// Shorthand for a successful command printing `stdout`.
    pub fn ok(&self, argv_prefix: &[&str], stdout: &str) -> &Self {
        self.on(argv_prefix, ExecOutput::exited(0, stdout, ""))
    }

    fn push(&self, host: HostMatch, argv_prefix: &[&str], output: ExecOutput) -> &Self {
        self.rules.lock().push(Rule {
            host,
            argv_prefix: argv_prefix.iter().map(|s| (*s).to_string()).collect(),
            output,
        });
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls whose joined command contains `needle`.
    #[must_use]
    pub fn count_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.command().contains(needle))
            .count()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, host: Option<&str>, argv: &[&str], timeout: Duration) -> ExecOutput {
        self.calls.lock().push(RecordedCall {
            host: host.map(str::to_string),
            argv: argv.iter().map(|s| (*s).to_string()).collect(),
            timeout,
        });
        self.rules
            .lock()
            .iter()
            .rev()
            .find(|rule| rule.matches(host, argv))
            .map_or_else(
                || ExecOutput::launch_failure(format!("no scripted response for {argv:?}")),
                |rule| rule.output.clone(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_matching_rule_wins() {
        let exec = ScriptedExecutor::new();
        exec.ok(&["sinfo"], "old");
        exec.ok(&["sinfo", "--version"], "slurm 23.11.4");
        let out = exec.execute(None, &["sinfo", "--version"], Duration::from_secs(1));
        assert_eq!(out.stdout_trimmed(), "slurm 23.11.4");
        let out = exec.execute(None, &["sinfo", "-N"], Duration::from_secs(1));
        assert_eq!(out.stdout_trimmed(), "old");
    }

    #[test]
    fn host_specific_rules_only_match_their_host() {
        let exec = ScriptedExecutor::new();
        exec.on_host(
            Some("ctl-01"),
            &["systemctl"],
            ExecOutput::exited(0, "active\n", ""),
        );
        assert!(
            exec.execute(Some("ctl-01"), &["systemctl", "is-active"], Duration::from_secs(1))
                .success()
        );
        assert!(
            !exec
                .execute(Some("ctl-02"), &["systemctl", "is-active"], Duration::from_secs(1))
                .success()
        );
    }

    #[test]
    fn unmatched_calls_fail_and_are_recorded() {
        let exec = ScriptedExecutor::new();
        let out = exec.execute(Some("db-01"), &["journalctl"], Duration::from_secs(3));
        assert!(!out.success());
        assert!(!out.timed_out);
        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].host.as_deref(), Some("db-01"));
        assert_eq!(calls[0].timeout, Duration::from_secs(3));
        assert_eq!(exec.count_containing("journal"), 1);
    }
}
