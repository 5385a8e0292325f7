//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ShcError};

/// Full healthcheck configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub timeouts: TimeoutConfig,
    pub cluster: ClusterConfig,
    pub checks: ChecksConfig,
    pub baseline: BaselineConfig,
    pub ssh: SshConfig,
    pub paths: PathsConfig,
}

/// Per-operation deadlines, in seconds. Every remote operation carries one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_secs: u64,
    pub discovery_secs: u64,
    pub version_probe_secs: u64,
    pub accounting_secs: u64,
    pub job_history_secs: u64,
    pub job_submission_secs: u64,
    pub log_read_secs: u64,
    pub ssh_connect_secs: u64,
}

impl TimeoutConfig {
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }

    #[must_use]
    pub const fn discovery(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    #[must_use]
    pub const fn version_probe(&self) -> Duration {
        Duration::from_secs(self.version_probe_secs)
    }

    #[must_use]
    pub const fn accounting(&self) -> Duration {
        Duration::from_secs(self.accounting_secs)
    }

    #[must_use]
    pub const fn job_history(&self) -> Duration {
        Duration::from_secs(self.job_history_secs)
    }

    #[must_use]
    pub const fn job_submission(&self) -> Duration {
        Duration::from_secs(self.job_submission_secs)
    }

    #[must_use]
    pub const fn log_read(&self) -> Duration {
        Duration::from_secs(self.log_read_secs)
    }
}

/// Cluster-manager integration points and version-dependent install roots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Candidate locations of the cluster-manager shell, probed in order.
    pub cmsh_candidates: Vec<PathBuf>,
    /// File whose `VERSION` line identifies the platform major version.
    pub cmd_conf_path: PathBuf,
    /// Shared storage visible to every compute node (job-submission artifact).
    pub shared_dir: PathBuf,
    /// Slurm install root on version-10 platforms.
    pub v10_slurm_base: PathBuf,
    /// Slurm install root on version-11+ platforms.
    pub v11_slurm_base: PathBuf,
    /// Slurm install root assumed when the version cannot be detected.
    pub default_slurm_base: PathBuf,
}

/// Knobs for individual checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChecksConfig {
    pub log_tail_lines: u32,
    pub log_error_patterns: Vec<String>,
    /// Number of compute-client hosts probed for `slurmd`.
    pub client_service_sample: usize,
    /// Share of problem nodes at which node health escalates from WARN to FAIL.
    pub problem_node_fail_ratio: f64,
}

/// Longest accepted job window, in days.
pub const MAX_JOB_WINDOW_DAYS: u32 = 3650;

/// Baseline capture settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BaselineConfig {
    pub job_window_days: u32,
}

/// Remote-shell transport options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshConfig {
    pub binary: String,
    /// Extra `-o` options passed on every invocation.
    pub options: Vec<String>,
}

/// Filesystem paths used by the tool itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
    /// Used when `jsonl_log` cannot be opened.
    pub jsonl_fallback: Option<PathBuf>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 30,
            discovery_secs: 15,
            version_probe_secs: 5,
            accounting_secs: 30,
            job_history_secs: 60,
            job_submission_secs: 120,
            log_read_secs: 30,
            ssh_connect_secs: 5,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cmsh_candidates: vec![
                PathBuf::from("/cm/local/apps/cmd/bin/cmsh"),
                PathBuf::from("/usr/bin/cmsh"),
                PathBuf::from("/usr/local/bin/cmsh"),
            ],
            cmd_conf_path: PathBuf::from("/cm/local/apps/cmd/etc/cmd.conf"),
            shared_dir: PathBuf::from("/cm/shared"),
            v10_slurm_base: PathBuf::from("/cm/shared/apps/slurm"),
            v11_slurm_base: PathBuf::from("/cm/local/apps/slurm"),
            default_slurm_base: PathBuf::from("/cm/local/apps/slurm"),
        }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            log_tail_lines: 100,
            log_error_patterns: vec![
                "error".to_string(),
                "fatal".to_string(),
                "critical".to_string(),
            ],
            client_service_sample: 4,
            problem_node_fail_ratio: 0.10,
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            job_window_days: 30,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            options: vec![
                "StrictHostKeyChecking=no".to_string(),
                "BatchMode=yes".to_string(),
            ],
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[SHC-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir
            .join(".config")
            .join("slurm-healthcheck")
            .join("config.toml");
        let data = home_dir
            .join(".local")
            .join("share")
            .join("slurm-healthcheck");
        Self {
            config_file: cfg,
            jsonl_log: data.join("activity.jsonl"),
            jsonl_fallback: Some(env::temp_dir().join("slurm-healthcheck.jsonl")),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ShcError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(ShcError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Compiled log error patterns (case-insensitive).
    pub fn log_error_regexes(&self) -> Result<Vec<Regex>> {
        self.checks
            .log_error_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){pattern}")).map_err(|err| ShcError::InvalidConfig {
                    details: format!("checks.log_error_patterns entry {pattern:?}: {err}"),
                })
            })
            .collect()
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // timeouts
        for (name, slot) in [
            ("SHC_TIMEOUT_DEFAULT_SECS", &mut self.timeouts.default_secs),
            ("SHC_TIMEOUT_DISCOVERY_SECS", &mut self.timeouts.discovery_secs),
            (
                "SHC_TIMEOUT_VERSION_PROBE_SECS",
                &mut self.timeouts.version_probe_secs,
            ),
            (
                "SHC_TIMEOUT_ACCOUNTING_SECS",
                &mut self.timeouts.accounting_secs,
            ),
            (
                "SHC_TIMEOUT_JOB_HISTORY_SECS",
                &mut self.timeouts.job_history_secs,
            ),
            (
                "SHC_TIMEOUT_JOB_SUBMISSION_SECS",
                &mut self.timeouts.job_submission_secs,
            ),
            ("SHC_TIMEOUT_LOG_READ_SECS", &mut self.timeouts.log_read_secs),
            (
                "SHC_TIMEOUT_SSH_CONNECT_SECS",
                &mut self.timeouts.ssh_connect_secs,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env::<u64>(name, &raw)?;
            }
        }

        // cluster
        if let Some(raw) = lookup("SHC_CLUSTER_CMD_CONF_PATH") {
            self.cluster.cmd_conf_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SHC_CLUSTER_SHARED_DIR") {
            self.cluster.shared_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SHC_CLUSTER_CMSH") {
            // An explicit cmsh location is tried before the configured candidates.
            self.cluster.cmsh_candidates.insert(0, PathBuf::from(raw));
        }

        // checks
        if let Some(raw) = lookup("SHC_CHECKS_LOG_TAIL_LINES") {
            self.checks.log_tail_lines = parse_env::<u32>("SHC_CHECKS_LOG_TAIL_LINES", &raw)?;
        }
        if let Some(raw) = lookup("SHC_CHECKS_CLIENT_SERVICE_SAMPLE") {
            self.checks.client_service_sample =
                parse_env::<usize>("SHC_CHECKS_CLIENT_SERVICE_SAMPLE", &raw)?;
        }
        if let Some(raw) = lookup("SHC_CHECKS_PROBLEM_NODE_FAIL_RATIO") {
            self.checks.problem_node_fail_ratio =
                parse_env::<f64>("SHC_CHECKS_PROBLEM_NODE_FAIL_RATIO", &raw)?;
        }

        // baseline
        if let Some(raw) = lookup("SHC_BASELINE_JOB_WINDOW_DAYS") {
            self.baseline.job_window_days = parse_env::<u32>("SHC_BASELINE_JOB_WINDOW_DAYS", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("SHC_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, val) in [
            ("default_secs", self.timeouts.default_secs),
            ("discovery_secs", self.timeouts.discovery_secs),
            ("version_probe_secs", self.timeouts.version_probe_secs),
            ("accounting_secs", self.timeouts.accounting_secs),
            ("job_history_secs", self.timeouts.job_history_secs),
            ("job_submission_secs", self.timeouts.job_submission_secs),
            ("log_read_secs", self.timeouts.log_read_secs),
            ("ssh_connect_secs", self.timeouts.ssh_connect_secs),
        ] {
            if val == 0 {
                return Err(ShcError::InvalidConfig {
                    details: format!("timeouts.{name} must be > 0"),
                });
            }
        }

        if self.cluster.cmsh_candidates.is_empty() {
            return Err(ShcError::InvalidConfig {
                details: "cluster.cmsh_candidates must name at least one location".to_string(),
            });
        }

        if !(1..=MAX_JOB_WINDOW_DAYS).contains(&self.baseline.job_window_days) {
            return Err(ShcError::InvalidConfig {
                details: format!(
                    "baseline.job_window_days must be in [1,{MAX_JOB_WINDOW_DAYS}], got {}",
                    self.baseline.job_window_days
                ),
            });
        }

        if self.checks.client_service_sample == 0 {
            return Err(ShcError::InvalidConfig {
                details: "checks.client_service_sample must be >= 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.checks.problem_node_fail_ratio) {
            return Err(ShcError::InvalidConfig {
                details: format!(
                    "checks.problem_node_fail_ratio must be in [0,1], got {}",
                    self.checks.problem_node_fail_ratio
                ),
            });
        }

        if self.checks.log_tail_lines == 0 {
            return Err(ShcError::InvalidConfig {
                details: "checks.log_tail_lines must be >= 1".to_string(),
            });
        }

        if self.ssh.binary.trim().is_empty() {
            return Err(ShcError::InvalidConfig {
                details: "ssh.binary must not be empty".to_string(),
            });
        }

        self.log_error_regexes()?;
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| ShcError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
