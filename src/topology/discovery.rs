//! Topology discovery: role → hosts via the cluster manager, plus platform detection.
//!
//! All text-format handling of cluster-manager output lives here. A failed or
//! empty role query degrades to an empty host list and a WARN outcome; it never
//! aborts discovery of the other roles.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;

use crate::checks::outcome::{Category, TestResult};
use crate::core::config::Config;
use crate::exec::executor::CommandExecutor;
use crate::topology::model::{PlatformDescriptor, PlatformMajor, Role, RoleMapping};

/// Discovered, immutable view of the cluster for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub roles: RoleMapping,
    pub platform: PlatformDescriptor,
    pub cmsh_path: Option<PathBuf>,
}

impl Topology {
    #[must_use]
    pub fn new(roles: RoleMapping, platform: PlatformDescriptor) -> Self {
        Self {
            roles,
            platform,
            cmsh_path: None,
        }
    }
}

/// Topology plus the outcomes discovery itself produced.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub topology: Topology,
    pub outcomes: Vec<TestResult>,
}

pub struct TopologyDiscovery<'a> {
    executor: &'a dyn CommandExecutor,
    config: &'a Config,
}

impl<'a> TopologyDiscovery<'a> {
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, config: &'a Config) -> Self {
        Self { executor, config }
    }

    /// Discover every role and the platform descriptor. Never fails.
    #[must_use]
    pub fn discover_all(&self) -> DiscoveryReport {
        let mut outcomes = Vec::new();

        let started = Instant::now();
        let (platform, platform_outcome) = self.detect_platform();
        outcomes.push(platform_outcome.with_duration(started.elapsed()));

        let cmsh_path = self.locate_cmsh();
        let mut roles = RoleMapping::default();
        for role in Role::ALL {
            let started = Instant::now();
            let name = format!("Role {}", role.manager_tag());
            let outcome = match cmsh_path.as_deref() {
                None => TestResult::warn(
                    Category::Topology,
                    name,
                    format!(
                        "cluster manager shell not found; {} checks will be skipped",
                        role.label()
                    ),
                )
                .with_detail(
                    "searched",
                    self.config
                        .cluster
                        .cmsh_candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                ),
                Some(cmsh) => match self.discover(cmsh, role) {
                    Ok(hosts) if hosts.is_empty() => TestResult::warn(
                        Category::Topology,
                        name,
                        format!("no hosts carry role {}", role.manager_tag()),
                    ),
                    Ok(hosts) => {
                        let outcome = TestResult::pass(
                            Category::Topology,
                            name,
                            format!("{} host(s): {}", hosts.len(), hosts.join(", ")),
                        )
                        .with_detail("hosts", hosts.clone());
                        roles = roles.with_role(role, hosts);
                        outcome
                    }
                    Err(reason) => TestResult::warn(
                        Category::Topology,
                        name,
                        format!("role query failed: {reason}"),
                    )
                    .with_detail("error", reason),
                },
            };
            outcomes.push(outcome.with_duration(started.elapsed()));
        }

        DiscoveryReport {
            topology: Topology {
                roles,
                platform,
                cmsh_path,
            },
            outcomes,
        }
    }

    /// Ordered hostnames carrying `role`, as reported by the cluster manager.
    pub fn discover(&self, cmsh: &Path, role: Role) -> Result<Vec<String>, String> {
        let query = format!("device; foreach -l {} (get hostname)", role.manager_tag());
        let cmsh = cmsh.display().to_string();
        let out = self.executor.execute(
            None,
            &[cmsh.as_str(), "-c", query.as_str()],
            self.config.timeouts.discovery(),
        );
        if !out.success() {
            return Err(out.failure_text());
        }
        Ok(parse_role_hosts(&out.stdout))
    }

    /// First configured cmsh candidate that exists and is executable.
    #[must_use]
    pub fn locate_cmsh(&self) -> Option<PathBuf> {
        self.config
            .cluster
            .cmsh_candidates
            .iter()
            .find(|candidate| {
                let path = candidate.display().to_string();
                self.executor
                    .execute(
                        None,
                        &["test", "-x", path.as_str()],
                        self.config.timeouts.version_probe(),
                    )
                    .success()
            })
            .cloned()
    }

    /// Platform descriptor from the version probe, falling back to install-root
    /// detection and finally to the safe default.
    #[must_use]
    pub fn detect_platform(&self) -> (PlatformDescriptor, TestResult) {
        let cluster = &self.config.cluster;
        let probe = cluster.cmd_conf_path.display().to_string();
        let out = self.executor.execute(
            None,
            &["grep", "VERSION", probe.as_str()],
            self.config.timeouts.version_probe(),
        );
        let probe_error = if out.success() {
            if let Some(major) = parse_platform_major(&out.stdout) {
                let desc = PlatformDescriptor::for_major(PlatformMajor::from_major(major), cluster);
                if !desc.is_fallback() {
                    let outcome = platform_pass(&desc, &format!("version {major}"));
                    return (desc, outcome);
                }
            }
            format!("unrecognised version line in {probe}")
        } else {
            out.failure_text()
        };

        for (major, base) in [
            (PlatformMajor::V10, &cluster.v10_slurm_base),
            (PlatformMajor::V11Plus, &cluster.v11_slurm_base),
        ] {
            let current = base.join("current").display().to_string();
            if self
                .executor
                .execute(
                    None,
                    &["test", "-d", current.as_str()],
                    self.config.timeouts.version_probe(),
                )
                .success()
            {
                let desc = PlatformDescriptor::for_major(major, cluster);
                let outcome = platform_pass(&desc, &format!("found {current}"));
                return (desc, outcome);
            }
        }

        let desc = PlatformDescriptor::fallback(cluster);
        let outcome = TestResult::warn(
            Category::Topology,
            "Platform Version",
            format!(
                "platform version undetected ({probe_error}); using default {}",
                desc.base_path.display()
            ),
        )
        .with_detail("probe", probe)
        .with_detail("error", probe_error)
        .with_detail("base_path", desc.base_path.display().to_string());
        (desc, outcome)
    }
}

fn platform_pass(desc: &PlatformDescriptor, evidence: &str) -> TestResult {
    TestResult::pass(
        Category::Topology,
        "Platform Version",
        format!(
            "{} ({evidence}), slurm under {}",
            desc.major_version.tag(),
            desc.base_path.display()
        ),
    )
    .with_detail("platform", desc.major_version.tag())
    .with_detail("base_path", desc.base_path.display().to_string())
}

/// Hostnames from `foreach ... (get hostname)` output.
///
/// One hostname per line; lines containing whitespace are cmsh diagnostics, not
/// hostnames. Duplicates keep their first position.
#[must_use]
pub fn parse_role_hosts(stdout: &str) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    for line in stdout.lines().map(str::trim) {
        if line.is_empty() || line.contains(char::is_whitespace) {
            continue;
        }
        if !hosts.iter().any(|h| h == line) {
            hosts.push(line.to_string());
        }
    }
    hosts
}

/// Major version from the first line matching `VERSION\s+(\d+)\.`, anywhere
/// in the line.
#[must_use]
pub fn parse_platform_major(text: &str) -> Option<u32> {
    static VERSION_LINE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = VERSION_LINE
        .get_or_init(|| Regex::new(r"VERSION\s+(\d+)\.").ok())
        .as_ref()?;
    text.lines()
        .find_map(|line| re.captures(line)?.get(1)?.as_str().parse().ok())
}
