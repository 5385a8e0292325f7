//! Typed cluster topology: roles, role mapping, platform descriptor.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::ClusterConfig;

/// Cluster-manager role carried by a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Controller,
    Accounting,
    ComputeClient,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Controller, Self::Accounting, Self::ComputeClient];

    /// Role tag as known to the cluster manager.
    #[must_use]
    pub const fn manager_tag(self) -> &'static str {
        match self {
            Self::Controller => "slurmserver",
            Self::Accounting => "slurmaccounting",
            Self::ComputeClient => "slurmclient",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Accounting => "accounting",
            Self::ComputeClient => "compute-client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Role → ordered hostnames. Built once per run; the first host of a role is
/// its primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    controller: Vec<String>,
    accounting: Vec<String>,
    compute_client: Vec<String>,
}

impl RoleMapping {
    #[must_use]
    pub fn new(controller: Vec<String>, accounting: Vec<String>, compute_client: Vec<String>) -> Self {
        Self {
            controller,
            accounting,
            compute_client,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role, hosts: Vec<String>) -> Self {
        *self.slot(role) = hosts;
        self
    }

    fn slot(&mut self, role: Role) -> &mut Vec<String> {
        match role {
            Role::Controller => &mut self.controller,
            Role::Accounting => &mut self.accounting,
            Role::ComputeClient => &mut self.compute_client,
        }
    }

    #[must_use]
    pub fn hosts(&self, role: Role) -> &[String] {
        match role {
            Role::Controller => &self.controller,
            Role::Accounting => &self.accounting,
            Role::ComputeClient => &self.compute_client,
        }
    }

    #[must_use]
    pub fn primary(&self, role: Role) -> Option<&str> {
        self.hosts(role).first().map(String::as_str)
    }

    #[must_use]
    pub fn has(&self, role: Role) -> bool {
        !self.hosts(role).is_empty()
    }
}

/// Platform major version, as read from the version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformMajor {
    /// Slurm lives on shared storage.
    V10,
    /// Slurm lives on node-local storage (11 and later).
    V11Plus,
    Unknown,
}

impl PlatformMajor {
    #[must_use]
    pub const fn from_major(major: u32) -> Self {
        match major {
            10 => Self::V10,
            m if m >= 11 => Self::V11Plus,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::V10 => "bcm10",
            Self::V11Plus => "bcm11",
            Self::Unknown => "unknown",
        }
    }
}

/// Version-dependent paths, consulted instead of hardcoding install roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub major_version: PlatformMajor,
    pub base_path: PathBuf,
    pub plugin_path: PathBuf,
}

impl PlatformDescriptor {
    #[must_use]
    pub fn for_major(major: PlatformMajor, cluster: &ClusterConfig) -> Self {
        let base = match major {
            PlatformMajor::V10 => &cluster.v10_slurm_base,
            PlatformMajor::V11Plus => &cluster.v11_slurm_base,
            PlatformMajor::Unknown => &cluster.default_slurm_base,
        };
        Self::from_base(major, base)
    }

    /// Safe default used whenever the version cannot be determined.
    #[must_use]
    pub fn fallback(cluster: &ClusterConfig) -> Self {
        Self::for_major(PlatformMajor::Unknown, cluster)
    }

    fn from_base(major: PlatformMajor, base: &Path) -> Self {
        Self {
            major_version: major,
            base_path: base.to_path_buf(),
            plugin_path: base.join("current").join("lib64").join("slurm"),
        }
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.major_version, PlatformMajor::Unknown)
    }

    /// Locations a Slurm plugin may live in: lib64 first, then lib.
    #[must_use]
    pub fn plugin_candidates(&self, file_name: &str) -> Vec<PathBuf> {
        let current = self.base_path.join("current");
        vec![
            self.plugin_path.join(file_name),
            current.join("lib").join("slurm").join(file_name),
        ]
    }
}
