//! Ordered check catalog.
//!
//! Declared order is report order. Categories must be contiguous so the report
//! never interleaves them; construction rejects a catalog that breaks this.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::checks::builtin::{
    accounting::{DatabaseConnection, JobHistory},
    cluster_state::{NodeHealth, Partitions},
    job_submission::JobSubmission,
    logs::LogScan,
    pyxis::PyxisPlugin,
    services::ServiceCheck,
    system::{MungeService, SlurmVersion},
};
use crate::checks::check::Check;
use crate::checks::outcome::Category;
use crate::core::config::Config;
use crate::core::errors::{Result, ShcError};

/// How the runner treats cluster-mutating checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Normal,
    /// Mutating checks are removed from the catalog before anything runs.
    Maintenance,
}

pub struct Catalog {
    checks: Vec<Box<dyn Check>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.checks.iter().map(|c| c.id()))
            .finish()
    }
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids and interleaved categories.
    pub fn new(checks: Vec<Box<dyn Check>>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut closed: HashSet<Category> = HashSet::new();
        let mut current: Option<Category> = None;

        for check in &checks {
            if !ids.insert(check.id()) {
                return Err(ShcError::InvalidCatalog {
                    details: format!("duplicate check id {:?}", check.id()),
                });
            }
            let category = check.category();
            if current != Some(category) {
                if closed.contains(&category) {
                    return Err(ShcError::InvalidCatalog {
                        details: format!(
                            "category {:?} reappears after another category (check {:?})",
                            category.label(),
                            check.id()
                        ),
                    });
                }
                if let Some(previous) = current {
                    closed.insert(previous);
                }
                current = Some(category);
            }
        }

        Ok(Self { checks })
    }

    /// The full health catalog in report order.
    pub fn standard(config: &Config) -> Result<Self> {
        Self::new(vec![
            Box::new(SlurmVersion),
            Box::new(ServiceCheck::controller()),
            Box::new(ServiceCheck::database()),
            Box::new(ServiceCheck::client(config.checks.client_service_sample)),
            Box::new(NodeHealth),
            Box::new(DatabaseConnection),
            Box::new(JobHistory),
            Box::new(Partitions),
            Box::new(MungeService),
            Box::new(LogScan::controller()),
            Box::new(LogScan::database()),
            Box::new(PyxisPlugin),
            Box::new(JobSubmission),
        ])
    }

    /// Checks eligible under `mode`, in declared order.
    #[must_use]
    pub fn for_mode(&self, mode: RunMode) -> Vec<&dyn Check> {
        self.checks
            .iter()
            .map(Box::as_ref)
            .filter(|check| mode == RunMode::Normal || !check.is_mutating())
            .collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.id()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
