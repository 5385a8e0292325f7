//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use slurm_healthcheck::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, ShcError};

// Execution
pub use crate::exec::executor::{CommandExecutor, ExecOutput, SystemExecutor};
pub use crate::exec::scripted::ScriptedExecutor;

// Topology
pub use crate::topology::discovery::{Topology, TopologyDiscovery};
pub use crate::topology::model::{PlatformDescriptor, Role, RoleMapping};

// Checks
pub use crate::checks::catalog::{Catalog, RunMode};
pub use crate::checks::check::{Check, CheckContext};
pub use crate::checks::outcome::{Category, Status, TestResult};
pub use crate::checks::runner::CheckRunner;

// Reporting
pub use crate::report::run_report::{RunKind, RunReport};
pub use crate::report::summary::{OverallStatus, RunSummary, aggregate};

// Baseline
pub use crate::baseline::capture::Snapshotter;
pub use crate::baseline::compare::compare;
pub use crate::baseline::snapshot::BaselineSnapshot;

// Engine
pub use crate::engine::session::{LoadedBaseline, ValidationSession};
pub use crate::logger::activity::ActivityLog;
