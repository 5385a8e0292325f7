#![forbid(unsafe_code)]

//! Slurm Health Check (shc): cluster validation engine for Slurm on a
//! cluster-manager-administered platform.
//!
//! Two jobs:
//! 1. **Health checks**: discover which hosts hold the controller, accounting
//!    and compute-client roles, then run an ordered catalog of local and
//!    remote probes, each classified PASS/WARN/FAIL/SKIP.
//! 2. **Upgrade verification**: capture a baseline snapshot of accounting and
//!    configuration state, then diff the live cluster against it under a
//!    fixed per-field policy so lost records surface as FAIL.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use slurm_healthcheck::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use slurm_healthcheck::core::config::Config;
//! use slurm_healthcheck::baseline::compare::compare;
//! ```

pub mod prelude;

pub mod baseline;
pub mod checks;
pub mod core;
pub mod engine;
pub mod exec;
pub mod logger;
pub mod report;
pub mod topology;
