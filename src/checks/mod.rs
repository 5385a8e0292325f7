//! Health checks: outcome model, check abstraction, catalog, runner, built-ins.

pub mod builtin;
pub mod catalog;
pub mod check;
pub mod outcome;
pub mod runner;
