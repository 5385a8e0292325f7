//! Result aggregation and run reports.

pub mod run_report;
pub mod summary;
