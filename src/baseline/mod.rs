//! Baseline capture and upgrade comparison.

pub mod capture;
pub mod compare;
pub mod policy;
pub mod snapshot;
