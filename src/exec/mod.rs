//! Command execution substrate: local/remote executor with deadlines.

pub mod executor;
pub mod scripted;
