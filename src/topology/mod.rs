//! Cluster topology: role mapping, platform descriptor, discovery.

pub mod discovery;
pub mod model;
