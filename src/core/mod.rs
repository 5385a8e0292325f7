//! Core types: errors, configuration, local identity.

pub mod config;
pub mod errors;
pub mod identity;
