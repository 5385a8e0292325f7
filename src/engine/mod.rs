//! Validation engine: wires discovery, checks, baselines and the activity log
//! into the run modes exposed on the command line.

pub mod session;
