//! Built-in checks of the standard catalog.

pub mod accounting;
pub mod cluster_state;
pub mod job_submission;
pub mod logs;
pub mod pyxis;
pub mod services;
pub mod system;

/// `systemctl is-active` prints exactly this for a running unit.
pub(crate) const ACTIVE: &str = "active";

/// Split a `|`-delimited record, keeping empty trailing fields.
pub(crate) fn fields(line: &str) -> Vec<&str> {
    line.split('|').map(str::trim).collect()
}
