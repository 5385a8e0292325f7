//! Who and where the engine is running, stamped into reports and baselines.

use std::env;

/// Local hostname, or `"unknown"` when it cannot be read.
#[must_use]
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| env_or_unknown("HOSTNAME"))
    }
    #[cfg(not(unix))]
    {
        env_or_unknown("COMPUTERNAME")
    }
}

/// Name of the effective user, or `"unknown"`.
#[must_use]
pub fn username() -> String {
    #[cfg(unix)]
    {
        nix::unistd::User::from_uid(nix::unistd::geteuid())
            .ok()
            .flatten()
            .map_or_else(|| env_or_unknown("USER"), |user| user.name)
    }
    #[cfg(not(unix))]
    {
        env_or_unknown("USERNAME")
    }
}

fn env_or_unknown(key: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
