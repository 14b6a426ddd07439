//! Worker-side capabilities: capacity queries, process control, host
//! discovery and provisioning. The scheduler never owns a worker.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub is_home: bool,
    pub purchased: bool,
}

impl HostInfo {
    pub fn home(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_home: true,
            purchased: false,
        }
    }

    pub fn purchased(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_home: false,
            purchased: true,
        }
    }

    pub fn remote(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_home: false,
            purchased: false,
        }
    }
}

/// Live RAM figures for a host. Read fresh on every call; nothing caches them.
pub trait WorkerCapacity: Send + Sync {
    fn max_ram(&self, host: &str) -> f64;
    fn used_ram(&self, host: &str) -> f64;
}

pub trait ProcessControl: Send + Sync {
    /// Start `threads` threads of `script` on `host`. Returns the pid, or
    /// `None` when the launch was refused.
    fn exec(&self, script: &str, host: &str, threads: u32, args: &[String]) -> Option<u32>;

    fn is_running(&self, script: &str, host: &str, args: &[String]) -> bool;

    /// Returns true if a matching process was found and signalled.
    fn kill(&self, script: &str, host: &str, args: &[String]) -> bool;
}

pub trait Fleet: WorkerCapacity + ProcessControl {
    fn hosts(&self) -> Vec<HostInfo>;
    fn has_root(&self, host: &str) -> bool;

    /// Try to gain the privilege needed to run scripts on `host`.
    fn acquire_root(&self, host: &str) -> bool;

    /// Copy `scripts` onto `host`. Returns false if any copy failed.
    fn deploy(&self, host: &str, scripts: &[&str]) -> bool;
}

/// Signal that the worker fleet can grow (e.g. a new host can be bought).
pub trait FleetUpgrade: Send + Sync {
    fn can_upgrade(&self) -> bool;

    /// Perform the upgrade. Returns false if nothing changed.
    fn upgrade(&self) -> bool;
}
