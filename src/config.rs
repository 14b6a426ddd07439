use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::fleet::HostInfo;
use crate::scheduler::log::DEFAULT_LOG_CAPACITY;
use crate::scheduler::queue::{clamp_taking, DEFAULT_TAKING};
use crate::scripts::ScriptSet;

/// Which hosts get a launcher at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    #[default]
    All,
    Home,
    Purchased,
}

impl WorkerMode {
    pub fn selects(&self, host: &HostInfo) -> bool {
        match self {
            WorkerMode::All => true,
            WorkerMode::Home => host.is_home,
            WorkerMode::Purchased => host.purchased,
        }
    }
}

/// Per-host launcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfig {
    /// Upper bound on the RAM this launcher may consider, below the host's
    /// real maximum.
    pub ram_cap: Option<f64>,
    /// RAM that must stay free on the host.
    pub reserved_ram: f64,
    /// Safety margin added to each thread's RAM cost.
    pub epsilon: f64,
    pub poll_interval_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            ram_cap: None,
            reserved_ram: 0.0,
            epsilon: 0.01,
            poll_interval_ms: 200,
        }
    }
}

impl LaunchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fraction of a target's money each attack round aims to take.
    pub taking: f64,
    pub log_capacity: usize,
    /// Allow new work while a target still has work in flight.
    pub boost: bool,
    /// Fill RAM left over after ticket dispatch with share work.
    pub share_spare_ram: bool,
    pub worker_mode: WorkerMode,
    /// RAM kept free on the home host.
    pub home_reserved_ram: f64,
    pub ram_cap: Option<f64>,
    pub launch_epsilon: f64,
    pub poll_interval_ms: u64,
    pub launch_timeout_ms: u64,
    pub tick_interval_ms: u64,
    /// Kill in-flight jobs during cleanup instead of just forgetting them.
    pub kill_on_cleanup: bool,
    pub scripts: ScriptSet,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            taking: DEFAULT_TAKING,
            log_capacity: DEFAULT_LOG_CAPACITY,
            boost: false,
            share_spare_ram: false,
            worker_mode: WorkerMode::All,
            home_reserved_ram: 0.0,
            ram_cap: None,
            launch_epsilon: 0.01,
            poll_interval_ms: 200,
            launch_timeout_ms: 5_000,
            tick_interval_ms: 1_000,
            kill_on_cleanup: false,
            scripts: ScriptSet::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(taking: f64) -> Self {
        Self {
            taking: clamp_taking(taking),
            ..Default::default()
        }
    }

    pub fn with_boost(mut self, boost: bool) -> Self {
        self.boost = boost;
        self
    }

    pub fn with_share_spare_ram(mut self, share: bool) -> Self {
        self.share_spare_ram = share;
        self
    }

    pub fn with_worker_mode(mut self, mode: WorkerMode) -> Self {
        self.worker_mode = mode;
        self
    }

    pub fn with_home_reserved_ram(mut self, ram: f64) -> Self {
        self.home_reserved_ram = ram.max(0.0);
        self
    }

    pub fn with_ram_cap(mut self, cap: Option<f64>) -> Self {
        self.ram_cap = cap;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Launcher settings for `host`. Only the home host carries a RAM floor.
    pub fn launch_config(&self, host: &HostInfo) -> LaunchConfig {
        LaunchConfig {
            ram_cap: self.ram_cap,
            reserved_ram: if host.is_home {
                self.home_reserved_ram
            } else {
                0.0
            },
            epsilon: self.launch_epsilon,
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.taking, 0.5);
        assert_eq!(cfg.log_capacity, 10);
        assert!(!cfg.boost);
        assert!(!cfg.share_spare_ram);
        assert_eq!(cfg.worker_mode, WorkerMode::All);
        assert_eq!(cfg.launch_epsilon, 0.01);
        assert_eq!(cfg.tick_interval(), Duration::from_secs(1));
        assert_eq!(cfg.launch_timeout(), Duration::from_secs(5));
        assert!(!cfg.kill_on_cleanup);
    }

    #[test]
    fn scheduler_config_new_clamps_taking() {
        assert_eq!(SchedulerConfig::new(1.5).taking, 0.9);
        assert_eq!(SchedulerConfig::new(-1.0).taking, 0.0);
        assert_eq!(SchedulerConfig::new(f64::NAN).taking, 0.5);
    }

    #[test]
    fn home_host_gets_reserved_ram() {
        let cfg = SchedulerConfig::default()
            .with_home_reserved_ram(8.0)
            .with_ram_cap(Some(32.0));

        let home = cfg.launch_config(&HostInfo::home("home"));
        assert_eq!(home.reserved_ram, 8.0);
        assert_eq!(home.ram_cap, Some(32.0));

        let pserv = cfg.launch_config(&HostInfo::purchased("pserv-0"));
        assert_eq!(pserv.reserved_ram, 0.0);
        assert_eq!(pserv.ram_cap, Some(32.0));
    }

    #[test]
    fn worker_mode_filters_hosts() {
        let home = HostInfo::home("home");
        let pserv = HostInfo::purchased("pserv-0");
        let remote = HostInfo::remote("n00dles");

        assert!(WorkerMode::All.selects(&remote));
        assert!(WorkerMode::Home.selects(&home));
        assert!(!WorkerMode::Home.selects(&pserv));
        assert!(WorkerMode::Purchased.selects(&pserv));
        assert!(!WorkerMode::Purchased.selects(&remote));
    }

    #[test]
    fn launch_config_default() {
        let cfg = LaunchConfig::default();
        assert!(cfg.ram_cap.is_none());
        assert_eq!(cfg.reserved_ram, 0.0);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(200));
    }
}
