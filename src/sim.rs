//! Deterministic in-memory fleet and targets.
//!
//! Process lifetimes run on the tokio clock, so tests with a paused runtime
//! can step through job completion without real sleeping.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::fleet::{Fleet, FleetUpgrade, HostInfo, ProcessControl, WorkerCapacity};
use crate::scheduler::ticket::ScriptKind;
use crate::scripts::{ScriptRam, ScriptSet};
use crate::target::{MoneyTier, Target, ThreadPlan};

/// One successful `exec` call, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct SimLaunch {
    pub host: String,
    pub script: String,
    pub threads: u32,
    pub args: Vec<String>,
}

#[derive(Debug)]
struct SimProcess {
    script: String,
    args: Vec<String>,
    ram: f64,
    ends_at: Option<Instant>,
}

#[derive(Debug)]
struct SimHost {
    info: HostInfo,
    max_ram: f64,
    background_ram: f64,
    rooted: bool,
    rootable: bool,
    scripts: HashSet<String>,
    processes: Vec<SimProcess>,
}

impl SimHost {
    fn new(info: HostInfo, max_ram: f64, rooted: bool, rootable: bool) -> Self {
        Self {
            info,
            max_ram,
            background_ram: 0.0,
            rooted,
            rootable,
            scripts: HashSet::new(),
            processes: Vec::new(),
        }
    }

    fn reap(&mut self, now: Instant) {
        self.processes
            .retain(|p| p.ends_at.map_or(true, |end| end > now));
    }

    fn used_ram(&self) -> f64 {
        self.background_ram + self.processes.iter().map(|p| p.ram).sum::<f64>()
    }
}

#[derive(Debug, Default)]
struct SimState {
    hosts: BTreeMap<String, SimHost>,
    script_ram: HashMap<String, f64>,
    runtimes: HashMap<String, Option<Duration>>,
    next_pid: u32,
    refuse_execs: u32,
    deploy_failures: HashSet<String>,
    purchases: VecDeque<(String, f64)>,
    launches: Vec<SimLaunch>,
}

#[derive(Debug, Default)]
pub struct SimFleet {
    state: Mutex<SimState>,
}

impl SimFleet {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a host that already has root.
    pub fn with_host(self, info: HostInfo, max_ram: f64) -> Self {
        self.state()
            .hosts
            .insert(info.name.clone(), SimHost::new(info, max_ram, true, true));
        self
    }

    /// Add a host without root; `rootable` decides whether
    /// [`Fleet::acquire_root`] succeeds.
    pub fn with_locked_host(self, info: HostInfo, max_ram: f64, rootable: bool) -> Self {
        self.state()
            .hosts
            .insert(info.name.clone(), SimHost::new(info, max_ram, false, rootable));
        self
    }

    /// Register a script. `runtime: None` keeps its processes alive until
    /// killed or finished by hand.
    pub fn with_script(self, path: &str, ram: f64, runtime: Option<Duration>) -> Self {
        {
            let mut state = self.state();
            state.script_ram.insert(path.to_string(), ram);
            state.runtimes.insert(path.to_string(), runtime);
        }
        self
    }

    /// Register all four workload scripts with the costs from `ram`.
    pub fn with_scripts(
        mut self,
        set: &ScriptSet,
        ram: &dyn ScriptRam,
        runtime: Option<Duration>,
    ) -> Self {
        for kind in ScriptKind::ALL {
            self = self.with_script(set.path(kind), ram.script_ram(kind), runtime);
        }
        self
    }

    /// RAM taken on `host` by something other than scheduled jobs.
    pub fn set_background_ram(&self, host: &str, ram: f64) {
        if let Some(h) = self.state().hosts.get_mut(host) {
            h.background_ram = ram;
        }
    }

    /// Make the next `n` exec calls fail regardless of capacity.
    pub fn refuse_next_execs(&self, n: u32) {
        self.state().refuse_execs = n;
    }

    pub fn fail_deploy(&self, host: &str) {
        self.state().deploy_failures.insert(host.to_string());
    }

    /// Queue a host for the next [`FleetUpgrade::upgrade`].
    pub fn queue_purchase(&self, name: &str, max_ram: f64) {
        self.state().purchases.push_back((name.to_string(), max_ram));
    }

    /// End every process running `script` anywhere in the fleet.
    pub fn finish(&self, script: &str) {
        for host in self.state().hosts.values_mut() {
            host.processes.retain(|p| p.script != script);
        }
    }

    pub fn finish_all(&self) {
        for host in self.state().hosts.values_mut() {
            host.processes.clear();
        }
    }

    pub fn launches(&self) -> Vec<SimLaunch> {
        self.state().launches.clone()
    }

    pub fn process_count(&self, host: &str) -> usize {
        let now = Instant::now();
        self.state().hosts.get_mut(host).map_or(0, |h| {
            h.reap(now);
            h.processes.len()
        })
    }

    pub fn is_deployed(&self, host: &str, script: &str) -> bool {
        self.state()
            .hosts
            .get(host)
            .is_some_and(|h| h.scripts.contains(script))
    }
}

impl WorkerCapacity for SimFleet {
    fn max_ram(&self, host: &str) -> f64 {
        self.state().hosts.get(host).map_or(0.0, |h| h.max_ram)
    }

    fn used_ram(&self, host: &str) -> f64 {
        let now = Instant::now();
        self.state().hosts.get_mut(host).map_or(0.0, |h| {
            h.reap(now);
            h.used_ram()
        })
    }
}

impl ProcessControl for SimFleet {
    fn exec(&self, script: &str, host: &str, threads: u32, args: &[String]) -> Option<u32> {
        let now = Instant::now();
        let mut guard = self.state();
        let state = &mut *guard;

        if state.refuse_execs > 0 {
            state.refuse_execs -= 1;
            return None;
        }
        let per_thread = *state.script_ram.get(script)?;
        let runtime = state.runtimes.get(script).copied().flatten();
        let h = state.hosts.get_mut(host)?;
        h.reap(now);

        let ram = per_thread * f64::from(threads);
        if threads == 0
            || !h.rooted
            || !h.scripts.contains(script)
            || h.processes.iter().any(|p| p.script == script && p.args == args)
            || h.used_ram() + ram > h.max_ram
        {
            return None;
        }

        h.processes.push(SimProcess {
            script: script.to_string(),
            args: args.to_vec(),
            ram,
            ends_at: runtime.map(|d| now + d),
        });
        state.next_pid += 1;
        state.launches.push(SimLaunch {
            host: host.to_string(),
            script: script.to_string(),
            threads,
            args: args.to_vec(),
        });
        Some(state.next_pid)
    }

    fn is_running(&self, script: &str, host: &str, args: &[String]) -> bool {
        let now = Instant::now();
        self.state().hosts.get_mut(host).is_some_and(|h| {
            h.reap(now);
            h.processes
                .iter()
                .any(|p| p.script == script && p.args == args)
        })
    }

    fn kill(&self, script: &str, host: &str, args: &[String]) -> bool {
        self.state().hosts.get_mut(host).is_some_and(|h| {
            let before = h.processes.len();
            h.processes
                .retain(|p| !(p.script == script && p.args == args));
            h.processes.len() < before
        })
    }
}

impl Fleet for SimFleet {
    fn hosts(&self) -> Vec<HostInfo> {
        self.state().hosts.values().map(|h| h.info.clone()).collect()
    }

    fn has_root(&self, host: &str) -> bool {
        self.state().hosts.get(host).is_some_and(|h| h.rooted)
    }

    fn acquire_root(&self, host: &str) -> bool {
        self.state().hosts.get_mut(host).is_some_and(|h| {
            if h.rootable {
                h.rooted = true;
            }
            h.rooted
        })
    }

    fn deploy(&self, host: &str, scripts: &[&str]) -> bool {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.deploy_failures.contains(host) {
            return false;
        }
        match state.hosts.get_mut(host) {
            Some(h) => {
                h.scripts.extend(scripts.iter().map(|s| s.to_string()));
                true
            }
            None => false,
        }
    }
}

impl FleetUpgrade for SimFleet {
    fn can_upgrade(&self) -> bool {
        !self.state().purchases.is_empty()
    }

    fn upgrade(&self) -> bool {
        let mut state = self.state();
        match state.purchases.pop_front() {
            Some((name, max_ram)) => {
                let info = HostInfo::purchased(name.clone());
                state
                    .hosts
                    .insert(name, SimHost::new(info, max_ram, true, true));
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct TargetState {
    money_available: f64,
    money_max: f64,
    security_current: f64,
    security_min: f64,
    tier: MoneyTier,
    init_plan: Option<ThreadPlan>,
    attack_plan: Option<ThreadPlan>,
    init_calls: Vec<f64>,
    attack_calls: Vec<f64>,
}

/// Target with settable state and simple linear thread formulas. Fixed plans
/// can replace the formulas; every advisor call is recorded.
#[derive(Debug)]
pub struct SimTarget {
    name: String,
    state: Mutex<TargetState>,
}

impl SimTarget {
    /// Starts at full money and minimum security.
    pub fn new(name: &str, money_max: f64, security_min: f64) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(TargetState {
                money_available: money_max,
                money_max,
                security_current: security_min,
                security_min,
                tier: MoneyTier::Mid,
                init_plan: None,
                attack_plan: None,
                init_calls: Vec::new(),
                attack_calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_money(self, available: f64) -> Self {
        self.set_money(available);
        self
    }

    pub fn with_security(self, current: f64) -> Self {
        self.set_security(current);
        self
    }

    pub fn with_tier(self, tier: MoneyTier) -> Self {
        self.state().tier = tier;
        self
    }

    pub fn with_init_plan(self, plan: ThreadPlan) -> Self {
        self.state().init_plan = Some(plan);
        self
    }

    pub fn with_attack_plan(self, plan: ThreadPlan) -> Self {
        self.state().attack_plan = Some(plan);
        self
    }

    pub fn set_money(&self, available: f64) {
        self.state().money_available = available;
    }

    pub fn set_security(&self, current: f64) {
        self.state().security_current = current;
    }

    /// Taking fractions passed to `init_threads`, in call order.
    pub fn init_calls(&self) -> Vec<f64> {
        self.state().init_calls.clone()
    }

    /// Taking fractions passed to `attack_threads`, in call order.
    pub fn attack_calls(&self) -> Vec<f64> {
        self.state().attack_calls.clone()
    }
}

impl Target for SimTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn money_available(&self) -> f64 {
        self.state().money_available
    }

    fn money_max(&self) -> f64 {
        self.state().money_max
    }

    fn security_current(&self) -> f64 {
        self.state().security_current
    }

    fn security_min(&self) -> f64 {
        self.state().security_min
    }

    fn money_tier(&self) -> MoneyTier {
        self.state().tier
    }

    fn init_threads(&self, taking: f64) -> ThreadPlan {
        let mut state = self.state();
        state.init_calls.push(taking);
        state.init_plan.unwrap_or_else(|| {
            let grow = (taking * 25.0).ceil() as u32;
            ThreadPlan::new(0, grow, grow.div_ceil(12))
        })
    }

    fn attack_threads(&self, taking: f64) -> ThreadPlan {
        let mut state = self.state();
        state.attack_calls.push(taking);
        state.attack_plan.unwrap_or_else(|| {
            let hack = (taking * 20.0).ceil() as u32;
            let grow = hack * 2;
            ThreadPlan::new(hack, grow, (hack + grow).div_ceil(10))
        })
    }
}
