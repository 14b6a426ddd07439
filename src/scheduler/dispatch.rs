use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::config::SchedulerConfig;
use crate::error::{DispatchError, Result};
use crate::fleet::{Fleet, HostInfo};
use crate::monitor::{Monitor, SchedulerSnapshot, WorkerSnapshot};
use crate::scheduler::queue::{QueueStatus, TargetQueue};
use crate::scheduler::ticket::{ScriptKind, Ticket, TicketIds, TicketStatus};
use crate::scripts::ScriptRam;
use crate::target::Target;
use crate::worker::Launcher;

/// Part of a ticket running on one host.
#[derive(Debug, Clone)]
pub struct JobSlice {
    pub ticket: Arc<Ticket>,
    pub host: String,
    pub threads: u32,
    pub args: Vec<String>,
}

/// Arguments a ticket's jobs are started with. The ticket id keeps slices of
/// different tickets apart on the same host.
pub fn job_args(ticket: &Ticket) -> Vec<String> {
    vec![ticket.target().to_string(), format!("ticket-{}", ticket.id())]
}

/// Dispatch order: priority, then most expensive first, then oldest first.
fn dispatch_order(a: &Arc<Ticket>, b: &Arc<Ticket>) -> Ordering {
    a.priority()
        .cmp(&b.priority())
        .then_with(|| b.ram_cost().total_cmp(&a.ram_cost()))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Owns one [`TargetQueue`] per target and one [`Launcher`] per selected
/// worker, and moves tickets from the former onto the latter.
pub struct Scheduler {
    config: SchedulerConfig,
    fleet: Arc<dyn Fleet>,
    scripts: Arc<dyn ScriptRam>,
    ids: Arc<TicketIds>,
    targets: Vec<Arc<dyn Target>>,
    queues: Vec<TargetQueue>,
    launchers: Vec<Launcher>,
    in_flight: Vec<JobSlice>,
    monitor: Option<Arc<dyn Monitor>>,
    initialized: bool,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queues", &self.queues)
            .field("launchers", &self.launchers)
            .field("in_flight", &self.in_flight.len())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        fleet: Arc<dyn Fleet>,
        scripts: Arc<dyn ScriptRam>,
        targets: Vec<Arc<dyn Target>>,
    ) -> Self {
        Self {
            config,
            fleet,
            scripts,
            ids: Arc::new(TicketIds::new()),
            targets,
            queues: Vec::new(),
            launchers: Vec::new(),
            in_flight: Vec::new(),
            monitor: None,
            initialized: false,
        }
    }

    pub fn with_ids(mut self, ids: Arc<TicketIds>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn queues(&self) -> &[TargetQueue] {
        &self.queues
    }

    pub fn launchers(&self) -> &[Launcher] {
        &self.launchers
    }

    pub fn in_flight(&self) -> &[JobSlice] {
        &self.in_flight
    }

    /// Replace the target selection. Takes effect at the next [`init`](Self::init).
    pub fn set_targets(&mut self, targets: Vec<Arc<dyn Target>>) {
        self.targets = targets;
    }

    /// Build a queue per target and a launcher per usable worker.
    pub fn init(&mut self) {
        self.queues = self
            .targets
            .iter()
            .map(|target| {
                TargetQueue::with_log_capacity(
                    target.clone(),
                    self.config.taking,
                    self.config.log_capacity,
                    self.scripts.clone(),
                    self.ids.clone(),
                )
            })
            .collect();

        self.launchers = self
            .fleet
            .hosts()
            .into_iter()
            .filter(|host| self.config.worker_mode.selects(host))
            .filter_map(|host| match self.provision(&host) {
                Ok(launcher) => Some(launcher),
                Err(e) => {
                    tracing::warn!(host = %host.name, error = %e, "Skipping worker");
                    None
                }
            })
            .collect();

        self.initialized = true;
        tracing::info!(
            targets = self.queues.len(),
            workers = self.launchers.len(),
            mode = ?self.config.worker_mode,
            "Scheduler initialized"
        );
    }

    fn provision(&self, host: &HostInfo) -> Result<Launcher> {
        if !self.fleet.has_root(&host.name) && !self.fleet.acquire_root(&host.name) {
            return Err(DispatchError::WorkerNotFound(host.name.clone()));
        }
        if !self.fleet.deploy(&host.name, &self.config.scripts.paths()) {
            return Err(DispatchError::Deployment(host.name.clone()));
        }
        Ok(Launcher::new(
            host.name.clone(),
            self.fleet.clone(),
            self.scripts.clone(),
            self.config.scripts.clone(),
            self.config.launch_config(host),
        ))
    }

    fn launcher(&self, host: &str) -> Result<&Launcher> {
        self.launchers
            .iter()
            .find(|l| l.host() == host)
            .ok_or_else(|| DispatchError::WorkerNotFound(host.to_string()))
    }

    pub fn total_free_ram(&self) -> f64 {
        self.launchers.iter().map(|l| l.free_ram()).sum()
    }

    /// Share threads the launchers can actually fit, less the room pending
    /// tickets still need.
    fn spare_share_threads(&self) -> u32 {
        let per_thread = self.scripts.script_ram(ScriptKind::Share) + self.config.launch_epsilon;
        if per_thread.is_nan() || per_thread <= 0.0 {
            return 0;
        }
        let room: u32 = self
            .launchers
            .iter()
            .map(|l| l.available_threads(ScriptKind::Share))
            .sum();
        let unplaced: f64 = self.queues.iter().map(|q| q.unplaced_ram()).sum();
        let claimed = (unplaced / per_thread).ceil() as u32;
        room.saturating_sub(claimed)
    }

    /// Advance every queue once. Returns how many queues took new work.
    pub fn schedule_work(&mut self) -> usize {
        if !self.initialized {
            tracing::warn!("schedule_work called before init");
            return 0;
        }

        let boost = self.config.boost;
        let advanced = self
            .queues
            .iter_mut()
            .map(|queue| queue.advance(boost))
            .filter(|&took| took)
            .count();

        if self.config.share_spare_ram {
            let spare = self.spare_share_threads();
            if spare > 0 {
                if let Some(queue) = self
                    .queues
                    .iter_mut()
                    .find(|q| q.status() == QueueStatus::Running)
                {
                    queue.enqueue_share_threads(spare, boost);
                }
            }
        }

        tracing::debug!(advanced, queues = self.queues.len(), "Work scheduled");
        advanced
    }

    /// Reap finished jobs and place pending tickets on workers. Safe to call
    /// when there is nothing to do. Returns the number of threads started.
    pub async fn run(&mut self) -> u32 {
        if !self.initialized {
            return 0;
        }

        self.reap();

        let mut ready: Vec<Arc<Ticket>> = self
            .queues
            .iter()
            .flat_map(|q| q.unplaced_tickets())
            .collect();
        ready.sort_by(dispatch_order);

        let mut started = 0;
        for ticket in &ready {
            started += self.dispatch(ticket).await;
        }

        for queue in &mut self.queues {
            queue.prune_placed();
        }

        if let Some(monitor) = &self.monitor {
            monitor.publish(&self.snapshot());
        }
        started
    }

    /// Drop slices whose process has exited and mark tickets with nothing left
    /// to place or run as done.
    fn reap(&mut self) {
        let launchers = &self.launchers;
        let mut exited = Vec::new();
        self.in_flight.retain(|slice| {
            let running = launchers
                .iter()
                .find(|l| l.host() == slice.host)
                .is_some_and(|l| l.is_running(slice.ticket.kind(), &slice.args));
            if !running {
                exited.push(slice.ticket.clone());
            }
            running
        });

        for ticket in exited {
            let still_running = self
                .in_flight
                .iter()
                .any(|s| s.ticket.id() == ticket.id());
            if ticket.unplaced_threads() == 0 && !still_running && !ticket.is_done() {
                ticket.set_status(TicketStatus::Done);
                tracing::debug!(
                    target_name = ticket.target(),
                    ticket_id = %ticket.id(),
                    kind = %ticket.kind(),
                    "Ticket done"
                );
            }
        }
    }

    /// Place as many of the ticket's remaining threads as the workers allow,
    /// roomiest worker first.
    async fn dispatch(&mut self, ticket: &Arc<Ticket>) -> u32 {
        let kind = ticket.kind();
        let args = job_args(ticket);

        let mut order: Vec<(f64, usize)> = self
            .launchers
            .iter()
            .enumerate()
            .map(|(idx, l)| (l.free_ram(), idx))
            .collect();
        order.sort_by(|a, b| {
            b.0.total_cmp(&a.0).then_with(|| {
                self.launchers[a.1]
                    .host()
                    .cmp(self.launchers[b.1].host())
            })
        });

        let timeout = Some(self.config.launch_timeout());
        let mut started = 0;
        for (_, idx) in order {
            let remaining = ticket.unplaced_threads();
            if remaining == 0 {
                break;
            }
            let launcher = &self.launchers[idx];
            if launcher.available_threads(kind) == 0 || launcher.is_running(kind, &args) {
                continue;
            }

            match launcher.start(&[kind], remaining, &args, timeout).await {
                Ok(0) => {}
                Ok(threads) => {
                    let status = ticket.record_placement(threads);
                    tracing::info!(
                        target_name = ticket.target(),
                        ticket_id = %ticket.id(),
                        host = launcher.host(),
                        kind = %kind,
                        threads,
                        status = %status,
                        "Ticket dispatched"
                    );
                    self.in_flight.push(JobSlice {
                        ticket: ticket.clone(),
                        host: launcher.host().to_string(),
                        threads,
                        args: args.clone(),
                    });
                    started += threads;
                }
                Err(e) => {
                    tracing::warn!(
                        ticket_id = %ticket.id(),
                        host = launcher.host(),
                        error = %e,
                        "Launch failed"
                    );
                }
            }
        }

        if ticket.unplaced_threads() > 0 {
            tracing::debug!(
                target_name = ticket.target(),
                ticket_id = %ticket.id(),
                unplaced = ticket.unplaced_threads(),
                "Not enough free RAM, retrying next tick"
            );
        }
        started
    }

    /// Tear down queues and launchers. In-flight jobs are killed when
    /// `kill_on_cleanup` is set, otherwise they are left running and forgotten.
    pub async fn cleanup(&mut self) {
        let slices = std::mem::take(&mut self.in_flight);
        if self.config.kill_on_cleanup {
            let timeout = Some(self.config.launch_timeout());
            for slice in &slices {
                let killed = match self.launcher(&slice.host) {
                    Ok(launcher) => {
                        launcher
                            .kill(&[slice.ticket.kind()], &slice.args, timeout)
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = killed {
                    tracing::warn!(host = %slice.host, error = %e, "Failed to kill job");
                }
            }
        }

        self.queues.clear();
        self.launchers.clear();
        self.initialized = false;
        tracing::info!(
            dropped_jobs = slices.len(),
            killed = self.config.kill_on_cleanup,
            "Scheduler cleaned up"
        );
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let workers: Vec<WorkerSnapshot> = self
            .launchers
            .iter()
            .map(|l| WorkerSnapshot {
                host: l.host().to_string(),
                capacity: l.capacity(),
                free_ram: l.free_ram(),
            })
            .collect();
        SchedulerSnapshot {
            taken_at: Utc::now(),
            queues: self.queues.iter().map(|q| q.snapshot()).collect(),
            total_free_ram: workers.iter().map(|w| w.free_ram).sum(),
            workers,
            in_flight: self.in_flight.len(),
            ticket_ram: self.queues.iter().map(|q| q.current_ram_usage()).sum(),
        }
    }
}
