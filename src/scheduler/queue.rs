use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::monitor::QueueSnapshot;
use crate::scheduler::log::{TicketLog, DEFAULT_LOG_CAPACITY};
use crate::scheduler::ticket::{Priority, ScriptKind, Ticket, TicketIds};
use crate::scripts::ScriptRam;
use crate::target::{MoneyTier, Target};

pub const DEFAULT_TAKING: f64 = 0.5;
pub const MAX_TAKING: f64 = 0.9;

/// Security points removed per corrective weaken thread.
const SECURITY_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Created,
    Initiating,
    Running,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Created => write!(f, "created"),
            QueueStatus::Initiating => write!(f, "initiating"),
            QueueStatus::Running => write!(f, "running"),
        }
    }
}

/// Clamp a taking fraction into `[0, MAX_TAKING]`; NaN becomes the default.
pub fn clamp_taking(taking: f64) -> f64 {
    if taking.is_nan() {
        DEFAULT_TAKING
    } else {
        taking.clamp(0.0, MAX_TAKING)
    }
}

/// Work queue for a single target.
///
/// Decides when a target may receive more work and turns the target's thread
/// plans into tickets. Tickets land in two places: the bounded [`TicketLog`]
/// used to answer "is anything still in flight", and a pending list the
/// dispatcher drains as it places threads on workers.
pub struct TargetQueue {
    target: Arc<dyn Target>,
    taking: f64,
    log: TicketLog,
    log_capacity: usize,
    status: QueueStatus,
    pending: VecDeque<Arc<Ticket>>,
    scripts: Arc<dyn ScriptRam>,
    ids: Arc<TicketIds>,
}

impl fmt::Debug for TargetQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetQueue")
            .field("target", &self.target.name())
            .field("taking", &self.taking)
            .field("status", &self.status)
            .field("log", &self.log.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl TargetQueue {
    pub fn new(
        target: Arc<dyn Target>,
        taking: f64,
        scripts: Arc<dyn ScriptRam>,
        ids: Arc<TicketIds>,
    ) -> Self {
        Self::with_log_capacity(target, taking, DEFAULT_LOG_CAPACITY, scripts, ids)
    }

    pub fn with_log_capacity(
        target: Arc<dyn Target>,
        taking: f64,
        log_capacity: usize,
        scripts: Arc<dyn ScriptRam>,
        ids: Arc<TicketIds>,
    ) -> Self {
        Self {
            target,
            taking: clamp_taking(taking),
            log: TicketLog::new(log_capacity),
            log_capacity,
            status: QueueStatus::Created,
            pending: VecDeque::new(),
            scripts,
            ids,
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    pub fn taking(&self) -> f64 {
        self.taking
    }

    pub fn status(&self) -> QueueStatus {
        self.status
    }

    pub fn log(&self) -> &TicketLog {
        &self.log
    }

    pub fn ticket_count(&self) -> usize {
        self.log.len()
    }

    /// True while the log holds at least one ticket that is not `Done`.
    ///
    /// When every logged ticket is `Done` the log is swapped for an empty one;
    /// this is what closes a round and makes the queue eligible again.
    pub fn has_outstanding_work(&mut self) -> bool {
        if self.log.is_empty() {
            return false;
        }
        if self.log.all_done() {
            tracing::debug!(target_name = self.target.name(), "Round finished, log reset");
            self.log = TicketLog::new(self.log_capacity);
            return false;
        }
        true
    }

    /// Targets in the lowest money tier are never boosted.
    pub fn can_boost(&self, boost: bool) -> bool {
        if self.target.money_tier() == MoneyTier::Lowest {
            return false;
        }
        boost
    }

    /// Queue grow/weaken work to restore the target to full money, plus a
    /// corrective weaken for any security drift.
    pub fn enqueue_initial_phase(&mut self, boost: bool) -> usize {
        if self.has_outstanding_work() && !self.can_boost(boost) {
            return 0;
        }

        let money_max = self.target.money_max();
        let missing = if money_max > 0.0 {
            1.0 - self.target.money_available() / money_max
        } else {
            0.0
        };
        let missing = if missing.is_nan() {
            0.0
        } else {
            missing.clamp(0.0, 1.0)
        };

        let mut created = 0;
        let plan = self.target.init_threads(missing);
        if plan.grow > 0 {
            created += self.enqueue_raw(ScriptKind::Grow, plan.grow, None).is_some() as usize;
            created += self
                .enqueue_raw(ScriptKind::Weaken, plan.weaken, None)
                .is_some() as usize;
        }

        let drift = (self.target.security_current() - self.target.security_min()) / SECURITY_STEP;
        let drift = drift.round();
        if drift > 0.0 {
            // Security correction jumps ahead of ordinary weaken work.
            created += self
                .enqueue_raw(ScriptKind::Weaken, drift as u32, Some(Priority::Grow))
                .is_some() as usize;
        }

        tracing::debug!(
            target_name = self.target.name(),
            missing,
            grow = plan.grow,
            weaken = plan.weaken,
            drift,
            created,
            "Initial phase enqueued"
        );
        created
    }

    /// Queue one attack round at the configured taking fraction.
    pub fn enqueue_attack_phase(&mut self) -> usize {
        if self.has_outstanding_work() {
            return 0;
        }

        let plan = self.target.attack_threads(self.taking);
        let mut created = 0;
        for (kind, threads) in [
            (ScriptKind::Hack, plan.hack),
            (ScriptKind::Grow, plan.grow),
            (ScriptKind::Weaken, plan.weaken),
        ] {
            created += self.enqueue_raw(kind, threads, None).is_some() as usize;
        }

        tracing::debug!(
            target_name = self.target.name(),
            taking = self.taking,
            hack = plan.hack,
            grow = plan.grow,
            weaken = plan.weaken,
            "Attack phase enqueued"
        );
        created
    }

    /// Fill `ram_available` with share threads.
    pub fn enqueue_share_phase(&mut self, ram_available: f64, boost: bool) -> usize {
        if ram_available.is_nan() || ram_available <= 0.0 {
            return 0;
        }
        let per_thread = self.scripts.script_ram(ScriptKind::Share);
        if per_thread.is_nan() || per_thread <= 0.0 {
            return 0;
        }
        let threads = (ram_available / per_thread).floor() as u32;
        self.enqueue_share_threads(threads, boost)
    }

    /// Enqueue one share ticket of `threads` threads.
    pub fn enqueue_share_threads(&mut self, threads: u32, boost: bool) -> usize {
        if threads < 1 {
            return 0;
        }
        if self.has_outstanding_work() && !boost {
            tracing::debug!(target_name = self.target.name(), "Share skipped, work outstanding");
            return 0;
        }
        self.enqueue_raw(ScriptKind::Share, threads, None)
            .map_or(0, |_| 1)
    }

    /// Per-tick entry point. Returns false when nothing was attempted because
    /// work is still outstanding and boosting is not allowed.
    ///
    /// Each successful call moves the status one step forward. The first
    /// successful call runs the initial phase, every later one an attack phase.
    pub fn advance(&mut self, boost: bool) -> bool {
        let boost = self.can_boost(boost);
        if self.has_outstanding_work() && !boost {
            return false;
        }

        self.status = match self.status {
            QueueStatus::Created => QueueStatus::Initiating,
            QueueStatus::Initiating | QueueStatus::Running => QueueStatus::Running,
        };

        match self.status {
            QueueStatus::Running => self.enqueue_attack_phase(),
            _ => self.enqueue_initial_phase(boost),
        };
        true
    }

    /// Create a ticket for `threads` threads of `kind`. Thread counts below one
    /// are dropped without creating anything.
    pub fn enqueue_raw(
        &mut self,
        kind: ScriptKind,
        threads: u32,
        priority: Option<Priority>,
    ) -> Option<Arc<Ticket>> {
        if threads < 1 {
            return None;
        }

        let ram_cost = self.scripts.script_ram(kind) * f64::from(threads);
        let ticket = Arc::new(Ticket::new(
            self.ids.next_id(),
            self.target.name(),
            threads,
            kind,
            priority,
            ram_cost,
        ));
        tracing::trace!(
            target_name = self.target.name(),
            ticket_id = %ticket.id(),
            kind = %kind,
            threads,
            ram_cost,
            "Ticket created"
        );

        self.log.push(ticket.clone());
        self.pending.push_back(ticket.clone());
        Some(ticket)
    }

    /// Sum of the RAM cost of every ticket in the log, finished ones included.
    pub fn current_ram_usage(&self) -> f64 {
        self.log.iter().map(|t| t.ram_cost()).sum()
    }

    /// Tickets that still have threads waiting for a worker, oldest first.
    pub fn unplaced_tickets(&self) -> Vec<Arc<Ticket>> {
        self.pending
            .iter()
            .filter(|t| t.unplaced_threads() > 0)
            .cloned()
            .collect()
    }

    pub fn unplaced_ram(&self) -> f64 {
        self.pending
            .iter()
            .map(|t| self.scripts.script_ram(t.kind()) * f64::from(t.unplaced_threads()))
            .sum()
    }

    /// Drop fully placed tickets from the pending list.
    pub fn prune_placed(&mut self) {
        self.pending.retain(|t| t.unplaced_threads() > 0);
    }

    /// Read-only view for monitors; unlike [`has_outstanding_work`] this never
    /// resets the log.
    ///
    /// [`has_outstanding_work`]: Self::has_outstanding_work
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            target: self.target.name().to_string(),
            status: self.status,
            taking: self.taking,
            ram_usage: self.current_ram_usage(),
            tickets: self.log.len(),
            pending: self.pending.iter().filter(|t| t.unplaced_threads() > 0).count(),
            outstanding: !self.log.is_empty() && !self.log.all_done(),
        }
    }
}
