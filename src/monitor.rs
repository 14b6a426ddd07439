//! Read-only snapshots for display. Publishing is fire-and-forget; nothing
//! in the scheduler waits on a monitor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::scheduler::queue::QueueStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub target: String,
    pub status: QueueStatus,
    pub taking: f64,
    pub ram_usage: f64,
    pub tickets: usize,
    pub pending: usize,
    pub outstanding: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    pub host: String,
    pub capacity: f64,
    pub free_ram: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub taken_at: DateTime<Utc>,
    pub queues: Vec<QueueSnapshot>,
    pub workers: Vec<WorkerSnapshot>,
    pub in_flight: usize,
    pub total_free_ram: f64,
    pub ticket_ram: f64,
}

impl SchedulerSnapshot {
    pub fn empty() -> Self {
        Self {
            taken_at: Utc::now(),
            queues: Vec::new(),
            workers: Vec::new(),
            in_flight: 0,
            total_free_ram: 0.0,
            ticket_ram: 0.0,
        }
    }
}

pub trait Monitor: Send + Sync {
    fn publish(&self, snapshot: &SchedulerSnapshot);
}

/// Writes a one-line summary per snapshot to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn publish(&self, snapshot: &SchedulerSnapshot) {
        let outstanding = snapshot.queues.iter().filter(|q| q.outstanding).count();
        tracing::info!(
            queues = snapshot.queues.len(),
            outstanding,
            workers = snapshot.workers.len(),
            in_flight = snapshot.in_flight,
            free_ram = snapshot.total_free_ram,
            ticket_ram = snapshot.ticket_ram,
            "Scheduler tick"
        );
    }
}

/// Keeps only the latest snapshot, for readers such as the dashboard.
#[derive(Debug)]
pub struct WatchMonitor {
    tx: watch::Sender<SchedulerSnapshot>,
}

impl WatchMonitor {
    pub fn new() -> (Self, watch::Receiver<SchedulerSnapshot>) {
        let (tx, rx) = watch::channel(SchedulerSnapshot::empty());
        (Self { tx }, rx)
    }
}

impl Monitor for WatchMonitor {
    fn publish(&self, snapshot: &SchedulerSnapshot) {
        self.tx.send_replace(snapshot.clone());
    }
}
