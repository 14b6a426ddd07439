use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::fleet::FleetUpgrade;
use crate::scheduler::Scheduler;

/// The single loop that drives a [`Scheduler`].
///
/// Each tick:
///
/// 1. Polls the fleet-change signal; when an upgrade changes the fleet the
///    scheduler is cleaned up and rebuilt
/// 2. `schedule_work()`, then sleeps one tick interval
/// 3. `run()`, then sleeps one tick interval
///
/// Ticks never overlap. Cancellation is only observed at the sleeps, so a
/// tick always completes before the loop exits.
pub struct Driver {
    scheduler: Scheduler,
    upgrader: Option<Arc<dyn FleetUpgrade>>,
    tick_interval: Duration,
    ticks: u64,
}

impl Driver {
    pub fn new(scheduler: Scheduler) -> Self {
        let tick_interval = scheduler.config().tick_interval();
        Self {
            scheduler,
            upgrader: None,
            tick_interval,
            ticks: 0,
        }
    }

    pub fn with_upgrader(mut self, upgrader: Arc<dyn FleetUpgrade>) -> Self {
        self.upgrader = Some(upgrader);
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until `token` is cancelled, then clean up and hand the scheduler
    /// back.
    pub async fn run(mut self, token: CancellationToken) -> Scheduler {
        if !self.scheduler.is_initialized() {
            self.scheduler.init();
        }
        tracing::info!(tick_ms = self.tick_interval.as_millis() as u64, "Driver started");

        loop {
            self.check_fleet().await;

            self.scheduler.schedule_work();
            if self.pause(&token).await {
                break;
            }

            let started = self.scheduler.run().await;
            self.ticks += 1;
            tracing::debug!(tick = self.ticks, started, "Tick complete");
            if self.pause(&token).await {
                break;
            }
        }

        tracing::info!(ticks = self.ticks, "Driver stopping");
        self.scheduler.cleanup().await;
        self.scheduler
    }

    async fn check_fleet(&mut self) {
        let Some(upgrader) = self.upgrader.clone() else {
            return;
        };
        if !upgrader.can_upgrade() {
            return;
        }

        if !upgrader.upgrade() {
            tracing::warn!("Fleet upgrade reported no change");
            return;
        }

        tracing::info!("Worker fleet changed");
        self.scheduler.cleanup().await;
        self.scheduler.init();
    }

    /// Returns true if cancelled while sleeping.
    async fn pause(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(self.tick_interval) => false,
        }
    }
}
