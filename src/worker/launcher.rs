use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LaunchConfig;
use crate::error::{DispatchError, Result};
use crate::fleet::Fleet;
use crate::scheduler::ticket::ScriptKind;
use crate::scripts::{ScriptRam, ScriptSet};

/// Runs workload scripts on one worker host within its free RAM.
///
/// Capacity is read from the fleet on every call. Two launches in the same
/// tick only see each other if the first one has already started by the time
/// the second asks; there is no reservation ledger.
#[derive(Clone)]
pub struct Launcher {
    host: String,
    fleet: Arc<dyn Fleet>,
    scripts: Arc<dyn ScriptRam>,
    paths: ScriptSet,
    config: LaunchConfig,
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("host", &self.host)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Launcher {
    pub fn new(
        host: impl Into<String>,
        fleet: Arc<dyn Fleet>,
        scripts: Arc<dyn ScriptRam>,
        paths: ScriptSet,
        config: LaunchConfig,
    ) -> Self {
        Self {
            host: host.into(),
            fleet,
            scripts,
            paths,
            config,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The host's RAM ceiling, lowered to the configured cap if there is one.
    pub fn capacity(&self) -> f64 {
        let max = self.fleet.max_ram(&self.host);
        match self.config.ram_cap {
            Some(cap) => cap.min(max),
            None => max,
        }
    }

    /// RAM still usable on the host, never negative.
    pub fn free_ram(&self) -> f64 {
        let free = self.capacity() - self.fleet.used_ram(&self.host);
        (free.max(0.0) - self.config.reserved_ram).max(0.0)
    }

    pub fn available_threads(&self, kind: ScriptKind) -> u32 {
        let per_thread = self.scripts.script_ram(kind) + self.config.epsilon;
        if per_thread <= 0.0 {
            return 0;
        }
        (self.free_ram() / per_thread).floor() as u32
    }

    /// Threads every script in `kinds` can run at once, capped by `limit`.
    pub fn min_across_scripts(&self, kinds: &[ScriptKind], limit: Option<u32>) -> u32 {
        kinds
            .iter()
            .map(|&kind| self.available_threads(kind))
            .chain(limit)
            .min()
            .unwrap_or(0)
    }

    pub fn is_running(&self, kind: ScriptKind, args: &[String]) -> bool {
        self.fleet
            .is_running(self.paths.path(kind), &self.host, args)
    }

    /// Poll until none of `kinds` is running with `args`.
    pub async fn wait_for(
        &self,
        kinds: &[ScriptKind],
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let poll = self.config.poll_interval();
        let wait = async {
            for &kind in kinds {
                while self.is_running(kind, args) {
                    tokio::time::sleep(poll).await;
                }
            }
        };
        self.bounded(wait, timeout, || format!("jobs on {} to exit", self.host))
            .await
    }

    /// Start `kinds` with at most `threads` threads each. Returns the thread
    /// count actually used, which is zero when the host has no room.
    ///
    /// A refused launch is retried until it succeeds or the job shows up as
    /// running, covering races between the capacity check and the launch.
    pub async fn start(
        &self,
        kinds: &[ScriptKind],
        threads: u32,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<u32> {
        let threads = self.min_across_scripts(kinds, Some(threads));
        if threads < 1 {
            tracing::debug!(host = %self.host, "No room to start job");
            return Ok(0);
        }

        let poll = self.config.poll_interval();
        let mut launched = Vec::with_capacity(kinds.len());
        let launch = async {
            for &kind in kinds {
                let script = self.paths.path(kind);
                loop {
                    if let Some(pid) = self.fleet.exec(script, &self.host, threads, args) {
                        tracing::debug!(host = %self.host, script, threads, pid, "Job started");
                        break;
                    }
                    if self.fleet.is_running(script, &self.host, args) {
                        break;
                    }
                    tracing::debug!(host = %self.host, script, threads, "Launch refused, retrying");
                    tokio::time::sleep(poll).await;
                }
                launched.push(kind);
            }
        };
        let result = self
            .bounded(launch, timeout, || format!("launch on {}", self.host))
            .await;

        if let Err(e) = result {
            // Stop whatever started before the timeout.
            for &kind in &launched {
                self.fleet.kill(self.paths.path(kind), &self.host, args);
            }
            tracing::warn!(host = %self.host, killed = launched.len(), error = %e, "Launch timed out");
            return Err(e);
        }
        Ok(threads)
    }

    /// Start and wait for completion.
    pub async fn finish(
        &self,
        kinds: &[ScriptKind],
        threads: u32,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<u32> {
        let started = self.start(kinds, threads, args, timeout).await?;
        if started > 0 {
            self.wait_for(kinds, args, timeout).await?;
        }
        Ok(started)
    }

    pub async fn kill(
        &self,
        kinds: &[ScriptKind],
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<()> {
        for &kind in kinds {
            if !self.fleet.kill(self.paths.path(kind), &self.host, args) {
                tracing::debug!(host = %self.host, kind = %kind, "Nothing to kill");
            }
        }
        self.wait_for(kinds, args, timeout).await
    }

    async fn bounded<F>(
        &self,
        fut: F,
        timeout: Option<Duration>,
        what: impl FnOnce() -> String,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| DispatchError::timeout(what(), limit)),
            None => {
                fut.await;
                Ok(())
            }
        }
    }
}
