use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// The four repeating workloads a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Hack,
    Grow,
    Weaken,
    Share,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 4] = [
        ScriptKind::Hack,
        ScriptKind::Grow,
        ScriptKind::Weaken,
        ScriptKind::Share,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::Hack => "hack",
            ScriptKind::Grow => "grow",
            ScriptKind::Weaken => "weaken",
            ScriptKind::Share => "share",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        ScriptKind::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl FromStr for ScriptKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScriptKind::parse(s).ok_or_else(|| DispatchError::UnknownScript(s.to_string()))
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch ordinal; lower runs first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Hack = 0,
    Grow = 1,
    Weaken = 2,
    Share = 3,
    Other = 4,
}

impl Priority {
    /// Look up the priority for a script name. Names outside the known
    /// workloads get [`Priority::Other`].
    pub fn for_script_name(name: &str) -> Self {
        ScriptKind::parse(name)
            .map(Priority::from)
            .unwrap_or(Priority::Other)
    }
}

impl From<ScriptKind> for Priority {
    fn from(kind: ScriptKind) -> Self {
        match kind {
            ScriptKind::Hack => Priority::Hack,
            ScriptKind::Grow => Priority::Grow,
            ScriptKind::Weaken => Priority::Weaken,
            ScriptKind::Share => Priority::Share,
        }
    }
}

/// Ticket lifecycle. Variants are declared in lifecycle order so the derived
/// `Ord` can reject backward moves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Created,
    Initiating,
    Running,
    Done,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Created => write!(f, "created"),
            TicketStatus::Initiating => write!(f, "initiating"),
            TicketStatus::Running => write!(f, "running"),
            TicketStatus::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic ticket id source. Shared by every queue of one scheduler;
/// ids are for identification in logs only, never for ordering decisions
/// across schedulers.
#[derive(Debug)]
pub struct TicketIds {
    next: AtomicU64,
}

impl Default for TicketIds {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> TicketId {
        TicketId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy)]
struct Progress {
    status: TicketStatus,
    placed: u32,
}

/// One dispatch of `threads` threads of a script against a target.
///
/// Everything except the lifecycle status and placement progress is fixed
/// at construction, including the RAM cost.
#[derive(Debug)]
pub struct Ticket {
    id: TicketId,
    target: String,
    threads: u32,
    kind: ScriptKind,
    priority: Priority,
    ram_cost: f64,
    created_at: DateTime<Utc>,
    progress: Mutex<Progress>,
}

impl Ticket {
    pub fn new(
        id: TicketId,
        target: impl Into<String>,
        threads: u32,
        kind: ScriptKind,
        priority: Option<Priority>,
        ram_cost: f64,
    ) -> Self {
        Self {
            id,
            target: target.into(),
            threads,
            kind,
            priority: priority.unwrap_or_else(|| Priority::from(kind)),
            ram_cost,
            created_at: Utc::now(),
            progress: Mutex::new(Progress {
                status: TicketStatus::Created,
                placed: 0,
            }),
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn ram_cost(&self) -> f64 {
        self.ram_cost
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TicketStatus {
        self.progress().status
    }

    pub fn is_new(&self) -> bool {
        self.status() == TicketStatus::Created
    }

    pub fn is_initiating(&self) -> bool {
        self.status() == TicketStatus::Initiating
    }

    pub fn is_running(&self) -> bool {
        self.status() == TicketStatus::Running
    }

    pub fn is_done(&self) -> bool {
        self.status() == TicketStatus::Done
    }

    /// Move the ticket to `status`. Backward moves are refused and return
    /// `false`; setting the current status again is a no-op.
    pub fn set_status(&self, status: TicketStatus) -> bool {
        let mut progress = self.progress();
        if status < progress.status {
            tracing::warn!(
                ticket_id = %self.id,
                from = %progress.status,
                to = %status,
                "Refusing backward ticket transition"
            );
            return false;
        }
        progress.status = status;
        true
    }

    pub fn placed_threads(&self) -> u32 {
        self.progress().placed
    }

    pub fn unplaced_threads(&self) -> u32 {
        self.threads.saturating_sub(self.progress().placed)
    }

    /// Record that `threads` more threads were started on some worker.
    /// The first placement moves the ticket to `Initiating`, the one that
    /// covers the full thread count moves it to `Running`.
    pub fn record_placement(&self, threads: u32) -> TicketStatus {
        let mut progress = self.progress();
        progress.placed = progress.placed.saturating_add(threads).min(self.threads);
        let next = if progress.placed >= self.threads {
            TicketStatus::Running
        } else if progress.placed > 0 {
            TicketStatus::Initiating
        } else {
            TicketStatus::Created
        };
        if next > progress.status {
            progress.status = next;
        }
        progress.status
    }
}
