//! Ticket-based work distribution.
//!
//! - [`Ticket`]: one dispatch of N threads of a script against a target
//! - [`TicketLog`]: bounded window of a target's recent tickets
//! - [`TargetQueue`]: per-target state machine that turns thread plans into tickets
//! - [`Scheduler`]: owns the queues and launchers and moves tickets onto workers
//!
//! The scheduler is driven from a single loop (see [`crate::driver`]), so
//! queue and ticket state never sees two mutators at once.

pub mod dispatch;
pub mod log;
pub mod queue;
pub mod ticket;

pub use dispatch::{JobSlice, Scheduler};
pub use log::TicketLog;
pub use queue::{QueueStatus, TargetQueue};
pub use ticket::{Priority, ScriptKind, Ticket, TicketId, TicketIds, TicketStatus};
