use std::collections::VecDeque;
use std::sync::Arc;

use crate::scheduler::ticket::Ticket;

pub const DEFAULT_LOG_CAPACITY: usize = 10;

/// Fixed-capacity window over the most recent tickets issued for a target.
///
/// Pushing past capacity evicts the oldest entry. `pop` takes from the other
/// end and returns the newest one. This is an occupancy window, not a full
/// history.
#[derive(Debug, Clone)]
pub struct TicketLog {
    entries: VecDeque<Arc<Ticket>>,
    capacity: usize,
}

impl Default for TicketLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl TicketLog {
    /// A capacity of zero yields a log that never holds anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, ticket: Arc<Ticket>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ticket);
    }

    pub fn pop(&mut self) -> Option<Arc<Ticket>> {
        self.entries.pop_back()
    }

    pub fn first(&self) -> Option<&Arc<Ticket>> {
        self.entries.front()
    }

    pub fn last(&self) -> Option<&Arc<Ticket>> {
        self.entries.back()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Ticket>> {
        self.entries.iter()
    }

    /// True when every entry reports `Done`. Vacuously true when empty.
    pub fn all_done(&self) -> bool {
        self.entries.iter().all(|t| t.is_done())
    }
}
