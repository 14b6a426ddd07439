//! Script catalogue: which file implements each workload and how much RAM
//! one thread of it needs.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::scheduler::ticket::ScriptKind;

/// Per-thread RAM footprint of each workload script.
pub trait ScriptRam: Send + Sync {
    fn script_ram(&self, kind: ScriptKind) -> f64;
}

/// Mutable in-memory RAM table.
#[derive(Debug)]
pub struct ScriptTable {
    costs: RwLock<HashMap<ScriptKind, f64>>,
}

impl Default for ScriptTable {
    fn default() -> Self {
        Self::new(1.70, 1.75, 1.75, 4.0)
    }
}

impl ScriptTable {
    pub fn new(hack: f64, grow: f64, weaken: f64, share: f64) -> Self {
        let costs = HashMap::from([
            (ScriptKind::Hack, hack),
            (ScriptKind::Grow, grow),
            (ScriptKind::Weaken, weaken),
            (ScriptKind::Share, share),
        ]);
        Self {
            costs: RwLock::new(costs),
        }
    }

    /// Tickets already issued keep the cost they were created with.
    pub fn set(&self, kind: ScriptKind, ram: f64) {
        self.costs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, ram);
    }
}

impl ScriptRam for ScriptTable {
    fn script_ram(&self, kind: ScriptKind) -> f64 {
        self.costs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .copied()
            .unwrap_or(0.0)
    }
}

/// File names of the four workload scripts on a worker host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSet {
    pub hack: String,
    pub grow: String,
    pub weaken: String,
    pub share: String,
}

impl Default for ScriptSet {
    fn default() -> Self {
        Self {
            hack: "hack.js".to_string(),
            grow: "grow.js".to_string(),
            weaken: "weaken.js".to_string(),
            share: "share.js".to_string(),
        }
    }
}

impl ScriptSet {
    pub fn path(&self, kind: ScriptKind) -> &str {
        match kind {
            ScriptKind::Hack => &self.hack,
            ScriptKind::Grow => &self.grow,
            ScriptKind::Weaken => &self.weaken,
            ScriptKind::Share => &self.share,
        }
    }

    pub fn paths(&self) -> [&str; 4] {
        [&self.hack, &self.grow, &self.weaken, &self.share]
    }
}
