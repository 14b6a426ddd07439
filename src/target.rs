//! Target-advisor capability. Targets are owned and mutated elsewhere; the
//! scheduler only reads them and asks for thread plans.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Threads of each attack script a phase calls for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPlan {
    pub hack: u32,
    pub grow: u32,
    pub weaken: u32,
}

impl ThreadPlan {
    pub fn new(hack: u32, grow: u32, weaken: u32) -> Self {
        Self { hack, grow, weaken }
    }

    pub fn total(&self) -> u32 {
        self.hack + self.grow + self.weaken
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoneyTier {
    Lowest,
    Low,
    Mid,
    High,
}

impl fmt::Display for MoneyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneyTier::Lowest => write!(f, "lowest"),
            MoneyTier::Low => write!(f, "low"),
            MoneyTier::Mid => write!(f, "mid"),
            MoneyTier::High => write!(f, "high"),
        }
    }
}

pub trait Target: Send + Sync {
    /// Stable identifier; tickets refer to their target by this name.
    fn name(&self) -> &str;
    fn money_available(&self) -> f64;
    fn money_max(&self) -> f64;
    fn security_current(&self) -> f64;
    fn security_min(&self) -> f64;
    fn money_tier(&self) -> MoneyTier;

    /// Threads needed to bring the target back to full money and minimum
    /// security, given the fraction of money currently missing.
    fn init_threads(&self, taking: f64) -> ThreadPlan;

    /// Threads for one attack round taking `taking` of the target's money.
    fn attack_threads(&self, taking: f64) -> ThreadPlan;
}
