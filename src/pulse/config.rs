use super::waiter::PinLevel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Idle wait for the next primary edge (ms)
    pub long_timeout_ms: u32,

    /// Noise-rejection window after an edge (ms)
    pub short_timeout_ms: u32,
}

impl TimeoutConfig {
    pub fn new(long_timeout_ms: u32, short_timeout_ms: u32) -> Self {
        Self {
            long_timeout_ms,
            short_timeout_ms,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.short_timeout_ms > 0 && self.long_timeout_ms > self.short_timeout_ms
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            long_timeout_ms: 5_000,
            short_timeout_ms: 50,
        }
    }
}

/// Settled level a meter pulse returns to. The pulse is counted on the
/// confirmed transition back to this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Baseline {
    /// Count on confirmed HIGH -> LOW (LJ12A3 NPN-NO proximity sensor)
    #[default]
    Low,
    /// Count on confirmed LOW -> HIGH
    High,
}

impl Baseline {
    pub fn level(self) -> PinLevel {
        match self {
            Baseline::Low => PinLevel::Low,
            Baseline::High => PinLevel::High,
        }
    }
}
