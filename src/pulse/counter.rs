/// Monotonic count of confirmed pulses for one sensor.
///
/// Owned by exactly one debouncer, so no synchronisation is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseCounter {
    value: u64,
}

impl PulseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously persisted total
    pub fn starting_at(value: u64) -> Self {
        Self { value }
    }

    pub fn increment(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    pub fn current(&self) -> u64 {
        self.value
    }
}
