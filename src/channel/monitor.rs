use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Starting,
    /// Running, no pulse seen yet
    Idle,
    Counting,
    /// Running, but no pulse for longer than the stale limit
    Stale,
    Stopped,
    /// Sensor lost; the channel is no longer counting
    Failed(String),
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChannelState::Starting => write!(f, "starting"),
            ChannelState::Idle => write!(f, "idle (no pulses yet)"),
            ChannelState::Counting => write!(f, "counting"),
            ChannelState::Stale => write!(f, "stale (no recent pulses)"),
            ChannelState::Stopped => write!(f, "stopped"),
            ChannelState::Failed(reason) => write!(f, "FAILED: {}", reason),
        }
    }
}

/// Details of a publish that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFailure {
    pub sensor_id: String,
    pub value: u64,
    pub at_ms: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub sensor_id: String,
    pub gpio: i32,
    pub state: ChannelState,
    pub count: u64,
    pub liters: u64,
    pub flow_mlps: u32,
    pub bounces: u32,
    pub publishes: u32,
    pub publish_failures: u32,
    pub consecutive_publish_failures: u32,
    pub last_pulse_ms: Option<u64>,
    pub last_failure: Option<PublishFailure>,
}

/// Per-channel status shared between the channel thread and the CLI.
#[derive(Debug)]
pub struct ChannelMonitor {
    inner: Mutex<ChannelSnapshot>,
}

impl ChannelMonitor {
    pub fn new(sensor_id: &str, gpio: i32) -> Self {
        Self {
            inner: Mutex::new(ChannelSnapshot {
                sensor_id: sensor_id.to_string(),
                gpio,
                state: ChannelState::Starting,
                count: 0,
                liters: 0,
                flow_mlps: 0,
                bounces: 0,
                publishes: 0,
                publish_failures: 0,
                consecutive_publish_failures: 0,
                last_pulse_ms: None,
                last_failure: None,
            }),
        }
    }

    // A panicking channel thread must not take the status display with it
    fn lock(&self) -> MutexGuard<'_, ChannelSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.lock().clone()
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state.clone()
    }

    pub fn set_state(&self, state: ChannelState) {
        self.lock().state = state;
    }

    pub fn record_pulse(&self, count: u64, liters: u64, at_ms: u64) {
        let mut status = self.lock();
        status.count = count;
        status.liters = liters;
        status.last_pulse_ms = Some(at_ms);
        status.state = ChannelState::Counting;
    }

    pub fn record_flow(&self, flow_mlps: u32) {
        self.lock().flow_mlps = flow_mlps;
    }

    pub fn record_bounce(&self) {
        let mut status = self.lock();
        status.bounces = status.bounces.saturating_add(1);
    }

    pub fn record_publish(&self) {
        let mut status = self.lock();
        status.publishes = status.publishes.saturating_add(1);
        status.consecutive_publish_failures = 0;
    }

    pub fn record_publish_failure(&self, failure: PublishFailure) {
        let mut status = self.lock();
        status.publish_failures = status.publish_failures.saturating_add(1);
        status.consecutive_publish_failures = status.consecutive_publish_failures.saturating_add(1);
        status.last_failure = Some(failure);
    }
}
