use std::fmt;

/// One report for a sensor. `count` is the absolute cumulative pulse total,
/// so a repeated publish after a crash or restart is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub count: u64,
    /// Liters since the counter started (count x liters per pulse)
    pub liters: u64,
    /// Meter dial reading, when the dial offset is configured
    pub absolute_liters: Option<u64>,
    pub flow_mlps: u32,
    pub uptime_ms: u64,
}

impl Reading {
    /// Whether `other` carries different values, ignoring the timestamp
    pub fn differs_from(&self, other: &Reading) -> bool {
        self.count != other.count
            || self.absolute_liters != other.absolute_liters
            || self.flow_mlps != other.flow_mlps
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Broker link is down; the message was not queued
    NotConnected,
    /// The client refused or failed to queue the message
    Rejected(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PublishError::NotConnected => write!(f, "not connected to broker"),
            PublishError::Rejected(reason) => write!(f, "publish rejected: {}", reason),
        }
    }
}

impl std::error::Error for PublishError {}

/// Outbound reporting capability shared by every sensor channel.
///
/// Implementations must return promptly: a publish that cannot complete
/// fails with an error instead of blocking the calling channel.
pub trait Publisher: Send + Sync {
    fn publish(&self, sensor_id: &str, reading: &Reading) -> Result<(), PublishError>;
}

/// Writes readings to the log. Used when no broker is configured.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, sensor_id: &str, reading: &Reading) -> Result<(), PublishError> {
        log::info!(
            "📤 {}: {} pulses, {} L, {} mL/s",
            sensor_id,
            reading.count,
            reading.liters,
            reading.flow_mlps
        );
        Ok(())
    }
}
