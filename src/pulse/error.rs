use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseError {
    /// The sensor pin could not be opened, configured or read. Fatal for the
    /// channel that owns the pin.
    SensorUnavailable { gpio: i32, reason: String },
}

impl PulseError {
    pub fn unavailable(gpio: i32, reason: impl fmt::Display) -> Self {
        PulseError::SensorUnavailable {
            gpio,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for PulseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PulseError::SensorUnavailable { gpio, reason } => {
                write!(f, "sensor on GPIO{} unavailable: {}", gpio, reason)
            }
        }
    }
}

impl std::error::Error for PulseError {}

pub type PulseResult<T> = Result<T, PulseError>;
