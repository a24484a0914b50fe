//! ESP32 Pulse Meter Library
//!
//! Counts debounced pulses from reed or hall sensors on water and gas meters
//! and publishes the running totals over MQTT.
//!
//! Everything except the ESP-IDF glue (the MQTT client, `wifi`, the interrupt-backed
//! edge waiter and the UART terminal) builds on the host, where sensors are
//! driven by a simulated clock.

pub mod channel;
pub mod cli;
pub mod config;
pub mod gauge;
pub mod mqtt;
pub mod payload;
pub mod publish;
pub mod pulse;
#[cfg(target_os = "espidf")]
pub mod wifi;

pub use channel::{ChannelMonitor, ChannelSettings, ChannelSnapshot, ChannelState, SensorChannel};
pub use cli::{CliCommand, CliError, CommandHandler, CommandParser, LineEditor};
pub use config::{AppConfig, ConfigError, MqttConfig, SensorConfig, WifiConfig};
pub use gauge::FlowGauge;
#[cfg(target_os = "espidf")]
pub use mqtt::{MqttClient, MqttPublisher};
pub use mqtt::MqttStatus;
pub use publish::{LogPublisher, PublishError, Publisher, Reading};
pub use pulse::{
    Baseline, CancelToken, DebounceEvent, EdgeKind, EdgeWaiter, PinLevel, PulseCounter,
    PulseDebouncer, PulseError, PulseResult, SimulatedEdgeWaiter, TimeoutConfig, WaitOutcome,
};
#[cfg(target_os = "espidf")]
pub use wifi::WifiManager;
