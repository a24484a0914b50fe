#[cfg(target_os = "espidf")]
mod client;

#[cfg(target_os = "espidf")]
pub use client::{MqttClient, MqttPublisher};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Broker link state shared between the MQTT client and the CLI.
#[derive(Clone, Default)]
pub struct MqttStatus {
    pub broker_url: String,
    pub client_id: String,
    pub connected: Arc<AtomicBool>,
    pub shutdown: Arc<AtomicBool>, // Signal to stop connection handler thread
    pub publish_count: Arc<AtomicU32>,
}

impl MqttStatus {
    pub fn new(broker_url: &str, client_id: &str) -> Self {
        Self {
            broker_url: broker_url.to_string(),
            client_id: client_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u32 {
        self.publish_count.load(Ordering::Relaxed)
    }
}
