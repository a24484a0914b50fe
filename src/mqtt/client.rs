use super::MqttStatus;
use crate::config::{MqttConfig, SensorConfig};
use crate::payload;
use crate::publish::{PublishError, Publisher, Reading};
use anyhow::Result;
use embedded_svc::mqtt::client::QoS;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};
use log::{info, warn};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

pub struct MqttClient {
    client: Mutex<EspMqttClient<'static>>,
    status: MqttStatus,
}

impl MqttClient {
    pub fn new(config: &MqttConfig) -> Result<Self> {
        info!("Initializing MQTT client...");
        info!("  Broker: {}", config.broker_url);
        info!("  Client ID: {}", config.client_id);

        let status = MqttStatus::new(&config.broker_url, &config.client_id);

        let mqtt_config = MqttClientConfiguration {
            client_id: Some(config.client_id.as_str()),
            username: config.username.as_deref(),
            password: config.password.as_deref(),
            keep_alive_interval: Some(std::time::Duration::from_secs(30)),
            reconnect_timeout: Some(std::time::Duration::from_secs(5)),
            ..Default::default()
        };

        let (client, mut connection) = EspMqttClient::new(&config.broker_url, &mqtt_config)?;

        info!("MQTT client created, spawning connection handler");

        let status_clone = status.clone();

        // Broker reconnects are handled by ESP-IDF; this thread only tracks
        // link state so publishes can fail fast while it is down
        std::thread::Builder::new()
            .stack_size(8192)
            .name("mqtt_conn".to_string())
            .spawn(move || {
                info!("MQTT connection handler started");
                let mut last_error_log_time: Option<std::time::Instant> = None;

                loop {
                    if status_clone.shutdown.load(Ordering::Relaxed) {
                        info!("🔌 MQTT connection handler received shutdown signal, exiting");
                        break;
                    }

                    match connection.next() {
                        Ok(event) => match event.payload() {
                            EventPayload::Connected(session_present) => {
                                info!(
                                    "✅ MQTT connected to broker (session_present: {})",
                                    session_present
                                );
                                status_clone.connected.store(true, Ordering::Relaxed);
                            }
                            EventPayload::Disconnected => {
                                warn!("🔌 MQTT disconnected from broker");
                                status_clone.connected.store(false, Ordering::Relaxed);
                            }
                            EventPayload::Published(id) => {
                                log::debug!("✅ MQTT published (message id: {})", id);
                            }
                            EventPayload::Error(e) => {
                                // Rate limit error logging to reduce spam
                                let quiet = last_error_log_time
                                    .map_or(true, |t| t.elapsed().as_secs() >= 10);
                                if quiet {
                                    warn!("❌ MQTT error: {:?}", e);
                                    last_error_log_time = Some(std::time::Instant::now());
                                }
                            }
                            _ => {}
                        },
                        Err(e) => {
                            // Connection object closed: the client was dropped
                            status_clone.connected.store(false, Ordering::Relaxed);
                            info!("🔌 MQTT connection handler exiting: {:?}", e);
                            break;
                        }
                    }
                }
            })?;

        // SAFETY: the client only borrows the configuration during
        // construction and lives for the rest of the program
        let client_static: EspMqttClient<'static> = unsafe { std::mem::transmute(client) };

        Ok(Self {
            client: Mutex::new(client_static),
            status,
        })
    }

    pub fn get_status(&self) -> MqttStatus {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Queue a message without waiting for the broker
    pub fn enqueue(&self, topic: &str, data: &[u8], qos: QoS, retain: bool) -> Result<()> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enqueue(topic, qos, retain, data)?;

        self.status.publish_count.fetch_add(1, Ordering::Relaxed);

        info!("📤 MQTT enqueued publish to '{}': {} bytes", topic, data.len());
        Ok(())
    }

    pub fn shutdown(&self) {
        info!("🔌 MQTT: Signaling connection handler to shutdown...");
        self.status.shutdown.store(true, Ordering::Relaxed);
        self.status.connected.store(false, Ordering::Relaxed);
    }
}

/// Publishes readings as form-encoded payloads on one topic.
///
/// Publishing only enqueues into the ESP-IDF outbox and is refused outright
/// while the broker link is down, so a dead broker can never stall a
/// sensor channel.
pub struct MqttPublisher {
    client: Arc<MqttClient>,
    topic: String,
    device_guid: String,
    prefixes: Vec<(String, String)>,
}

impl MqttPublisher {
    pub fn new(client: Arc<MqttClient>, config: &MqttConfig, sensors: &[SensorConfig]) -> Self {
        Self {
            client,
            topic: config.topic.to_string(),
            device_guid: config.device_guid.to_string(),
            prefixes: sensors
                .iter()
                .map(|s| (s.sensor_id.to_string(), s.prefix.to_string()))
                .collect(),
        }
    }

    fn prefix(&self, sensor_id: &str) -> &str {
        self.prefixes
            .iter()
            .find(|(id, _)| id == sensor_id)
            .map_or("", |(_, prefix)| prefix.as_str())
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, sensor_id: &str, reading: &Reading) -> Result<(), PublishError> {
        if !self.client.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let body = payload::encode(&self.device_guid, self.prefix(sensor_id), reading);
        self.client
            .enqueue(&self.topic, body.as_bytes(), QoS::AtLeastOnce, false)
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }
}
