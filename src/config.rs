use crate::pulse::{Baseline, TimeoutConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_SENSORS: usize = 4;

/// Console UART (1, 3) and SPI flash (6-11) pins
const RESERVED_GPIOS: &[i32] = &[1, 3, 6, 7, 8, 9, 10, 11];
/// GPIO34-39 are input-only without pull resistors
const MAX_IO_GPIO: i32 = 33;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Empty to log readings instead of publishing them
    pub broker_url: heapless::String<128>,
    pub client_id: heapless::String<32>,
    pub username: Option<heapless::String<32>>,
    pub password: Option<heapless::String<64>>,
    pub topic: heapless::String<64>,
    pub device_guid: heapless::String<48>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Identifier used in logs and as the publish key ("water", "gas")
    pub sensor_id: heapless::String<16>,
    /// Payload field prefix ("w_", "g_")
    pub prefix: heapless::String<8>,
    /// ESP32 GPIO number, not a board header position
    pub gpio: i32,
    pub pull_up: bool,
    pub baseline: Baseline,
    pub liters_per_pulse: u32,
    pub long_timeout_ms: u32,
    pub short_timeout_ms: u32,
    /// Pulse total to resume from
    pub initial_count: u64,
    /// Meter dial reading (liters) when the count was zero
    pub dial_offset_liters: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub sensors: heapless::Vec<SensorConfig, MAX_SENSORS>,
    /// Republish an unchanged reading at least this often
    pub heartbeat_secs: u32,
    /// Flag a sensor as stale after this long without a pulse
    pub stale_after_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Json(String),
    TooLong(&'static str),
    NoSensors,
    InvalidIdentifier(&'static str),
    DuplicateSensor(String),
    DuplicateGpio(i32),
    UnusableGpio(i32),
    InvalidTimeouts(String),
    ZeroLitersPerPulse(String),
    ZeroHeartbeat,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Json(e) => write!(f, "invalid config JSON: {}", e),
            ConfigError::TooLong(field) => write!(f, "{} too long", field),
            ConfigError::NoSensors => write!(f, "no sensors configured"),
            ConfigError::InvalidIdentifier(field) => {
                write!(f, "{} contains characters not allowed in a payload", field)
            }
            ConfigError::DuplicateSensor(id) => write!(f, "sensor '{}' configured twice", id),
            ConfigError::DuplicateGpio(gpio) => write!(f, "GPIO{} used by two sensors", gpio),
            ConfigError::UnusableGpio(gpio) => {
                write!(f, "GPIO{} is reserved or cannot be used as a pulled input", gpio)
            }
            ConfigError::InvalidTimeouts(id) => write!(
                f,
                "sensor '{}': timeouts must be non-zero with short < long",
                id
            ),
            ConfigError::ZeroLitersPerPulse(id) => {
                write!(f, "sensor '{}': liters_per_pulse must be non-zero", id)
            }
            ConfigError::ZeroHeartbeat => write!(f, "heartbeat_secs must be non-zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn bounded<const N: usize>(
    value: &str,
    field: &'static str,
) -> Result<heapless::String<N>, ConfigError> {
    let mut s = heapless::String::new();
    s.push_str(value).map_err(|_| ConfigError::TooLong(field))?;
    Ok(s)
}

fn is_payload_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_graphic() && c != '&' && c != '=')
}

impl SensorConfig {
    pub fn water(gpio: i32) -> Self {
        Self {
            sensor_id: bounded("water", "sensor_id").unwrap_or_default(),
            prefix: bounded("w_", "prefix").unwrap_or_default(),
            gpio,
            pull_up: true,
            baseline: Baseline::Low,
            liters_per_pulse: 1,
            long_timeout_ms: TimeoutConfig::default().long_timeout_ms,
            short_timeout_ms: TimeoutConfig::default().short_timeout_ms,
            initial_count: 0,
            dial_offset_liters: None,
        }
    }

    pub fn gas(gpio: i32) -> Self {
        Self {
            sensor_id: bounded("gas", "sensor_id").unwrap_or_default(),
            prefix: bounded("g_", "prefix").unwrap_or_default(),
            liters_per_pulse: 10,
            ..Self::water(gpio)
        }
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::new(self.long_timeout_ms, self.short_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_payload_safe(&self.sensor_id) {
            return Err(ConfigError::InvalidIdentifier("sensor_id"));
        }
        if !is_payload_safe(&self.prefix) {
            return Err(ConfigError::InvalidIdentifier("prefix"));
        }
        if !(0..=MAX_IO_GPIO).contains(&self.gpio) || RESERVED_GPIOS.contains(&self.gpio) {
            return Err(ConfigError::UnusableGpio(self.gpio));
        }
        if !self.timeouts().is_valid() {
            return Err(ConfigError::InvalidTimeouts(self.sensor_id.to_string()));
        }
        if self.liters_per_pulse == 0 {
            return Err(ConfigError::ZeroLitersPerPulse(self.sensor_id.to_string()));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults (or `PULSE_METER_CONFIG_JSON`) overlaid with the credentials
    /// baked in at build time.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        let mut config = match option_env!("PULSE_METER_CONFIG_JSON") {
            Some(json) => {
                serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?
            }
            None => AppConfig::default(),
        };

        if let Some(ssid) = option_env!("PULSE_METER_WIFI_SSID") {
            config.wifi.ssid = bounded(ssid, "wifi ssid")?;
        }
        if let Some(password) = option_env!("PULSE_METER_WIFI_PASSWORD") {
            config.wifi.password = bounded(password, "wifi password")?;
        }
        if let Some(broker) = option_env!("PULSE_METER_BROKER") {
            config.mqtt.broker_url = bounded(broker, "broker url")?;
        }
        if let Some(topic) = option_env!("PULSE_METER_TOPIC") {
            config.mqtt.topic = bounded(topic, "mqtt topic")?;
        }
        if let Some(guid) = option_env!("PULSE_METER_GUID") {
            config.mqtt.device_guid = bounded(guid, "device guid")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.is_empty() {
            return Err(ConfigError::NoSensors);
        }
        if !is_payload_safe(&self.mqtt.device_guid) {
            return Err(ConfigError::InvalidIdentifier("device_guid"));
        }
        if self.heartbeat_secs == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }

        for (i, sensor) in self.sensors.iter().enumerate() {
            sensor.validate()?;
            for other in self.sensors.iter().skip(i + 1) {
                if other.sensor_id == sensor.sensor_id {
                    return Err(ConfigError::DuplicateSensor(sensor.sensor_id.to_string()));
                }
                if other.gpio == sensor.gpio {
                    return Err(ConfigError::DuplicateGpio(sensor.gpio));
                }
            }
        }
        Ok(())
    }

    pub fn publishes_to_broker(&self) -> bool {
        !self.mqtt.broker_url.is_empty()
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        let mut ssid = heapless::String::new();
        let mut password = heapless::String::new();
        let _ = ssid.push_str("YOUR_SSID");
        let _ = password.push_str("YOUR_PASSWORD");

        Self { ssid, password }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        let mut broker_url = heapless::String::new();
        let mut client_id = heapless::String::new();
        let mut topic = heapless::String::new();
        let mut device_guid = heapless::String::new();
        let _ = broker_url.push_str("mqtt://test.mosquitto.org:1883");
        let _ = client_id.push_str("esp32-pulse-meter");
        let _ = topic.push_str("myhome/infra/water/xwwwform");
        let _ = device_guid.push_str("EUI48:11:22:33:44:55:66");

        Self {
            broker_url,
            client_id,
            username: None,
            password: None,
            topic,
            device_guid,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::water(4)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut sensors = heapless::Vec::new();
        let _ = sensors.push(SensorConfig::water(4));
        let _ = sensors.push(SensorConfig::gas(5));

        Self {
            wifi: WifiConfig::default(),
            mqtt: MqttConfig::default(),
            sensors,
            heartbeat_secs: 300,
            stale_after_secs: 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors[1].liters_per_pulse, 10);
        assert_eq!(config.sensors[1].prefix.as_str(), "g_");
    }

    #[test]
    fn build_env_without_overrides_gives_defaults() {
        let config = AppConfig::from_build_env().unwrap();
        assert!(!config.sensors.is_empty());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "mqtt": { "broker_url": "", "device_guid": "meter-1" },
                "sensors": [
                    { "sensor_id": "gas", "prefix": "g_", "gpio": 13,
                      "baseline": "high", "liters_per_pulse": 10 }
                ]
            }"#,
        )
        .unwrap();

        assert!(!config.publishes_to_broker());
        assert_eq!(config.heartbeat_secs, 300);
        let gas = &config.sensors[0];
        assert_eq!(gas.baseline, Baseline::High);
        assert_eq!(gas.timeouts(), TimeoutConfig::default());
        assert!(gas.pull_up);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            AppConfig::from_json("{ \"sensors\": 3 }"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn oversized_strings_are_rejected_by_the_parser() {
        let json = format!(r#"{{ "wifi": {{ "ssid": "{}" }} }}"#, "x".repeat(40));
        assert!(matches!(AppConfig::from_json(&json), Err(ConfigError::Json(_))));
    }

    #[test]
    fn an_empty_sensor_list_is_rejected() {
        let config = AppConfig {
            sensors: heapless::Vec::new(),
            ..AppConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoSensors));
    }

    #[test]
    fn sensors_must_not_share_ids_or_pins() {
        let mut config = AppConfig::default();
        config.sensors[1].sensor_id = config.sensors[0].sensor_id.clone();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateSensor("water".to_string()))
        );

        let mut config = AppConfig::default();
        config.sensors[1].gpio = config.sensors[0].gpio;
        assert_eq!(config.validate(), Err(ConfigError::DuplicateGpio(4)));
    }

    #[test]
    fn console_flash_and_input_only_pins_are_rejected() {
        for gpio in [1, 3, 6, 11, 34, 39, -1] {
            let mut config = AppConfig::default();
            config.sensors[0].gpio = gpio;
            assert_eq!(config.validate(), Err(ConfigError::UnusableGpio(gpio)));
        }
    }

    #[test]
    fn short_timeout_must_be_below_long_timeout() {
        let mut config = AppConfig::default();
        config.sensors[0].short_timeout_ms = config.sensors[0].long_timeout_ms;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTimeouts("water".to_string()))
        );
    }

    #[test]
    fn payload_separators_are_rejected_in_identifiers() {
        let mut config = AppConfig::default();
        config.mqtt.device_guid = bounded("a&b", "device guid").unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidIdentifier("device_guid"))
        );

        let mut config = AppConfig::default();
        config.sensors[0].prefix = bounded("w=", "prefix").unwrap();
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdentifier("prefix")));
    }

    #[test]
    fn zero_liters_per_pulse_is_rejected() {
        let mut config = AppConfig::default();
        config.sensors[1].liters_per_pulse = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLitersPerPulse("gas".to_string()))
        );
    }
}
