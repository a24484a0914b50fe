use super::CliCommand;
use crate::channel::{ChannelMonitor, ChannelSnapshot};
use crate::mqtt::MqttStatus;
use crate::payload::FIRMWARE_VERSION;
use crate::pulse::CancelToken;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

pub struct CommandHandler {
    start_time: Instant,
    monitors: Vec<Arc<ChannelMonitor>>,
    cancel: Option<CancelToken>,
    mqtt: Option<MqttStatus>,
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            monitors: Vec::new(),
            cancel: None,
            mqtt: None,
        }
    }

    pub fn with_channels(
        mut self,
        monitors: Vec<Arc<ChannelMonitor>>,
        cancel: CancelToken,
    ) -> Self {
        self.monitors = monitors;
        self.cancel = Some(cancel);
        self
    }

    pub fn with_mqtt(mut self, status: MqttStatus) -> Self {
        self.mqtt = Some(status);
        self
    }

    /// Run a command and return the text to print.
    ///
    /// `Help` and `Clear` only touch the terminal and `Reset` needs the
    /// channel threads joined before the restart, so the caller finishes
    /// those itself.
    pub fn execute_command(&mut self, command: CliCommand) -> String {
        let mut response = String::new();

        match command {
            CliCommand::Empty => {}
            CliCommand::Help => {
                response.push_str("Help displayed");
            }
            CliCommand::Version => {
                log::info!("CLI: Version requested");
                let _ = write!(
                    response,
                    "ESP32 Pulse Meter v{}\r\nBuilt with ESP-IDF",
                    FIRMWARE_VERSION
                );
            }
            CliCommand::Status => {
                log::info!("CLI: Status requested");
                response = self.status();
            }
            CliCommand::Uptime => {
                log::info!("CLI: Uptime requested");
                response.push_str("Uptime: ");
                response.push_str(&format_uptime(self.start_time.elapsed().as_secs()));
            }
            CliCommand::Clear => {
                response.push_str("Screen cleared");
            }
            CliCommand::Stop => {
                log::info!("CLI: Stop requested");
                response = self.stop_channels();
            }
            CliCommand::Reset => {
                log::info!("CLI: Reset requested");
                response = self.stop_channels();
                response.push_str("\r\nResetting system...");
            }
            CliCommand::Unknown(cmd) => {
                log::info!("CLI: Unknown command: {}", cmd);
                response.push_str("Unknown command: ");
                response.push_str(&cmd);
                response.push_str(". Type 'help' for available commands.");
            }
        }

        response
    }

    fn stop_channels(&self) -> String {
        match &self.cancel {
            Some(cancel) if cancel.is_cancelled() => {
                "Sensor channels already stopped".to_string()
            }
            Some(cancel) => {
                cancel.cancel();
                format!("Stopping {} sensor channel(s)", self.monitors.len())
            }
            None => "No sensor channels running".to_string(),
        }
    }

    fn status(&self) -> String {
        let mut response = String::from("System Status:\r\n");
        let _ = write!(response, "  Firmware: ESP32 Pulse Meter v{}\r\n", FIRMWARE_VERSION);

        match &self.mqtt {
            Some(mqtt) => {
                let link = if mqtt.is_connected() {
                    "connected"
                } else {
                    "disconnected"
                };
                let _ = write!(
                    response,
                    "  MQTT: {} ({} as {})\r\n    Enqueued: {} messages\r\n",
                    link,
                    mqtt.broker_url,
                    mqtt.client_id,
                    mqtt.published()
                );
            }
            None => response.push_str("  MQTT: disabled (logging readings only)\r\n"),
        }

        if self.monitors.is_empty() {
            response.push_str("  No sensor channels configured");
        }
        for monitor in &self.monitors {
            write_channel(&mut response, &monitor.snapshot());
        }

        response.truncate(response.trim_end().len());
        response
    }
}

fn write_channel(out: &mut String, snapshot: &ChannelSnapshot) {
    let _ = write!(
        out,
        "  Sensor {} (GPIO{}): {}\r\n",
        snapshot.sensor_id, snapshot.gpio, snapshot.state
    );
    let _ = write!(
        out,
        "    Pulses: {}  Liters: {}  Flow: {} mL/s\r\n",
        snapshot.count, snapshot.liters, snapshot.flow_mlps
    );
    let _ = write!(
        out,
        "    Bounces: {}  Published: {}  Publish failures: {} ({} in a row)\r\n",
        snapshot.bounces,
        snapshot.publishes,
        snapshot.publish_failures,
        snapshot.consecutive_publish_failures
    );
    if let Some(at_ms) = snapshot.last_pulse_ms {
        let _ = write!(out, "    Last pulse: {} ms\r\n", at_ms);
    }
    if let Some(failure) = &snapshot.last_failure {
        let _ = write!(
            out,
            "    Last failed publish: value {} at {} ms ({})\r\n",
            failure.value, failure.at_ms, failure.reason
        );
    }
}

pub fn format_uptime(uptime_secs: u64) -> String {
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;

    let mut text = String::new();
    if hours > 0 {
        let _ = write!(text, "{}h ", hours);
    }
    if minutes > 0 || hours > 0 {
        let _ = write!(text, "{}m ", minutes);
    }
    let _ = write!(text, "{}s", seconds);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelState, PublishFailure};
    use std::sync::atomic::Ordering;

    fn handler_with_two_channels() -> (CommandHandler, Arc<ChannelMonitor>, CancelToken) {
        let water = Arc::new(ChannelMonitor::new("water", 4));
        let gas = Arc::new(ChannelMonitor::new("gas", 5));
        let cancel = CancelToken::new();
        let handler =
            CommandHandler::new().with_channels(vec![water.clone(), gas], cancel.clone());
        (handler, water, cancel)
    }

    #[test]
    fn uptime_is_formatted_like_a_clock() {
        assert_eq!(format_uptime(7), "7s");
        assert_eq!(format_uptime(61), "1m 1s");
        assert_eq!(format_uptime(3600), "1h 0m 0s");
    }

    #[test]
    fn status_lists_every_channel() {
        let (mut handler, water, _) = handler_with_two_channels();
        water.record_pulse(3, 3, 1500);
        water.record_publish_failure(PublishFailure {
            sensor_id: "water".to_string(),
            value: 3,
            at_ms: 1500,
            reason: "not connected to broker".to_string(),
        });

        let status = handler.execute_command(CliCommand::Status);
        assert!(status.contains("Sensor water (GPIO4): counting"));
        assert!(status.contains("Pulses: 3"));
        assert!(status.contains("Last failed publish: value 3 at 1500 ms"));
        assert!(status.contains("Sensor gas (GPIO5): starting"));
        assert!(status.contains("MQTT: disabled"));
    }

    #[test]
    fn status_shows_broker_link() {
        let mqtt = MqttStatus::new("mqtt://broker.local:1883", "pulse-meter");
        let mut handler = CommandHandler::new().with_mqtt(mqtt.clone());

        let status = handler.execute_command(CliCommand::Status);
        assert!(status.contains("MQTT: disconnected (mqtt://broker.local:1883 as pulse-meter)"));
        assert!(status.contains("Enqueued: 0 messages"));

        mqtt.connected.store(true, Ordering::Relaxed);
        mqtt.publish_count.fetch_add(3, Ordering::Relaxed);
        let status = handler.execute_command(CliCommand::Status);
        assert!(status.contains("MQTT: connected"));
        assert!(status.contains("Enqueued: 3 messages"));
    }

    #[test]
    fn stop_cancels_the_channels_once() {
        let (mut handler, water, cancel) = handler_with_two_channels();
        water.set_state(ChannelState::Counting);

        assert_eq!(
            handler.execute_command(CliCommand::Stop),
            "Stopping 2 sensor channel(s)"
        );
        assert!(cancel.is_cancelled());
        assert_eq!(
            handler.execute_command(CliCommand::Stop),
            "Sensor channels already stopped"
        );
    }

    #[test]
    fn reset_stops_channels_first() {
        let (mut handler, _, cancel) = handler_with_two_channels();
        let response = handler.execute_command(CliCommand::Reset);
        assert!(cancel.is_cancelled());
        assert!(response.ends_with("Resetting system..."));
    }

    #[test]
    fn unknown_command_points_at_help() {
        let mut handler = CommandHandler::new();
        let response = handler.execute_command(CliCommand::Unknown("flush".to_string()));
        assert_eq!(
            response,
            "Unknown command: flush. Type 'help' for available commands."
        );
        assert_eq!(handler.execute_command(CliCommand::Empty), "");
    }
}
