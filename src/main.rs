#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    app::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!(
        "pulse_meter runs on ESP-IDF; build for an espidf target \
         (host builds only run the tests)"
    );
}

#[cfg(target_os = "espidf")]
mod app {
    use esp32_pulse_meter::channel::{self, ChannelExit, ChannelMonitor, ChannelSettings};
    use esp32_pulse_meter::cli::{CliCommand, CommandHandler, CommandParser, Terminal};
    use esp32_pulse_meter::config::AppConfig;
    use esp32_pulse_meter::mqtt::{MqttClient, MqttPublisher};
    use esp32_pulse_meter::publish::{LogPublisher, Publisher};
    use esp32_pulse_meter::pulse::{CancelToken, EspEdgeWaiter, PulseResult};
    use esp32_pulse_meter::wifi::WifiManager;
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::gpio::AnyIOPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys;
    use std::sync::Arc;
    use std::thread::JoinHandle;

    type ChannelHandle = JoinHandle<PulseResult<ChannelExit>>;

    pub fn run() -> anyhow::Result<()> {
        // Initialize ESP-IDF system services
        sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        log::info!(
            "ESP32 Pulse Meter v{}",
            esp32_pulse_meter::payload::FIRMWARE_VERSION
        );
        log::info!("Initializing...");

        let config = AppConfig::from_build_env()?;
        for sensor in &config.sensors {
            log::info!(
                "  Sensor {}: GPIO{} ({} L/pulse, timeouts {}/{} ms)",
                sensor.sensor_id,
                sensor.gpio,
                sensor.liters_per_pulse,
                sensor.long_timeout_ms,
                sensor.short_timeout_ms
            );
        }

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        log::info!("✅ ESP32 initialized with ESP-IDF");

        // Network is optional: without it readings are only logged
        let mut wifi = None;
        let mut mqtt = None;
        if config.publishes_to_broker() {
            match WifiManager::new(peripherals.modem, sysloop, nvs, &config.wifi) {
                Ok(manager) => {
                    wifi = Some(manager);
                    match MqttClient::new(&config.mqtt) {
                        Ok(client) => mqtt = Some(Arc::new(client)),
                        Err(e) => log::error!("❌ MQTT: client setup failed: {:?}", e),
                    }
                }
                Err(e) => {
                    log::error!("❌ WiFi: setup failed, readings will only be logged: {:?}", e)
                }
            }
        } else {
            log::info!("No broker configured, readings will only be logged");
        }

        let publisher: Arc<dyn Publisher> = match &mqtt {
            Some(client) => Arc::new(MqttPublisher::new(
                Arc::clone(client),
                &config.mqtt,
                &config.sensors,
            )),
            None => Arc::new(LogPublisher),
        };

        let cancel = CancelToken::new();
        let mut monitors = Vec::new();
        let mut handles: Vec<ChannelHandle> = Vec::new();

        for sensor in &config.sensors {
            let settings = ChannelSettings::from_config(sensor, &config);
            let monitor = Arc::new(ChannelMonitor::new(&settings.sensor_id, settings.gpio));
            let gpio = sensor.gpio;
            let pull_up = sensor.pull_up;

            let handle = channel::spawn(
                settings,
                move || {
                    // SAFETY: validated config gives every sensor its own GPIO,
                    // none shared with UART0 or flash, and nothing else here
                    // claims those pins from `Peripherals`
                    EspEdgeWaiter::new(unsafe { AnyIOPin::new(gpio) }, pull_up)
                },
                Arc::clone(&publisher),
                Arc::clone(&monitor),
                cancel.clone(),
            )?;

            monitors.push(monitor);
            handles.push(handle);
        }

        log::info!("✅ {} sensor channel(s) spawned", handles.len());

        // Initialize UART0 for CLI (USB-C connection)
        let uart_config = UartConfig::new().baudrate(115200.into());
        let mut uart = UartDriver::new(
            peripherals.uart0,
            peripherals.pins.gpio1, // TX (U0TXD)
            peripherals.pins.gpio3, // RX (U0RXD)
            Option::<esp_idf_hal::gpio::Gpio0>::None,
            Option::<esp_idf_hal::gpio::Gpio0>::None,
            &uart_config,
        )?;
        let (uart_tx, uart_rx) = uart.split();

        let mut terminal = Terminal::new(uart_tx, uart_rx);
        let mut command_handler = CommandHandler::new().with_channels(monitors, cancel.clone());
        if let Some(client) = &mqtt {
            command_handler = command_handler.with_mqtt(client.get_status());
        }

        terminal.write_line("")?;
        terminal.write_line("ESP32 Pulse Meter")?;
        terminal.write_line("Type 'help' for available commands")?;
        if let Some(wifi) = &wifi {
            if let Ok(ip) = wifi.get_ip() {
                terminal.write_line(&format!("IP address: {}", ip))?;
            }
        }
        terminal.print_prompt()?;

        log::info!("Entering CLI loop...");

        loop {
            let ch = match terminal.read_char() {
                Ok(Some(ch)) => ch,
                Ok(None) | Err(_) => {
                    // Nothing to read, small delay to avoid busy loop
                    FreeRtos::delay_ms(10);
                    continue;
                }
            };

            let command_line = match terminal.handle_char(ch) {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(_) => {
                    log::warn!("Terminal input error");
                    let _ = terminal.print_prompt();
                    continue;
                }
            };

            let command = CommandParser::parse_command(&command_line);
            let response = command_handler.execute_command(command.clone());

            match command {
                CliCommand::Help => {
                    let _ = terminal.show_help();
                }
                CliCommand::Clear => {
                    let _ = terminal.clear_screen();
                }
                CliCommand::Stop => {
                    let _ = terminal.write_line(&response);
                    join_channels(&mut handles);
                }
                CliCommand::Reset => {
                    let _ = terminal.write_line(&response);
                    join_channels(&mut handles);
                    if let Some(client) = &mqtt {
                        client.shutdown();
                    }
                    if let Some(wifi) = wifi.as_mut() {
                        let _ = wifi.disconnect();
                    }
                    FreeRtos::delay_ms(100);
                    // SAFETY: plain chip restart; every channel has exited
                    unsafe {
                        sys::esp_restart();
                    }
                }
                _ => {
                    if !response.is_empty() {
                        let _ = terminal.write_line(&response);
                    }
                }
            }

            let _ = terminal.print_prompt();
        }
    }

    /// Wait for cancelled channels to exit; each one releases its pin on the way out
    fn join_channels(handles: &mut Vec<ChannelHandle>) {
        for handle in handles.drain(..) {
            let name = handle.thread().name().unwrap_or("pulse").to_string();
            match handle.join() {
                Ok(Ok(exit)) => log::info!("🛑 {}: exited ({:?})", name, exit),
                Ok(Err(e)) => log::warn!("⚠️ {}: had already failed: {}", name, e),
                Err(_) => log::error!("❌ {}: thread panicked", name),
            }
        }
    }
}
