use crate::config::WifiConfig;
use anyhow::Result;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::info;
use std::net::Ipv4Addr;

pub struct WifiManager {
    wifi: Box<BlockingWifi<EspWifi<'static>>>,
}

impl WifiManager {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: &WifiConfig,
    ) -> Result<Self> {
        info!("🌐 WiFi: Creating EspWifi instance...");
        let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;

        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        info!("🌐 WiFi: Configuring for SSID '{}'...", config.ssid);
        esp_wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: config.ssid.clone(),
            auth_method,
            password: config.password.clone(),
            ..Default::default()
        }))?;

        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        info!("🌐 WiFi: Starting...");
        wifi.start()?;

        info!("🌐 WiFi: Connecting to '{}'...", config.ssid);
        wifi.connect()?;

        info!("🌐 WiFi: Waiting for network interface...");
        wifi.wait_netif_up()?;

        let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
        info!("✅ WiFi: Connected, IP address: {}", ip_info.ip);

        Ok(Self {
            wifi: Box::new(wifi),
        })
    }

    pub fn get_ip(&self) -> Result<Ipv4Addr> {
        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        Ok(ip_info.ip)
    }

    pub fn disconnect(&mut self) -> Result<()> {
        if self.wifi.is_connected().unwrap_or(false) {
            info!("🔌 WiFi: Disconnecting...");
            self.wifi.disconnect()?;
            info!("✅ WiFi: Disconnected");
        }
        Ok(())
    }
}
