//! WiFi association utilities for ESP32.
//!
//! Blocking waits (association, DHCP) happen only here, in the setup path,
//! and are bounded by the retry count. The steady-state event loop never
//! blocks on the network stack.

use anyhow::{bail, Result};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::peripheral,
    wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
        EspWifi,
    },
};
use log::{info, warn};
use serde::Serialize;

/// Interface addresses reported by [`net_info`].
#[derive(Debug, Clone, Serialize)]
pub struct NetInfo {
    /// Station interface IP, if up.
    pub sta_ip: Option<String>,
    /// Access point interface IP, if up.
    pub ap_ip: Option<String>,
}

/// Connect to a WiFi network as a station.
///
/// Scans for the target network first so the association can pin the
/// channel, then retries the connect/DHCP sequence up to `max_retries`
/// times.
///
/// Returns the `EspWifi` instance (which must be kept alive for the
/// connection to remain active) and the acquired IP address.
pub fn connect_station(
    ssid: &str,
    password: &str,
    max_retries: u32,
    modem: impl peripheral::Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
    sysloop: EspSystemEventLoop,
) -> Result<(Box<EspWifi<'static>>, String)> {
    if ssid.is_empty() {
        bail!("WiFi SSID cannot be empty");
    }

    let auth_method = if password.is_empty() {
        info!("WiFi password is empty, using open network");
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sysloop)?;

    // Initial configuration for scanning
    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
    wifi.start()?;

    info!("Scanning for WiFi networks...");
    let ap_infos = wifi.scan()?;
    let channel = ap_infos.into_iter().find(|ap| ap.ssid == ssid).map(|ap| {
        info!("Found '{}' on channel {}", ssid, ap.channel);
        ap.channel
    });
    if channel.is_none() {
        info!("Network '{}' not found in scan, will try anyway", ssid);
    }

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow::anyhow!("SSID too long (max 32 chars)"))?,
        password: password
            .try_into()
            .map_err(|_| anyhow::anyhow!("Password too long (max 64 chars)"))?,
        channel,
        auth_method,
        ..Default::default()
    }))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        info!("Connecting to '{}' (attempt {}/{})...", ssid, attempt, max_retries);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => break,
            Err(e) if attempt < max_retries => {
                warn!("connect attempt failed: {}", e);
            }
            Err(e) => bail!("failed to connect to '{}': {}", ssid, e),
        }
    }

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!("WiFi connected!");
    info!("  IP address: {}", ip_info.ip);
    info!("  Gateway:    {}", ip_info.subnet.gateway);

    Ok((Box::new(esp_wifi), ip_info.ip.to_string()))
}

/// Start a software access point.
///
/// An empty password opens the network; otherwise WPA2 is required.
pub fn start_access_point(
    ssid: &str,
    password: &str,
    modem: impl peripheral::Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
    sysloop: EspSystemEventLoop,
) -> Result<(Box<EspWifi<'static>>, String)> {
    if ssid.is_empty() {
        bail!("WiFi SSID cannot be empty");
    }

    let auth_method = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sysloop)?;

    wifi.set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow::anyhow!("SSID too long (max 32 chars)"))?,
        password: password
            .try_into()
            .map_err(|_| anyhow::anyhow!("Password too long (max 64 chars)"))?,
        auth_method,
        max_connections: 4,
        ..Default::default()
    }))?;
    wifi.start()?;

    let ip_info = wifi.wifi().ap_netif().get_ip_info()?;
    info!("Access point '{}' up at {}", ssid, ip_info.ip);

    Ok((Box::new(esp_wifi), ip_info.ip.to_string()))
}

/// Read the current interface addresses.
pub fn net_info(wifi: &EspWifi<'_>) -> NetInfo {
    NetInfo {
        sta_ip: wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip.to_string()),
        ap_ip: wifi
            .ap_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip.to_string()),
    }
}
