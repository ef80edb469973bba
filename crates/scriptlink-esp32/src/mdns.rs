//! mDNS registration for the file server.

use anyhow::Result;
use esp_idf_svc::mdns::EspMdns;
use log::info;

/// Announce the device hostname and the HTTP service.
///
/// The returned handle must be kept alive for the announcement to persist;
/// the file server session owns it for its lifetime.
pub fn register(hostname: &str, port: u16) -> Result<EspMdns> {
    let mut mdns = EspMdns::take()?;
    mdns.set_hostname(hostname)?;
    mdns.set_instance_name("scriptlink web server")?;
    mdns.add_service(
        Some("scriptlink"),
        "_http",
        "_tcp",
        port,
        &[("board", "esp32"), ("path", "/")],
    )?;

    info!("mdns registered as {}.local", hostname);
    Ok(mdns)
}
