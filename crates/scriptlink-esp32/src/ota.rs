//! Over-the-air firmware updates.
//!
//! The new image streams from the download into the inactive partition
//! through the scratch buffer; the full image is never held in memory.

use anyhow::{bail, Result};
use embedded_svc::http::client::Client;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::ota::EspOta;
use log::info;

use crate::io::EmbeddedRead;

/// Download a firmware image and write it to the inactive OTA partition.
///
/// The device must be restarted afterwards for the new image to boot.
pub fn update_from_url(url: &str, scratch: &mut [u8]) -> Result<()> {
    let connection = EspHttpConnection::new(&HttpConfiguration {
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    })?;
    let mut client = Client::wrap(connection);

    let request = client.get(url)?;
    let mut response = request.submit()?;
    if response.status() != 200 {
        bail!("firmware download failed with status {}", response.status());
    }

    let mut ota = EspOta::new()?;
    let mut update = ota.initiate_update()?;

    let mut body = EmbeddedRead(&mut response);
    let mut written = 0u64;
    loop {
        let read = std::io::Read::read(&mut body, scratch)?;
        if read == 0 {
            break;
        }
        update.write(&scratch[..read])?;
        written += read as u64;
    }

    update.complete()?;
    info!("ota update written ({} bytes), restart to boot it", written);
    Ok(())
}
