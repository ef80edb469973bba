//! Small HTTP client helpers for scripts.
//!
//! GET/POST with in-memory responses bounded by the scratch capacity, and
//! download-to-file which reuses the streaming core so large responses
//! never sit in memory.

use std::path::Path;

use anyhow::{bail, Result};
use embedded_svc::http::client::Client;
use embedded_svc::io::Write;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use log::info;

use scriptlink_files as files;

use crate::io::EmbeddedRead;

fn new_client() -> Result<Client<EspHttpConnection>> {
    let connection = EspHttpConnection::new(&HttpConfiguration {
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    })?;
    Ok(Client::wrap(connection))
}

fn content_length<C: embedded_svc::http::Headers>(response: &C) -> Option<u64> {
    response.header("Content-Length").and_then(|v| v.parse().ok())
}

/// GET a URL, returning the body bounded by the scratch capacity.
pub fn get_string(url: &str, scratch: &mut [u8]) -> Result<String> {
    let mut client = new_client()?;
    let request = client.get(url)?;
    let mut response = request.submit()?;

    let status = response.status();
    let Some(len) = content_length(&response) else {
        bail!("response has no content length");
    };

    let body = files::read_bounded(&mut EmbeddedRead(&mut response), len as usize, scratch)?;
    info!("GET {} -> {} ({} bytes)", url, status, body.len());
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// POST a body to a URL, returning the response bounded by the scratch
/// capacity.
pub fn post_string(url: &str, body: &str, scratch: &mut [u8]) -> Result<String> {
    let mut client = new_client()?;
    let len = body.len().to_string();
    let mut request = client.post(url, &[("Content-Length", len.as_str())])?;
    request.write_all(body.as_bytes())?;
    let mut response = request.submit()?;

    let status = response.status();
    let Some(len) = content_length(&response) else {
        bail!("response has no content length");
    };

    let reply = files::read_bounded(&mut EmbeddedRead(&mut response), len as usize, scratch)?;
    info!("POST {} -> {} ({} bytes)", url, status, reply.len());
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

/// Download a URL into a file through the scratch buffer.
///
/// A failed download removes the partial file, like an aborted upload.
pub fn download_to_file(
    url: &str,
    dest: &Path,
    max_file_size: u64,
    scratch: &mut [u8],
) -> Result<u64> {
    let mut client = new_client()?;
    let request = client.get(url)?;
    let mut response = request.submit()?;

    let Some(len) = content_length(&response) else {
        bail!("response has no content length");
    };

    let written = files::receive_file(
        &mut EmbeddedRead(&mut response),
        dest,
        len,
        max_file_size,
        scratch,
    )?;
    info!("downloaded {} -> {} ({} bytes)", url, dest.display(), written);
    Ok(written)
}
