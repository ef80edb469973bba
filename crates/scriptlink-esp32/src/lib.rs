//! ESP32-specific bindings for scriptlink.
//!
//! This crate provides the platform glue between the runtime-agnostic
//! scriptlink cores and the ESP-IDF services:
//! - WiFi association (station, access point, mixed)
//! - The streaming file server over the esp-idf HTTP server, bridged into
//!   the core event channel
//! - MQTT client callbacks bridged into the core event channel
//! - NVS key-value storage and the boot counter
//! - SNTP, mDNS registration, OTA updates and a small HTTP client
//!
//! # Architecture
//!
//! Every subsystem follows the same shape: a session object owns the vendor
//! handle plus the consumer half of a fresh bounded channel; native
//! callbacks copy their payloads into event records and forward them through
//! the bridge; the scripting runtime polls and stops the session, which
//! drains the channel before the vendor handle is released.
//!
//! # Example
//!
//! ```ignore
//! use scriptlink_esp32::wifi::connect_station;
//! use scriptlink_esp32::httpd::{HttpdConfig, HttpdSession};
//!
//! let (_wifi, ip) = connect_station("ssid", "password", 10, peripherals.modem, sysloop)?;
//! let mut httpd = HttpdSession::start(HttpdConfig::default())?;
//! while let Some(event) = httpd.poll() {
//!     // hand to the scripting runtime
//! }
//! ```

pub mod http_client;
pub mod httpd;
pub mod io;
pub mod mdns;
pub mod mqtt;
pub mod nvs;
pub mod ota;
pub mod sntp;
pub mod wifi;
