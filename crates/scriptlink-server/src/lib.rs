//! # scriptlink-server
//!
//! Host-side subsystem bindings built on tokio:
//! - The streaming file/REST server as an axum service, bridged into a
//!   bounded event channel
//! - An MQTT client binding over rumqttc with the same channel contract
//!
//! Each subsystem is exposed as a session object with an owned lifecycle:
//! `start(config)` creates the channel and the background task, `poll()`
//! never blocks, `stop()` cancels the task and drains the channel. A channel
//! is never reused across sessions.

pub mod mqtt;
pub mod routes;
pub mod server;

pub use mqtt::{MqttConfig, MqttError, MqttSession, QoS};
pub use server::{FileServerConfig, FileServerSession, ServerError};

pub use scriptlink_core::{EventKind, EventRecord};
