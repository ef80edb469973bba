//! # scriptlink-core
//!
//! Core primitives for bridging native subsystem callbacks to a pull-based
//! scripting runtime.
//!
//! This crate provides:
//! - Event records (owned snapshots of one asynchronous notification)
//! - A bounded FIFO event channel with non-blocking producer and consumer
//! - The bridge adapter wrapper used by subsystem callbacks
//! - A session slot enforcing one active session per subsystem
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod bridge;
pub mod channel;
pub mod event;
pub mod session;

pub use bridge::EventBridge;
pub use channel::{channel, EventReceiver, EventSender, TrySendError, DEFAULT_CAPACITY};
pub use event::{EventKind, EventRecord};
pub use session::SessionSlot;
