//! MQTT client binding.
//!
//! Wraps a rumqttc client in the same session/channel contract as the file
//! server: a spawned task polls the client's event loop and translates each
//! incoming packet into an event record, which the bridge forwards into the
//! session's bounded channel. Message payloads are copied length-bounded —
//! they are arbitrary bytes, never assumed to be text.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scriptlink_core::{channel, EventBridge, EventKind, EventRecord, DEFAULT_CAPACITY};

pub use rumqttc::QoS;

/// How long `stop` waits for the event loop task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before re-polling the event loop after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Capacity of the rumqttc request queue (client -> event loop).
const REQUEST_QUEUE_CAPACITY: usize = 10;

/// Configuration for an MQTT client session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address.
    pub broker_host: String,
    /// Broker port.
    pub broker_port: u16,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Capacity of the session's event channel.
    pub queue_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "scriptlink".to_string(),
            keep_alive_secs: 5,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Errors that can occur while talking to the MQTT client.
#[derive(Debug, Error)]
pub enum MqttError {
    /// The client request queue rejected the operation.
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// A running MQTT client session.
pub struct MqttSession {
    client: AsyncClient,
    receiver: scriptlink_core::EventReceiver,
    bridge: Arc<EventBridge>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MqttSession {
    /// Create the client and start the event-bridging task.
    ///
    /// The broker connection is established (and re-established) in the
    /// background; connect/disconnect outcomes surface as events.
    pub fn start(config: MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        let _ = options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);

        let (sender, receiver) = channel(config.queue_capacity);
        let bridge = Arc::new(EventBridge::new(sender));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_event_bridge(
            eventloop,
            bridge.clone(),
            cancel.clone(),
        ));

        info!(
            "mqtt session started for {}:{}",
            config.broker_host, config.broker_port
        );

        Self {
            client,
            receiver,
            bridge,
            cancel,
            task,
        }
    }

    /// Subscribe to a topic.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        self.client.subscribe(topic, qos).await?;
        Ok(())
    }

    /// Unsubscribe from a topic.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client.unsubscribe(topic).await?;
        Ok(())
    }

    /// Publish a payload to a topic.
    pub async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), MqttError> {
        self.client.publish(topic, qos, false, payload).await?;
        Ok(())
    }

    /// Poll the session's event channel without blocking.
    pub fn poll(&mut self) -> Option<EventRecord> {
        self.receiver.try_recv()
    }

    /// How many events were dropped because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.bridge.dropped()
    }

    /// Stop the session: disconnect, cancel the event loop task, then drain
    /// and close the channel. Returns the number of unconsumed events
    /// released during the drain.
    pub async fn stop(mut self) -> usize {
        // Best effort; the broker may already be gone.
        if let Err(e) = self.client.disconnect().await {
            debug!("mqtt disconnect failed: {}", e);
        }
        self.cancel.cancel();
        if tokio::time::timeout(STOP_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            error!("mqtt event loop did not stop in time, aborting task");
            self.task.abort();
        }

        let released = self.receiver.drain_and_close();
        info!("mqtt session stopped");
        released
    }
}

/// Poll the event loop until cancelled, forwarding each incoming packet as
/// an event record.
async fn run_event_bridge(
    mut eventloop: EventLoop,
    bridge: Arc<EventBridge>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(event) => {
                    if let Some(record) = map_incoming(&event) {
                        bridge.forward(record);
                    }
                }
                Err(e) => {
                    warn!("mqtt connection error: {}", e);
                    bridge.forward(
                        EventRecord::new(EventKind::Error).payload(e.to_string().into_bytes()),
                    );
                    // Back off before the event loop retries the broker.
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }
    drop(eventloop);
}

/// Translate an incoming packet into an event record.
///
/// Outgoing packets and protocol chatter (ping, connect handshakes in
/// flight) produce no record. Message payloads are copied with their exact
/// length; topics become the record subject.
fn map_incoming(event: &Event) -> Option<EventRecord> {
    let Event::Incoming(packet) = event else {
        return None;
    };

    match packet {
        Packet::ConnAck(_) => Some(EventRecord::new(EventKind::Connected)),
        Packet::Disconnect => Some(EventRecord::new(EventKind::Disconnected)),
        Packet::SubAck(ack) => Some(
            EventRecord::new(EventKind::Subscribed).payload(ack.pkid.to_string().into_bytes()),
        ),
        Packet::UnsubAck(ack) => Some(
            EventRecord::new(EventKind::Unsubscribed).payload(ack.pkid.to_string().into_bytes()),
        ),
        Packet::PubAck(ack) => Some(
            EventRecord::new(EventKind::Published).payload(ack.pkid.to_string().into_bytes()),
        ),
        Packet::Publish(publish) => Some(
            EventRecord::new(EventKind::Data)
                .subject(publish.topic.clone())
                .payload(publish.payload.to_vec()),
        ),
        _ => None,
    }
}
