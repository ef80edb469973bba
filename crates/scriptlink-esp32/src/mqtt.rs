//! MQTT client binding over the esp-idf MQTT client.
//!
//! The client's event callback runs on the MQTT task. It copies topic and
//! payload length-bounded out of the callback-owned event structure — the
//! structure dies when the callback returns, and payloads are arbitrary
//! bytes, never NUL-terminated — then forwards the record through the
//! bridge without blocking.

use std::sync::Arc;

use anyhow::Result;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use log::info;

use scriptlink_core::{
    channel, EventBridge, EventKind, EventReceiver, EventRecord, DEFAULT_CAPACITY,
};

/// Configuration for an MQTT client session.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL, e.g. `mqtt://192.168.1.10:1883`.
    pub broker_url: String,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Capacity of the session's event channel.
    pub queue_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "scriptlink".to_string(),
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// A running MQTT client session.
pub struct MqttSession {
    client: EspMqttClient<'static>,
    receiver: EventReceiver,
    bridge: Arc<EventBridge>,
}

impl MqttSession {
    /// Create the client and register the event-bridging callback.
    pub fn start(config: MqttConfig) -> Result<Self> {
        let (sender, receiver) = channel(config.queue_capacity);
        let bridge = Arc::new(EventBridge::new(sender));

        let callback_bridge = bridge.clone();
        let client = EspMqttClient::new_cb(
            &config.broker_url,
            &MqttClientConfiguration {
                client_id: Some(&config.client_id),
                ..Default::default()
            },
            move |event| {
                if let Some(record) = map_event(event.payload()) {
                    callback_bridge.forward(record);
                }
            },
        )?;

        info!("mqtt session started for {}", config.broker_url);

        Ok(Self {
            client,
            receiver,
            bridge,
        })
    }

    /// Subscribe to a topic.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()> {
        let _ = self.client.subscribe(topic, qos)?;
        Ok(())
    }

    /// Unsubscribe from a topic.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let _ = self.client.unsubscribe(topic)?;
        Ok(())
    }

    /// Publish a payload to a topic.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<()> {
        let _ = self.client.publish(topic, qos, false, payload)?;
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

    /// Stop the client, then drain and close the channel.
    ///
    /// Returns the number of unconsumed events released during the drain.
    pub fn stop(mut self) -> usize {
        // Destroying the client stops the MQTT task and its callback; only
        // then is the channel drained, so nothing can enqueue afterwards.
        drop(self.client);
        let released = self.receiver.drain_and_close();
        info!("mqtt session stopped");
        released
    }
}

/// Translate a callback event payload into an event record.
///
/// A missing topic or payload is a valid half-populated event, not an
/// error; the fields simply stay absent.
fn map_event(payload: EventPayload<'_, esp_idf_svc::sys::EspError>) -> Option<EventRecord> {
    match payload {
        EventPayload::Connected(_) => Some(EventRecord::new(EventKind::Connected)),
        EventPayload::Disconnected => Some(EventRecord::new(EventKind::Disconnected)),
        EventPayload::Subscribed(id) => {
            Some(EventRecord::new(EventKind::Subscribed).payload(id.to_string().into_bytes()))
        }
        EventPayload::Unsubscribed(id) => {
            Some(EventRecord::new(EventKind::Unsubscribed).payload(id.to_string().into_bytes()))
        }
        EventPayload::Published(id) => {
            Some(EventRecord::new(EventKind::Published).payload(id.to_string().into_bytes()))
        }
        EventPayload::Received { topic, data, .. } => {
            let mut record = EventRecord::new(EventKind::Data).payload(data.to_vec());
            if let Some(topic) = topic {
                record = record.subject(topic);
            }
            Some(record)
        }
        EventPayload::Error(e) => {
            Some(EventRecord::new(EventKind::Error).payload(e.to_string().into_bytes()))
        }
        _ => None,
    }
}
