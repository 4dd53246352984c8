use crate::error::{BridgeError, Result};
use crate::mapping;
use crate::registry::ExposedValueRegistry;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tracing::{debug, error, info};

pub const DEFAULT_TOPIC_ROOT: &str = "dsmr";

/// Translates DSMR readings from the metering bus into registry updates.
pub struct IngressBridge {
    registry: ExposedValueRegistry,
    topic_root: String,
}

impl IngressBridge {
    pub fn new(registry: ExposedValueRegistry, topic_root: impl Into<String>) -> Self {
        Self {
            registry,
            topic_root: topic_root.into(),
        }
    }

    /// Wildcard filter covering every reading under the topic root.
    pub fn subscription_filter(&self) -> String {
        format!("{}/#", self.topic_root)
    }

    /// Subscribes to the whole topic root. Runs after every (re)connect.
    ///
    /// Called from the task that polls the event loop, so the request is
    /// queued without waiting for room in the client channel.
    pub fn on_connect(&self, client: &AsyncClient) -> Result<()> {
        let filter = self.subscription_filter();
        info!("Subscribing to {filter}");
        client.try_subscribe(filter, QoS::AtMostOnce)?;
        Ok(())
    }

    /// Handles one reading. Unmapped topics are ignored and malformed
    /// payloads are logged and dropped; only registry errors are returned.
    pub fn on_message(&self, topic: &str, payload: &[u8]) -> Result<()> {
        match self.translate(topic, payload) {
            Err(err @ BridgeError::PayloadParse { .. }) => {
                error!("Dropping reading: {err}");
                Ok(())
            }
            other => other,
        }
    }

    fn translate(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let Some(mapping) = mapping::lookup(&self.topic_root, topic) else {
            return Ok(());
        };
        let reading = parse_reading(topic, payload)?;
        let value = mapping.conversion.apply(reading);
        debug!("{topic} -> {} = {value}", mapping.path);
        self.registry.update(mapping.path, value)?;
        Ok(())
    }

    /// Dispatches one event from the MQTT event loop.
    pub fn handle_event(&self, event: Event, client: &AsyncClient) -> Result<()> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker");
                self.on_connect(client)
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.on_message(&publish.topic, &publish.payload)
            }
            _ => Ok(()),
        }
    }

    /// Drives the MQTT event loop until the connection fails.
    pub async fn run(&self, mut eventloop: EventLoop, client: AsyncClient) -> Result<()> {
        loop {
            let event = eventloop.poll().await?;
            self.handle_event(event, &client)?;
        }
    }
}

fn parse_reading(topic: &str, payload: &[u8]) -> Result<f64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .ok_or_else(|| BridgeError::PayloadParse {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        })
}
