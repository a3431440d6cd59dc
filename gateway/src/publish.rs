//! Outbound publishing.

use rumqttc::{AsyncClient, QoS};
use tracing::debug;

use crate::error::{Error, Result};

/// Sink for gateway output messages.
///
/// The gateway never blocks the audio path on delivery: implementations
/// must queue or drop, not wait.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// Publishes over an MQTT client without waiting for delivery.
///
/// Uses the client's bounded request queue; a full queue surfaces as a
/// publish error and the message is dropped.
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            qos: QoS::AtMostOnce,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, false, payload)
            .map_err(|e| Error::Publish(e.to_string()))
    }
}

/// Discards everything. Stands in when no broker is configured.
#[derive(Debug, Default)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        debug!("discarding {} bytes for {}", payload.len(), topic);
        Ok(())
    }
}
