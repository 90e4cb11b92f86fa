use std::collections::HashSet;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::translator::{EventTranslator, TranslateError};
use crate::events::{DevicePropertyEvent, DomainEvent, EventKind};
use crate::mqtt::SessionError;

/// Destination for serialized event records.
pub trait MessagePublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0} is configured to be ignored")]
    Ignored(EventKind),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("failed to serialize {event}: {source}")]
    Serialize {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Publish(#[from] SessionError),
}

/// Outcome of a successfully handed over event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub bytes: usize,
}

/// Publishes every device property event as a JSON record on one topic.
pub struct EventMqttPublisher<P> {
    translator: EventTranslator,
    publisher: P,
    topic: String,
    ignored: HashSet<EventKind>,
}

impl<P: MessagePublisher> EventMqttPublisher<P> {
    pub fn new(translator: EventTranslator, publisher: P, topic: impl Into<String>) -> Self {
        Self {
            translator,
            publisher,
            topic: topic.into(),
            ignored: HashSet::new(),
        }
    }

    /// Event kinds that are dropped without being translated.
    pub fn with_ignored(mut self, ignored: impl IntoIterator<Item = EventKind>) -> Self {
        self.ignored.extend(ignored);
        self
    }

    /// Handles one event. Failures are logged and never affect later events.
    pub fn handle(&self, event: &DevicePropertyEvent) {
        match self.try_handle(event) {
            Ok(published) => debug!(
                "Handed {} ({} bytes) to topic '{}'",
                event.kind(),
                published.bytes,
                published.topic
            ),
            Err(BridgeError::Ignored(kind)) => debug!("Ignoring {} event", kind),
            Err(BridgeError::Publish(e)) => {
                error!(property_id = %event.property_id, event = %event.kind(), "{}", e)
            }
            Err(e) => error!(
                property_id = %event.property_id,
                "failed to map event {}: {}",
                event.kind(),
                e
            ),
        }
    }

    pub fn try_handle(&self, event: &DevicePropertyEvent) -> Result<Published, BridgeError> {
        let kind = event.kind();
        if self.ignored.contains(&kind) {
            return Err(BridgeError::Ignored(kind));
        }

        let record = self.translator.map(event)?;
        let payload = serde_json::to_vec(&record).map_err(|source| BridgeError::Serialize {
            event: record.property_type.clone(),
            source,
        })?;
        let bytes = payload.len();

        self.publisher.publish(&self.topic, payload)?;

        Ok(Published {
            topic: self.topic.clone(),
            bytes,
        })
    }

    /// Consumes domain events from the bus one at a time until the bus closes.
    pub async fn run(self, mut events: broadcast::Receiver<DomainEvent>) {
        info!("Publishing device property events to '{}'", self.topic);
        loop {
            match events.recv().await {
                Ok(DomainEvent::DeviceProperty(event)) => self.handle(&event),
                Ok(DomainEvent::MqttClientConnected { client_id }) => {
                    info!("MQTT client {} connected", client_id);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event receiver lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed");
                    break;
                }
            }
        }
    }
}
