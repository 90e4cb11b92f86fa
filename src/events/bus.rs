// In-process event delivery - fire-and-forget, at-most-once

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::event::DevicePropertyEvent;
use crate::mqtt::ConnectionListener;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    DeviceProperty(DevicePropertyEvent),
    MqttClientConnected { client_id: String },
}

impl From<DevicePropertyEvent> for DomainEvent {
    fn from(event: DevicePropertyEvent) -> Self {
        DomainEvent::DeviceProperty(event)
    }
}

/// Broadcasts domain events to every subscriber in the process.
///
/// Subscribers that fall behind by more than `capacity` events lose the oldest ones.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: impl Into<DomainEvent>) {
        match self.sender.send(event.into()) {
            Ok(receivers) => trace!("Delivered domain event to {} receiver(s)", receivers),
            Err(broadcast::error::SendError(event)) => {
                debug!("No receivers for domain event: {:?}", event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl ConnectionListener for EventBus {
    fn on_connected(&self, client_id: &str) {
        self.publish(DomainEvent::MqttClientConnected {
            client_id: client_id.to_string(),
        });
    }
}
