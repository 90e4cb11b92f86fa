//! Bridges in-process device property events to an MQTT broker.
//!
//! Every [`events::DevicePropertyEvent`] raised on the [`events::EventBus`] is
//! translated into a [`bridge::WireRecord`] and published as JSON through an
//! [`mqtt::MqttSession`], which also offers callback-based subscriptions.

pub mod bridge;
pub mod events;
pub mod mqtt;
pub mod repository;
pub mod shutdown;
pub mod utils;
