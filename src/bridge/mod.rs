// bridge module - Turns device property events into MQTT messages

pub mod publisher;
pub mod record;
pub mod translator;

pub use publisher::{BridgeError, EventMqttPublisher, MessagePublisher, Published};
pub use record::{PreviousSample, Scalar, WireRecord};
pub use translator::{EventTranslator, TranslateError};
