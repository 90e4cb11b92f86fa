// events module - Domain event model and in-process delivery

pub mod bus;
pub mod event;
pub mod kind;

// Re-export commonly used items for convenience
pub use bus::{DomainEvent, EventBus};
pub use event::{
    AlarmState, DevicePropertyEvent, DevicePropertyId, Observation, PropertyChange, RollerState,
    Sample,
};
pub use kind::{EventKind, PropertyKind, Trigger};
