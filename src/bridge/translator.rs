use std::sync::Arc;

use tracing::trace;

use super::record::{Scalar, WireRecord};
use crate::events::{DevicePropertyEvent, DevicePropertyId, Observation, PropertyChange};
use crate::repository::PropertyRepository;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    /// The event name is not one of the known event kinds
    #[error("unsupported event kind: {0}")]
    UnsupportedVariant(String),
    /// The repository has no metadata for the event's property
    #[error("device property {property_id} of {event} not found")]
    PropertyNotFound {
        property_id: DevicePropertyId,
        event: String,
    },
    /// A numeric reading is NaN or infinite and cannot be written as JSON
    #[error("device property {property_id} of {event} has a non-finite value")]
    NonFiniteValue {
        property_id: DevicePropertyId,
        event: String,
    },
}

/// Maps device property events to wire records.
#[derive(Clone)]
pub struct EventTranslator {
    repository: Arc<dyn PropertyRepository>,
}

impl EventTranslator {
    pub fn new(repository: Arc<dyn PropertyRepository>) -> Self {
        Self { repository }
    }

    pub fn map(&self, event: &DevicePropertyEvent) -> Result<WireRecord, TranslateError> {
        let property_type = event.kind().name();
        let metadata = self.repository.lookup(event.property_id).ok_or_else(|| {
            TranslateError::PropertyNotFound {
                property_id: event.property_id,
                event: property_type.clone(),
            }
        })?;

        let observation = untyped_observation(&event.change);
        let finite = observation.current.value.is_finite()
            && observation
                .previous
                .as_ref()
                .is_none_or(|previous| previous.value.is_finite());
        if !finite {
            return Err(TranslateError::NonFiniteValue {
                property_id: event.property_id,
                event: property_type,
            });
        }
        trace!(
            property_id = %event.property_id,
            property_type = %property_type,
            "Translated device property event"
        );

        Ok(WireRecord {
            device_type: metadata.device.device_type,
            id: metadata.device.id,
            property_type,
            label: metadata.label,
            property_id: event.property_id,
            new_value: observation.current.value,
            new_timestamp: observation.current.timestamp,
            previous: observation.previous.map(Into::into),
        })
    }
}

fn untyped_observation(change: &PropertyChange) -> Observation<Scalar> {
    match change {
        PropertyChange::RelayState(o) => o.map(|on| Scalar::from(*on)),
        PropertyChange::Temperature(o) => o.map(|degree| Scalar::from(*degree)),
        PropertyChange::Humidity(o) => o.map(|percent| Scalar::from(*percent)),
        PropertyChange::DimmingLevel(o) => o.map(|percent| Scalar::from(*percent)),
        PropertyChange::Illuminance(o) => o.map(|lux| Scalar::from(*lux)),
        PropertyChange::RollerState(o) => o.map(|state| Scalar::from(*state)),
        PropertyChange::RollerPosition(o) => o.map(|percent| Scalar::from(*percent)),
        PropertyChange::BatteryLevel(o) => o.map(|percent| Scalar::from(*percent)),
        PropertyChange::Power(o) => o.map(|watt| Scalar::from(*watt)),
        PropertyChange::WindowState(o) => o.map(|open| Scalar::from(*open)),
        PropertyChange::Motion(o) => o.map(|detected| Scalar::from(*detected)),
        PropertyChange::SmokeState(o) => o.map(|detected| Scalar::from(*detected)),
        PropertyChange::Co2Level(o) => o.map(|ppm| Scalar::from(*ppm)),
        PropertyChange::AlarmState(o) => o.map(|state| Scalar::from(*state)),
        PropertyChange::Pressure(o) => o.map(|mbar| Scalar::from(*mbar)),
        PropertyChange::UvIndex(o) => o.map(|index| Scalar::from(*index)),
        PropertyChange::CloudBase(o) => o.map(|meter| Scalar::from(*meter)),
        PropertyChange::WindSpeed(o) => o.map(|kmh| Scalar::from(*kmh)),
        PropertyChange::WindGustSpeed(o) => o.map(|kmh| Scalar::from(*kmh)),
        PropertyChange::WindDirection(o) => o.map(|degree| Scalar::from(*degree)),
        PropertyChange::WindGustDirection(o) => o.map(|degree| Scalar::from(*degree)),
        PropertyChange::WindRun(o) => o.map(|km| Scalar::from(*km)),
        PropertyChange::RainIntervalAmount(o) => o.map(|mm| Scalar::from(*mm)),
        PropertyChange::RainTodayAmount(o) => o.map(|mm| Scalar::from(*mm)),
        PropertyChange::RainRate(o) => o.map(|mm_per_hour| Scalar::from(*mm_per_hour)),
    }
}
