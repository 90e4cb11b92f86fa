use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::kind::{EventKind, PropertyKind, Trigger};

/// Identifier of a single property of a device (e.g. the temperature channel of a sensor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePropertyId(pub u64);

impl fmt::Display for DevicePropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A value together with the time it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    pub timestamp: DateTime<FixedOffset>,
}

impl<T> Sample<T> {
    pub fn new(value: T, timestamp: DateTime<FixedOffset>) -> Self {
        Self { value, timestamp }
    }
}

/// The current sample and, unless this is the first observation, the one before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    pub current: Sample<T>,
    pub previous: Option<Sample<T>>,
}

impl<T> Observation<T> {
    pub fn first(current: Sample<T>) -> Self {
        Self {
            current,
            previous: None,
        }
    }

    pub fn following(current: Sample<T>, previous: Sample<T>) -> Self {
        Self {
            current,
            previous: Some(previous),
        }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Observation<U> {
        Observation {
            current: Sample::new(f(&self.current.value), self.current.timestamp),
            previous: self
                .previous
                .as_ref()
                .map(|previous| Sample::new(f(&previous.value), previous.timestamp)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollerState {
    Opening,
    Closing,
    Stopped,
}

impl RollerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollerState::Opening => "OPENING",
            RollerState::Closing => "CLOSING",
            RollerState::Stopped => "STOPPED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Off,
    Fire,
    Burglar,
    Panic,
}

impl AlarmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Off => "OFF",
            AlarmState::Fire => "FIRE",
            AlarmState::Burglar => "BURGLAR",
            AlarmState::Panic => "PANIC",
        }
    }
}

/// What changed, with the typed value for each property kind.
///
/// Units are fixed per kind: temperatures in °C, humidity, dimming, roller
/// position and battery in percent, illuminance in lux, power in W, CO2 in ppm,
/// pressure in mbar, cloud base in m, wind speeds in km/h, directions in
/// degrees, wind run in km, rain amounts in mm and rain rate in mm/h.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    RelayState(Observation<bool>),
    Temperature(Observation<f64>),
    Humidity(Observation<f64>),
    DimmingLevel(Observation<i32>),
    Illuminance(Observation<f64>),
    RollerState(Observation<RollerState>),
    RollerPosition(Observation<i32>),
    BatteryLevel(Observation<i32>),
    Power(Observation<f64>),
    WindowState(Observation<bool>),
    Motion(Observation<bool>),
    SmokeState(Observation<bool>),
    Co2Level(Observation<i32>),
    AlarmState(Observation<AlarmState>),
    Pressure(Observation<f64>),
    UvIndex(Observation<f64>),
    CloudBase(Observation<f64>),
    WindSpeed(Observation<f64>),
    WindGustSpeed(Observation<f64>),
    WindDirection(Observation<f64>),
    WindGustDirection(Observation<f64>),
    WindRun(Observation<f64>),
    RainIntervalAmount(Observation<f64>),
    RainTodayAmount(Observation<f64>),
    RainRate(Observation<f64>),
}

impl PropertyChange {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyChange::RelayState(_) => PropertyKind::RelayState,
            PropertyChange::Temperature(_) => PropertyKind::Temperature,
            PropertyChange::Humidity(_) => PropertyKind::Humidity,
            PropertyChange::DimmingLevel(_) => PropertyKind::DimmingLevel,
            PropertyChange::Illuminance(_) => PropertyKind::Illuminance,
            PropertyChange::RollerState(_) => PropertyKind::RollerState,
            PropertyChange::RollerPosition(_) => PropertyKind::RollerPosition,
            PropertyChange::BatteryLevel(_) => PropertyKind::BatteryLevel,
            PropertyChange::Power(_) => PropertyKind::Power,
            PropertyChange::WindowState(_) => PropertyKind::WindowState,
            PropertyChange::Motion(_) => PropertyKind::Motion,
            PropertyChange::SmokeState(_) => PropertyKind::SmokeState,
            PropertyChange::Co2Level(_) => PropertyKind::Co2Level,
            PropertyChange::AlarmState(_) => PropertyKind::AlarmState,
            PropertyChange::Pressure(_) => PropertyKind::Pressure,
            PropertyChange::UvIndex(_) => PropertyKind::UvIndex,
            PropertyChange::CloudBase(_) => PropertyKind::CloudBase,
            PropertyChange::WindSpeed(_) => PropertyKind::WindSpeed,
            PropertyChange::WindGustSpeed(_) => PropertyKind::WindGustSpeed,
            PropertyChange::WindDirection(_) => PropertyKind::WindDirection,
            PropertyChange::WindGustDirection(_) => PropertyKind::WindGustDirection,
            PropertyChange::WindRun(_) => PropertyKind::WindRun,
            PropertyChange::RainIntervalAmount(_) => PropertyKind::RainIntervalAmount,
            PropertyChange::RainTodayAmount(_) => PropertyKind::RainTodayAmount,
            PropertyChange::RainRate(_) => PropertyKind::RainRate,
        }
    }
}

/// A state change (or repeated observation) of one device property.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePropertyEvent {
    pub property_id: DevicePropertyId,
    pub trigger: Trigger,
    pub change: PropertyChange,
}

impl DevicePropertyEvent {
    pub fn changed(property_id: DevicePropertyId, change: PropertyChange) -> Self {
        Self {
            property_id,
            trigger: Trigger::Changed,
            change,
        }
    }

    pub fn updated(property_id: DevicePropertyId, change: PropertyChange) -> Self {
        Self {
            property_id,
            trigger: Trigger::Updated,
            change,
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::new(self.change.kind(), self.trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn observation_map_keeps_timestamps_and_pairing() {
        let first = Observation::first(Sample::new(3, at("2024-01-01T10:00:00+01:00")));
        let mapped = first.map(|v| v * 2);
        assert_eq!(mapped.current.value, 6);
        assert_eq!(mapped.current.timestamp, at("2024-01-01T10:00:00+01:00"));
        assert!(mapped.previous.is_none());

        let following = Observation::following(
            Sample::new(true, at("2024-01-01T10:05:00Z")),
            Sample::new(false, at("2024-01-01T10:00:00Z")),
        );
        let mapped = following.map(|on| if *on { "on" } else { "off" });
        let previous = mapped.previous.unwrap();
        assert_eq!(previous.value, "off");
        assert_eq!(previous.timestamp, at("2024-01-01T10:00:00Z"));
    }

    #[test]
    fn event_kind_combines_property_kind_and_trigger() {
        let sample = Sample::new(RollerState::Opening, at("2024-01-01T10:00:00Z"));
        let event = DevicePropertyEvent::updated(
            DevicePropertyId(9),
            PropertyChange::RollerState(Observation::first(sample)),
        );
        assert_eq!(event.kind().name(), "RollerStateUpdatedEvent");
    }
}
