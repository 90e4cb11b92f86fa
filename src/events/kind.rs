use std::fmt;
use std::str::FromStr;

use crate::bridge::TranslateError;

/// Declares `PropertyKind` together with `ALL` and `as_str`, so the list of
/// kinds cannot drift from the enum.
macro_rules! property_kinds {
    ($($kind:ident),+ $(,)?) => {
        /// The semantic kind of a device property, independent of how the event fired.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PropertyKind {
            $($kind),+
        }

        impl PropertyKind {
            pub const COUNT: usize = [$(stringify!($kind)),+].len();

            pub const ALL: [PropertyKind; PropertyKind::COUNT] = [$(PropertyKind::$kind),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(PropertyKind::$kind => stringify!($kind)),+
                }
            }
        }
    };
}

property_kinds![
    RelayState,
    Temperature,
    Humidity,
    DimmingLevel,
    Illuminance,
    RollerState,
    RollerPosition,
    BatteryLevel,
    Power,
    WindowState,
    Motion,
    SmokeState,
    Co2Level,
    AlarmState,
    Pressure,
    UvIndex,
    CloudBase,
    WindSpeed,
    WindGustSpeed,
    WindDirection,
    WindGustDirection,
    WindRun,
    RainIntervalAmount,
    RainTodayAmount,
    RainRate,
];

/// `Changed` fires only when the value differs from the previous observation,
/// `Updated` fires on every observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Changed,
    Updated,
}

impl Trigger {
    pub const ALL: [Trigger; 2] = [Trigger::Changed, Trigger::Updated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Changed => "Changed",
            Trigger::Updated => "Updated",
        }
    }
}

/// A concrete event kind, identified on the wire by its stable name
/// (`TemperatureChangedEvent`, `RelayStateUpdatedEvent`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind {
    pub kind: PropertyKind,
    pub trigger: Trigger,
}

impl EventKind {
    pub fn new(kind: PropertyKind, trigger: Trigger) -> Self {
        Self { kind, trigger }
    }

    /// Every known event kind, changed and updated for each property kind.
    pub fn all() -> impl Iterator<Item = EventKind> {
        PropertyKind::ALL.into_iter().flat_map(|kind| {
            Trigger::ALL
                .into_iter()
                .map(move |trigger| EventKind::new(kind, trigger))
        })
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}Event", self.kind.as_str(), self.trigger.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TranslateError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unsupported = || TranslateError::UnsupportedVariant(name.to_string());

        let stem = name.strip_suffix("Event").ok_or_else(unsupported)?;
        let trigger = Trigger::ALL
            .into_iter()
            .find(|trigger| stem.ends_with(trigger.as_str()))
            .ok_or_else(unsupported)?;
        let kind_name = &stem[..stem.len() - trigger.as_str().len()];

        PropertyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == kind_name)
            .map(|kind| EventKind::new(kind, trigger))
            .ok_or_else(unsupported)
    }
}
