use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::events::{AlarmState, DevicePropertyId, RollerState, Sample};

/// Untyped property value as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// JSON has no representation for NaN or infinity; serde_json writes them as `null`.
    pub fn is_finite(&self) -> bool {
        match self {
            Scalar::Float(value) => value.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Integer(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<RollerState> for Scalar {
    fn from(value: RollerState) -> Self {
        Scalar::Text(value.as_str().to_string())
    }
}

impl From<AlarmState> for Scalar {
    fn from(value: AlarmState) -> Self {
        Scalar::Text(value.as_str().to_string())
    }
}

/// The value a property had before the change. Value and timestamp are only
/// ever present together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviousSample {
    #[serde(rename = "previousValue")]
    pub value: Scalar,
    #[serde(rename = "previousTimestamp")]
    pub timestamp: DateTime<FixedOffset>,
}

impl From<Sample<Scalar>> for PreviousSample {
    fn from(sample: Sample<Scalar>) -> Self {
        Self {
            value: sample.value,
            timestamp: sample.timestamp,
        }
    }
}

/// The JSON message published for every device property event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    #[serde(rename = "type")]
    pub device_type: String,
    pub id: String,
    pub property_type: String,
    pub label: String,
    pub property_id: DevicePropertyId,
    pub new_value: Scalar,
    pub new_timestamp: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub previous: Option<PreviousSample>,
}
