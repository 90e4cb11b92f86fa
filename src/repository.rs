use std::collections::HashMap;

use crate::events::DevicePropertyId;
use crate::utils::config::PropertyConfig;

/// The device a property belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub device_type: String,
    pub id: String,
}

/// Descriptive metadata for a device property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMetadata {
    pub id: DevicePropertyId,
    pub label: String,
    pub device: DeviceRef,
}

/// Resolves a device property id to its metadata.
pub trait PropertyRepository: Send + Sync {
    fn lookup(&self, id: DevicePropertyId) -> Option<PropertyMetadata>;
}

/// Repository backed by a fixed set of properties, typically from the `[[property]]`
/// tables of the configuration file.
#[derive(Debug, Default)]
pub struct StaticPropertyRepository {
    properties: HashMap<DevicePropertyId, PropertyMetadata>,
}

impl StaticPropertyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(properties: &[PropertyConfig]) -> Self {
        properties
            .iter()
            .map(|property| PropertyMetadata {
                id: DevicePropertyId(property.id),
                label: property.label.clone(),
                device: DeviceRef {
                    device_type: property.device_type.clone(),
                    id: property.device_id.clone(),
                },
            })
            .collect()
    }

    /// Adds or replaces the metadata for `metadata.id`.
    pub fn insert(&mut self, metadata: PropertyMetadata) {
        self.properties.insert(metadata.id, metadata);
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl FromIterator<PropertyMetadata> for StaticPropertyRepository {
    fn from_iter<I: IntoIterator<Item = PropertyMetadata>>(iter: I) -> Self {
        let mut repository = Self::new();
        for metadata in iter {
            repository.insert(metadata);
        }
        repository
    }
}

impl PropertyRepository for StaticPropertyRepository {
    fn lookup(&self, id: DevicePropertyId) -> Option<PropertyMetadata> {
        self.properties.get(&id).cloned()
    }
}
