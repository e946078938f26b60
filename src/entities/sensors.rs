//! Sensor entity declarations.
//!
//! A sensor is a key, some display metadata, and a read callback supplied
//! by the collaborator that owns the underlying measurement. A `None`
//! reading surfaces as `missing_state` instead of a stale number.

use crate::protocol::messages::{ListEntitiesSensorResponse, SensorStateResponse};

type ReadFn = Box<dyn Fn() -> Option<f32> + Send + Sync>;

pub struct SensorEntity {
    pub key: u32,
    pub object_id: String,
    pub name: String,
    pub unit: String,
    pub icon: String,
    pub accuracy_decimals: i32,
    read: ReadFn,
}

impl SensorEntity {
    pub fn new(key: u32, object_id: &str, name: &str, unit: &str, accuracy_decimals: i32) -> Self {
        Self {
            key,
            object_id: object_id.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            icon: String::new(),
            accuracy_decimals,
            read: Box::new(|| None),
        }
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = icon.to_string();
        self
    }

    pub fn with_read(mut self, read: impl Fn() -> Option<f32> + Send + Sync + 'static) -> Self {
        self.read = Box::new(read);
        self
    }

    pub fn definition(&self) -> ListEntitiesSensorResponse {
        ListEntitiesSensorResponse {
            object_id: self.object_id.clone(),
            key: self.key,
            name: self.name.clone(),
            unique_id: self.object_id.clone(),
            icon: self.icon.clone(),
            unit_of_measurement: self.unit.clone(),
            accuracy_decimals: self.accuracy_decimals,
            force_update: false,
            device_class: String::new(),
        }
    }

    pub fn state(&self) -> SensorStateResponse {
        match (self.read)() {
            Some(value) => SensorStateResponse {
                key: self.key,
                state: value,
                missing_state: false,
            },
            None => SensorStateResponse {
                key: self.key,
                state: 0.0,
                missing_state: true,
            },
        }
    }
}
