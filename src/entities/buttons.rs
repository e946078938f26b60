//! Button entity declarations.
//!
//! Buttons expose one-shot system actions to the controller. Pressing one
//! invokes the injected handler; nothing is sent back beyond entity-state
//! updates, so a press produces no response messages.

use tracing::info;

use crate::protocol::messages::ListEntitiesButtonResponse;

type PressFn = Box<dyn Fn() + Send + Sync>;

pub struct ButtonEntity {
    pub key: u32,
    pub object_id: String,
    pub name: String,
    pub icon: String,
    on_press: PressFn,
}

impl ButtonEntity {
    pub fn new(
        key: u32,
        object_id: &str,
        name: &str,
        icon: &str,
        on_press: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            key,
            object_id: object_id.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            on_press: Box::new(on_press),
        }
    }

    pub fn definition(&self) -> ListEntitiesButtonResponse {
        ListEntitiesButtonResponse {
            object_id: self.object_id.clone(),
            key: self.key,
            name: self.name.clone(),
            unique_id: self.object_id.clone(),
            icon: self.icon.clone(),
            disabled_by_default: false,
            device_class: String::new(),
        }
    }

    pub fn press(&self) {
        info!(button = %self.object_id, "button pressed");
        (self.on_press)();
    }
}
