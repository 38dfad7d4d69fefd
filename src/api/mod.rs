
pub mod setting_engine;

use std::sync::Arc;

use setting_engine::*;

use crate::error::{Error, Result};
use crate::handler::Device;
use crate::room::Room;
use crate::signaling::MessageSender;

/// RoomBuilder assembles a [`Room`] from its collaborators: the local
/// device, the channel to the router and optional settings.
#[derive(Default)]
pub struct RoomBuilder {
    setting_engine: Option<Arc<SettingEngine>>,
    device: Option<Arc<dyn Device>>,
    message_sender: Option<Arc<dyn MessageSender>>,
}

impl RoomBuilder {
    pub fn new() -> Self {
        RoomBuilder::default()
    }

    /// build fails if the device or the message sender is missing.
    pub fn build(mut self) -> Result<Room> {
        let device = self.device.take().ok_or(Error::ErrNoDevice)?;
        let message_sender = self
            .message_sender
            .take()
            .ok_or(Error::ErrNoMessageSender)?;
        let setting_engine = if let Some(setting_engine) = self.setting_engine.take() {
            setting_engine
        } else {
            Arc::new(SettingEngine::default())
        };

        log::debug!("building room [device:{}]", device.name());

        Ok(Room::new(setting_engine, device, message_sender))
    }

    /// WithSettingEngine allows providing a SettingEngine to the room.
    /// Settings should not be changed after passing the engine to a room.
    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.setting_engine = Some(Arc::new(setting_engine));
        self
    }

    pub fn with_device(mut self, device: Arc<dyn Device>) -> Self {
        self.device = Some(device);
        self
    }

    /// WithMessageSender sets where requests and notifications for the
    /// router are written to.
    pub fn with_message_sender(mut self, message_sender: Arc<dyn MessageSender>) -> Self {
        self.message_sender = Some(message_sender);
        self
    }
}
