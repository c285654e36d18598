use std::sync::Arc;

use async_trait::async_trait;
use channel_plugin::plugin::{ChannelPlugin, PluginError};

/// Tidies up after a button press.
#[async_trait]
pub trait MessageCleaner: Send + Sync {
    /// Let the backend know the press was received.
    async fn acknowledge(&self, callback_id: &str) -> Result<(), PluginError>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PluginError>;

    /// Remove the buttons of a message, keeping its text or caption.
    async fn strip_keyboard(&self, chat_id: &str, message_id: &str) -> Result<(), PluginError>;
}

pub struct ChannelCleaner {
    channel: Arc<dyn ChannelPlugin>,
}

impl ChannelCleaner {
    pub fn new(channel: Arc<dyn ChannelPlugin>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl MessageCleaner for ChannelCleaner {
    async fn acknowledge(&self, callback_id: &str) -> Result<(), PluginError> {
        self.channel.answer_callback(callback_id).await
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PluginError> {
        if !self.channel.capabilities().supports_deleting {
            return Err(PluginError::Unsupported("delete".into()));
        }
        self.channel.delete_message(chat_id, message_id).await
    }

    async fn strip_keyboard(&self, chat_id: &str, message_id: &str) -> Result<(), PluginError> {
        if !self.channel.capabilities().supports_editing {
            return Err(PluginError::Unsupported("edit".into()));
        }
        self.channel.edit_keyboard(chat_id, message_id, None).await
    }
}
