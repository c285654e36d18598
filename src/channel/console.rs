use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use channel_plugin::{
    message::{ChannelCapabilities, ChannelMessage, Keyboard, MessageContent},
    plugin::{ChannelPlugin, PluginError},
};
use tokio::{
    io::{AsyncWriteExt, Stdout},
    sync::Mutex,
};

/// A channel that prints to stdout. Buttons are listed under the message
/// with their position, so a console user can pick one by number or label.
pub struct ConsoleChannel {
    out: Mutex<Stdout>,
    next_id: AtomicU64,
    last: Mutex<Option<ChannelMessage>>,
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self { out: Mutex::new(tokio::io::stdout()), next_id: AtomicU64::new(1), last: Mutex::new(None) }
    }
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent message that still carries buttons.
    pub async fn last_message(&self) -> Option<ChannelMessage> {
        self.last.lock().await.clone()
    }

    async fn print(&self, text: &str) -> Result<(), PluginError> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes())
            .await
            .map_err(|e| PluginError::Other(e.to_string()))?;
        out.flush().await.map_err(|e| PluginError::Other(e.to_string()))
    }
}

/// How a message looks on the console.
pub fn render(msg: &ChannelMessage) -> String {
    let mut text = match &msg.content {
        Some(MessageContent::Text(t)) => format!("bot> {t}\n"),
        Some(MessageContent::Media(m)) => match &m.caption {
            Some(caption) => format!("bot> [image {}] {caption}\n", m.url),
            None => format!("bot> [image {}]\n", m.url),
        },
        _ => String::new(),
    };
    if let Some(keyboard) = &msg.keyboard {
        for (i, button) in keyboard.buttons().enumerate() {
            text.push_str(&format!("     ({}) {}\n", i + 1, button.text));
        }
    }
    text
}

#[async_trait]
impl ChannelPlugin for ConsoleChannel {
    fn name(&self) -> String {
        "console".into()
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            name: "console".into(),
            supports_sending: true,
            supports_receiving: true,
            supports_text: true,
            supports_media: true,
            supports_buttons: true,
            supports_editing: true,
            supports_deleting: true,
        }
    }

    async fn send(&self, mut msg: ChannelMessage) -> Result<String, PluginError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        msg.id = id.clone();
        self.print(&render(&msg)).await?;
        if msg.keyboard.is_some() {
            *self.last.lock().await = Some(msg);
        }
        Ok(id)
    }

    async fn delete_message(&self, _chat_id: &str, message_id: &str) -> Result<(), PluginError> {
        let mut last = self.last.lock().await;
        if last.as_ref().is_some_and(|m| m.id == message_id) {
            *last = None;
        }
        tracing::debug!(message_id, "console message deleted");
        Ok(())
    }

    async fn edit_keyboard(
        &self,
        _chat_id: &str,
        message_id: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), PluginError> {
        let mut last = self.last.lock().await;
        if let Some(msg) = last.as_mut().filter(|m| m.id == message_id) {
            msg.keyboard = keyboard;
        }
        tracing::debug!(message_id, "console keyboard edited");
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<(), PluginError> {
        Ok(())
    }
}
