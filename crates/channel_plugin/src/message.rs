use std::collections::HashMap;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct ChannelMessage {
    pub id: String,                       // Channel-provided message id, empty until sent
    pub chat_id: String,                  // Conversation the message belongs to
    pub direction: MessageDirection,      // Incoming or Outgoing
    pub timestamp: DateTime<Utc>,         // When it was sent or received
    pub channel: String,                  // Telegram, console, mock, etc.
    pub from: Participant,                // Sender info
    pub to: Vec<Participant>,             // Recipient(s)

    pub content: Option<MessageContent>,  // Text, media or a button callback
    pub keyboard: Option<Keyboard>,       // Inline buttons attached to the message
    pub reply_to_id: Option<String>,      // If replying to another message
    pub metadata: HashMap<String, Value>, // Channel-specific or custom data
}

impl ChannelMessage {
    /// An incoming free-text message.
    pub fn text(channel: &str, chat_id: &str, from: Participant, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            direction: MessageDirection::Incoming,
            timestamp: Utc::now(),
            channel: channel.to_string(),
            from,
            content: Some(MessageContent::Text(text.into())),
            ..Default::default()
        }
    }

    /// An incoming button press.
    pub fn callback(channel: &str, chat_id: &str, from: Participant, query: CallbackQuery) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            direction: MessageDirection::Incoming,
            timestamp: Utc::now(),
            channel: channel.to_string(),
            from,
            content: Some(MessageContent::Callback(query)),
            ..Default::default()
        }
    }

    /// A message the host is about to push to `chat_id`.
    pub fn outgoing(channel: &str, chat_id: &str, content: MessageContent) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            direction: MessageDirection::Outgoing,
            timestamp: Utc::now(),
            channel: channel.to_string(),
            content: Some(content),
            ..Default::default()
        }
    }

    /// The visible text of the message: the body of a text message or the
    /// caption of a media message.
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(t)) => Some(t),
            Some(MessageContent::Media(m)) => m.caption.as_deref(),
            _ => None,
        }
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.content {
            Some(MessageContent::Callback(q)) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub enum MessageDirection {
    #[default]
    Incoming,
    Outgoing
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct Participant {
    pub id: String,                          // Internal or platform-specific ID
    pub display_name: Option<String>,        // Optional for SMS, Email
    pub channel_specific_id: Option<String>, // E.g., phone number, email, handle
}

impl Participant {
    pub fn new(id: String, display_name: Option<String>, channel_specific_id: Option<String>) -> Self {
        Self{id, display_name, channel_specific_id}
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub enum MessageContent {
    Text(String),
    Media(MediaMetadata),
    Callback(CallbackQuery),
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MediaMetadata {
    pub kind: MediaType,             // Image, Video, Audio
    pub url: String,                 // Direct link or channel file id
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Binary
}

/// A button press as reported by the channel.
///
/// `token` is whatever the button carried as callback data: an opaque
/// identifier that still has to be resolved to the application value.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CallbackQuery {
    pub id: String,                   // Needed to acknowledge the press
    pub token: String,
    pub message_id: Option<String>,   // Message that carried the button
    pub message_text: Option<String>, // Its text or caption
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub event_payload: Option<Value>
}

/// Rendered inline keyboard markup.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// One button per row.
    pub fn column(buttons: Vec<Button>) -> Self {
        Self { rows: buttons.into_iter().map(|b| vec![b]).collect() }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self { text: text.into(), data: data.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ChannelCapabilities {
    pub name: String,                         // e.g. "telegram", "console"
    pub supports_sending: bool,
    pub supports_receiving: bool,
    pub supports_text: bool,
    pub supports_media: bool,
    pub supports_buttons: bool,
    pub supports_editing: bool,
    pub supports_deleting: bool,
}
