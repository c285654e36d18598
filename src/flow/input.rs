use std::collections::HashMap;

use channel_plugin::message::{ChannelMessage, MessageContent};
use serde_json::Value;

use crate::channel::CallbackResolver;
use crate::state::StateValue;

/// A button press, resolved back to the value the button was made for.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonClick {
    /// The resolved value, or the raw token when the resolver did not know it.
    pub data: StateValue,
    pub token: String,
    /// Text (or caption) of the message the button sat on.
    pub message_text: String,
    pub message_id: Option<String>,
    pub callback_id: String,
    pub user_id: String,
    pub chat_id: String,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowInput {
    pub text: String,
    pub click: Option<ButtonClick>,
}

/// Turn an inbound event into the input a step sees.
///
/// Text events give their text. A button press gives its token as text and a
/// [`ButtonClick`] whose data is the resolved value. Anything else gives the
/// media caption, if there is one.
pub async fn extract_input(msg: &ChannelMessage, resolver: &dyn CallbackResolver) -> FlowInput {
    match &msg.content {
        Some(MessageContent::Text(text)) => FlowInput { text: text.clone(), click: None },
        Some(MessageContent::Callback(query)) => {
            let data = match resolver.resolve(&msg.from.id, &query.token).await {
                Some(value) => value,
                None => {
                    tracing::debug!(user_id = %msg.from.id, token = %query.token, "unknown click token, using it as data");
                    StateValue::String(query.token.clone())
                }
            };
            let click = ButtonClick {
                data,
                token: query.token.clone(),
                message_text: query.message_text.clone().unwrap_or_default(),
                message_id: query.message_id.clone(),
                callback_id: query.id.clone(),
                user_id: msg.from.id.clone(),
                chat_id: msg.chat_id.clone(),
                metadata: HashMap::new(),
            };
            FlowInput { text: query.token.clone(), click: Some(click) }
        }
        _ => FlowInput { text: msg.text_content().unwrap_or_default().to_string(), click: None },
    }
}
