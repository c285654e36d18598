use std::sync::Arc;

use async_trait::async_trait;
use channel_plugin::{
    message::{Button, ChannelMessage, Keyboard, MediaMetadata, MediaType, MessageContent, Participant},
    plugin::{ChannelPlugin, PluginError},
};
use handlebars::Handlebars;
use serde_json::Value;
use thiserror::Error;

use crate::flow::{definition::Prompt, scope::FlowScope};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SendError {
    #[error("template error: {0}")]
    Template(String),

    #[error("prompt has neither text nor image")]
    EmptyPrompt,

    #[error("channel cannot send {0}")]
    Unsupported(String),

    #[error(transparent)]
    Channel(#[from] PluginError),
}

/// Renders a step's prompt and pushes it to the user.
#[async_trait]
pub trait PromptSender: Send + Sync {
    /// Returns the id of the sent message.
    async fn compose_and_send(&self, scope: &FlowScope, prompt: &Prompt) -> Result<String, SendError>;

    /// Send `text` as is, without template rendering or buttons.
    async fn send_notice(&self, scope: &FlowScope, text: &str) -> Result<String, SendError>;
}

/// A [`PromptSender`] that renders with Handlebars and sends over a channel plugin.
pub struct ChannelPromptSender {
    channel: Arc<dyn ChannelPlugin>,
    templates: Handlebars<'static>,
}

impl ChannelPromptSender {
    pub fn new(channel: Arc<dyn ChannelPlugin>) -> Self {
        let mut templates = Handlebars::new();
        // chat text, not HTML
        templates.register_escape_fn(handlebars::no_escape);
        Self { channel, templates }
    }

    fn render(&self, template: &str, ctx: &Value) -> Result<String, SendError> {
        self.templates
            .render_template(template, ctx)
            .map_err(|e| SendError::Template(e.to_string()))
    }

    fn render_keyboard(&self, keyboard: &Keyboard, ctx: &Value) -> Result<Keyboard, SendError> {
        let mut rows = Vec::with_capacity(keyboard.rows.len());
        for row in &keyboard.rows {
            let mut buttons = Vec::with_capacity(row.len());
            for button in row {
                buttons.push(Button::new(self.render(&button.text, ctx)?, button.data.clone()));
            }
            rows.push(buttons);
        }
        Ok(Keyboard::new(rows))
    }

    fn outgoing(&self, scope: &FlowScope, content: MessageContent) -> ChannelMessage {
        let mut msg = ChannelMessage::outgoing(&self.channel.name(), scope.chat_id(), content);
        msg.to = vec![Participant::with_id(scope.user_id())];
        msg
    }

    fn compose(&self, scope: &FlowScope, prompt: &Prompt) -> Result<ChannelMessage, SendError> {
        if prompt.is_empty() {
            return Err(SendError::EmptyPrompt);
        }
        let ctx = scope.template_context();
        let text = prompt.text.as_deref().map(|t| self.render(t, &ctx)).transpose()?;

        let content = match &prompt.image {
            Some(url) => {
                if !self.channel.capabilities().supports_media {
                    return Err(SendError::Unsupported("media".into()));
                }
                MessageContent::Media(MediaMetadata {
                    kind: MediaType::Image,
                    url: self.render(url, &ctx)?,
                    caption: text,
                })
            }
            None => MessageContent::Text(text.unwrap_or_default()),
        };

        let mut msg = self.outgoing(scope, content);
        msg.keyboard = prompt
            .keyboard
            .as_ref()
            .filter(|kb| !kb.is_empty())
            .map(|kb| self.render_keyboard(kb, &ctx))
            .transpose()?;
        Ok(msg)
    }
}

#[async_trait]
impl PromptSender for ChannelPromptSender {
    async fn compose_and_send(&self, scope: &FlowScope, prompt: &Prompt) -> Result<String, SendError> {
        let msg = self.compose(scope, prompt)?;
        let id = self.channel.send(msg).await?;
        tracing::debug!(user_id = scope.user_id(), step = scope.step(), message_id = %id, "prompt sent");
        Ok(id)
    }

    async fn send_notice(&self, scope: &FlowScope, text: &str) -> Result<String, SendError> {
        let msg = self.outgoing(scope, MessageContent::Text(text.to_string()));
        Ok(self.channel.send(msg).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FlowData;
    use channel_plugin::plugin_test_util::MockChannel;

    fn scope() -> FlowScope {
        let mut data = FlowData::new();
        data.insert("name".into(), "Alice & Bob".into());
        FlowScope::new("u1", "c1", "signup", "age", data)
    }

    #[tokio::test]
    async fn renders_text_without_escaping() {
        let mock = MockChannel::new();
        let sender = ChannelPromptSender::new(mock.clone());
        let id = sender
            .compose_and_send(&scope(), &Prompt::text("Hi {{state.name}}, how old are you?"))
            .await
            .unwrap();
        assert_eq!(id, "1");
        let sent = mock.last_sent().unwrap();
        assert_eq!(sent.text_content(), Some("Hi Alice & Bob, how old are you?"));
        assert_eq!(sent.chat_id, "c1");
        assert_eq!(sent.to[0].id, "u1");
    }

    #[tokio::test]
    async fn image_prompt_becomes_media_with_caption_and_buttons() {
        let mock = MockChannel::new();
        let sender = ChannelPromptSender::new(mock.clone());
        let prompt = Prompt::text("Like it, {{user_id}}?")
            .with_image("https://img/{{flow}}.png")
            .with_keyboard(Keyboard::column(vec![Button::new("Yes {{state.name}}", "tok-y")]));
        sender.compose_and_send(&scope(), &prompt).await.unwrap();

        let sent = mock.last_sent().unwrap();
        match sent.content {
            Some(MessageContent::Media(media)) => {
                assert_eq!(media.url, "https://img/signup.png");
                assert_eq!(media.caption.as_deref(), Some("Like it, u1?"));
            }
            other => panic!("expected media, got {other:?}"),
        }
        let keyboard = sent.keyboard.unwrap();
        assert_eq!(keyboard.rows[0][0], Button::new("Yes Alice & Bob", "tok-y"));
    }

    #[tokio::test]
    async fn refuses_what_cannot_be_sent() {
        let mock = MockChannel::text_only();
        let sender = ChannelPromptSender::new(mock.clone());
        let err = sender.compose_and_send(&scope(), &Prompt::image("https://img/x.png")).await.unwrap_err();
        assert_eq!(err, SendError::Unsupported("media".into()));
        let err = sender.compose_and_send(&scope(), &Prompt::default()).await.unwrap_err();
        assert_eq!(err, SendError::EmptyPrompt);
        let err = sender.compose_and_send(&scope(), &Prompt::text("{{#if}}")).await.unwrap_err();
        assert!(matches!(err, SendError::Template(_)));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn notices_are_sent_verbatim() {
        let mock = MockChannel::new();
        let sender = ChannelPromptSender::new(mock.clone());
        sender.compose_and_send(&scope(), &Prompt::text("x")).await.unwrap();
        let id = sender.send_notice(&scope(), "Oops {{state.name}} {{#if").await.unwrap();
        assert_eq!(id, "2");
        let sent = mock.last_sent().unwrap();
        assert_eq!(sent.text_content(), Some("Oops {{state.name}} {{#if"));
        assert_eq!(sent.to[0].id, "u1");
        assert!(sent.keyboard.is_none());
    }

    #[tokio::test]
    async fn channel_failure_is_wrapped() {
        let mock = MockChannel::new();
        mock.fail_next_sends(1);
        let sender = ChannelPromptSender::new(mock.clone());
        let err = sender.compose_and_send(&scope(), &Prompt::text("hi")).await.unwrap_err();
        assert!(matches!(err, SendError::Channel(PluginError::Other(_))));
    }
}
