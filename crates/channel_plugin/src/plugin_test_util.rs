use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use async_trait::async_trait;

use crate::{
    message::{ChannelCapabilities, ChannelMessage, Keyboard, MessageContent},
    plugin::{ChannelPlugin, PluginError},
};

/// Everything a [`MockChannel`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOp {
    Sent(ChannelMessage),
    Deleted { chat_id: String, message_id: String },
    KeyboardEdited { chat_id: String, message_id: String, keyboard: Option<Keyboard> },
    CallbackAnswered(String),
}

/// In-memory channel that records operations instead of talking to a backend.
///
/// Message ids are handed out sequentially starting at `1`.
pub struct MockChannel {
    ops: Mutex<Vec<ChannelOp>>,
    next_id: AtomicU64,
    failing_sends: AtomicUsize,
    reject_media: AtomicBool,
    fail_cleanup: AtomicBool,
    supports_media: bool,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    /// A mock whose capabilities report no media support.
    pub fn text_only() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    fn build(supports_media: bool) -> Self {
        Self {
            ops: Mutex::new(vec![]),
            next_id: AtomicU64::new(1),
            failing_sends: AtomicUsize::new(0),
            reject_media: AtomicBool::new(false),
            fail_cleanup: AtomicBool::new(false),
            supports_media,
        }
    }

    /// The next `n` calls to `send` fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    /// Every send carrying media fails while this is set.
    pub fn reject_media(&self, reject: bool) {
        self.reject_media.store(reject, Ordering::SeqCst);
    }

    /// Deletes, keyboard edits and callback answers fail while this is set.
    pub fn fail_cleanup(&self, fail: bool) {
        self.fail_cleanup.store(fail, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<ChannelOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<ChannelMessage> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ChannelOp::Sent(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Text (or caption) of every sent message.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|m| m.text_content().map(str::to_string))
            .collect()
    }

    pub fn last_sent(&self) -> Option<ChannelMessage> {
        self.sent().pop()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn record(&self, op: ChannelOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn check_cleanup(&self) -> Result<(), PluginError> {
        if self.fail_cleanup.load(Ordering::SeqCst) {
            Err(PluginError::Other("injected cleanup failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChannelPlugin for MockChannel {
    fn name(&self) -> String {
        "mock".into()
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            name: "mock".to_string(),
            supports_sending: true,
            supports_receiving: true,
            supports_text: true,
            supports_media: self.supports_media,
            supports_buttons: true,
            supports_editing: true,
            supports_deleting: true,
        }
    }

    async fn send(&self, mut msg: ChannelMessage) -> Result<String, PluginError> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(PluginError::Other("injected send failure".into()));
        }
        if self.reject_media.load(Ordering::SeqCst)
            && matches!(msg.content, Some(MessageContent::Media(_)))
        {
            return Err(PluginError::Other("media upload failed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        msg.id = id.clone();
        self.record(ChannelOp::Sent(msg));
        Ok(id)
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PluginError> {
        self.check_cleanup()?;
        self.record(ChannelOp::Deleted {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn edit_keyboard(
        &self,
        chat_id: &str,
        message_id: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), PluginError> {
        self.check_cleanup()?;
        self.record(ChannelOp::KeyboardEdited {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), PluginError> {
        self.check_cleanup()?;
        self.record(ChannelOp::CallbackAnswered(callback_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MediaMetadata, MediaType};

    #[tokio::test]
    async fn assigns_sequential_ids_and_records() {
        let mock = MockChannel::new();
        let a = mock.send(ChannelMessage::outgoing("mock", "c", MessageContent::Text("a".into()))).await.unwrap();
        let b = mock.send(ChannelMessage::outgoing("mock", "c", MessageContent::Text("b".into()))).await.unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("1", "2"));
        assert_eq!(mock.sent_texts(), vec!["a", "b"]);
        assert_eq!(mock.last_sent().unwrap().id, "2");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let mock = MockChannel::new();
        mock.fail_next_sends(1);
        let msg = ChannelMessage::outgoing("mock", "c", MessageContent::Text("x".into()));
        assert!(mock.send(msg.clone()).await.is_err());
        assert!(mock.send(msg).await.is_ok());
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn media_rejection_and_cleanup_failure() {
        let mock = MockChannel::new();
        mock.reject_media(true);
        let media = ChannelMessage::outgoing("mock", "c", MessageContent::Media(MediaMetadata {
            kind: MediaType::Image,
            url: "u".into(),
            caption: None,
        }));
        assert!(mock.send(media).await.is_err());

        mock.fail_cleanup(true);
        assert!(mock.delete_message("c", "1").await.is_err());
        mock.fail_cleanup(false);
        mock.delete_message("c", "1").await.unwrap();
        assert_eq!(mock.ops(), vec![ChannelOp::Deleted { chat_id: "c".into(), message_id: "1".into() }]);
    }
}
