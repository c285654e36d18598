use channel_plugin::plugin::PluginError;

use crate::channel::MessageCleaner;
use crate::flow::{definition::MessageAction, input::ButtonClick};

/// Apply a flow's message policy to the message a click came from.
/// Clicks that do not say which message they came from are left alone.
pub async fn apply_message_action(
    cleaner: &dyn MessageCleaner,
    action: MessageAction,
    click: &ButtonClick,
) -> Result<(), PluginError> {
    let Some(message_id) = click.message_id.as_deref() else {
        return Ok(());
    };
    match action {
        MessageAction::Keep => Ok(()),
        MessageAction::DeleteMessage => cleaner.delete_message(&click.chat_id, message_id).await,
        MessageAction::StripKeyboard => cleaner.strip_keyboard(&click.chat_id, message_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelCleaner;
    use crate::state::StateValue;
    use channel_plugin::plugin_test_util::{ChannelOp, MockChannel};
    use std::collections::HashMap;

    fn click(message_id: Option<&str>) -> ButtonClick {
        ButtonClick {
            data: StateValue::String("yes".into()),
            token: "yes".into(),
            message_text: "Sure?".into(),
            message_id: message_id.map(str::to_string),
            callback_id: "cb".into(),
            user_id: "u1".into(),
            chat_id: "c1".into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn each_policy_does_its_one_thing() {
        let mock = MockChannel::new();
        let cleaner = ChannelCleaner::new(mock.clone());

        apply_message_action(&cleaner, MessageAction::Keep, &click(Some("7"))).await.unwrap();
        assert!(mock.ops().is_empty());

        apply_message_action(&cleaner, MessageAction::StripKeyboard, &click(Some("7"))).await.unwrap();
        apply_message_action(&cleaner, MessageAction::DeleteMessage, &click(Some("8"))).await.unwrap();
        assert_eq!(
            mock.ops(),
            vec![
                ChannelOp::KeyboardEdited { chat_id: "c1".into(), message_id: "7".into(), keyboard: None },
                ChannelOp::Deleted { chat_id: "c1".into(), message_id: "8".into() },
            ]
        );
    }

    #[tokio::test]
    async fn click_without_message_is_skipped() {
        let mock = MockChannel::new();
        let cleaner = ChannelCleaner::new(mock.clone());
        apply_message_action(&cleaner, MessageAction::DeleteMessage, &click(None)).await.unwrap();
        assert!(mock.ops().is_empty());
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let mock = MockChannel::new();
        mock.fail_cleanup(true);
        let cleaner = ChannelCleaner::new(mock.clone());
        let res = apply_message_action(&cleaner, MessageAction::DeleteMessage, &click(Some("1"))).await;
        assert!(res.is_err());
    }
}
