/*
            inbound ChannelMessage
                    │
                    ▼
┌──────────────────────────────────────────┐
│               FlowEngine                 │
│  input ◀── CallbackResolver (tokens)     │
│  render ──▶ PromptSender  ──┐            │
│  tidy   ──▶ MessageCleaner ─┤            │
└─────────────────────────────┼────────────┘
                              ▼
                    dyn ChannelPlugin
              (telegram, console, mock, ...)
*/
pub mod callback;
pub mod cleaner;
pub mod console;
pub mod sender;

pub use callback::{CallbackRegistry, CallbackResolver};
pub use cleaner::{ChannelCleaner, MessageCleaner};
pub use console::ConsoleChannel;
pub use sender::{ChannelPromptSender, PromptSender, SendError};
