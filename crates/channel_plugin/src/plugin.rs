use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::message::{ChannelCapabilities, ChannelMessage, Keyboard};

/// What log levels are supported?
/// Higher‐value variants are more severe.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            other => Err(PluginError::Other(format!("unknown log level `{other}`"))),
        }
    }
}

/// The one trait channel authors implement.
///
/// A channel is the wire transport to a messaging backend. It knows how to
/// push a rendered message, and how to tidy up messages it pushed earlier.
/// It knows nothing about flows.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// The name of the channel
    fn name(&self) -> String;

    /// Metadata about this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Push a message out and return the id the backend assigned to it.
    async fn send(&self, msg: ChannelMessage) -> Result<String, PluginError>;

    /// Remove a previously sent message.
    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PluginError>;

    /// Replace (or with `None`, remove) the inline keyboard of a sent message,
    /// leaving its text or caption untouched.
    async fn edit_keyboard(
        &self,
        chat_id: &str,
        message_id: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), PluginError>;

    /// Tell the backend a button press has been received.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), PluginError>;
}

/// Errors that a ChannelPlugin implementation can return.
#[derive(Error, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub enum PluginError {
    /// Something went wrong sending or receiving JSON.
    #[error("JSON error: {0}")]
    Json(String),

    /// The backend cannot do what was asked (e.g. media on a text-only channel).
    #[error("unsupported by channel: {0}")]
    Unsupported(String),

    /// The chat or message does not exist (any more).
    #[error("not found: {0}")]
    NotFound(String),

    /// A timeout occurred.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// The plugin returned an unspecified failure.
    #[error("plugin error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> PluginError {
        PluginError::Json(err.to_string())
    }
}

impl From<anyhow::Error> for PluginError {
    fn from(err: anyhow::Error) -> PluginError {
        PluginError::Other(err.to_string())
    }
}
