use thiserror::Error;

use crate::channel::SendError;

/// Everything the flow engine can report.
///
/// Structural errors ([`FlowError::FlowNotFound`], [`FlowError::StepNotFound`])
/// found while handling an update mean the update did not really belong to
/// the flow system; see [`FlowError::is_handled`].
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow `{0}` is not registered")]
    FlowNotFound(String),

    #[error("flow `{0}` has no steps")]
    EmptyFlow(String),

    #[error("step `{step}` does not exist in flow `{flow}`")]
    StepNotFound { flow: String, step: String },

    #[error("step `{0}` has no prompt")]
    MissingPrompt(String),

    #[error("step `{0}` has no process function")]
    NoProcessFunction(String),

    #[error("step `{step}` is declared twice in flow `{flow}`")]
    DuplicateStep { flow: String, step: String },

    #[error("flow `{0}` is already registered")]
    DuplicateFlow(String),

    #[error("flow `{0}` has no completion handler")]
    NoCompletionHandler(String),

    #[error("flow `{flow}` has no step `{target}` to go to")]
    InvalidTargetStep { flow: String, target: String },

    #[error("could not render prompt: {0}")]
    RenderFailure(#[from] SendError),

    #[error("step `{step}` failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("completion handler of flow `{flow}` failed: {reason}")]
    CompletionFailed { flow: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse flow file: {0}")]
    Parse(String),
}

impl FlowError {
    /// Whether the update that produced this error was owned by the flow
    /// system. Callers log unhandled errors but never show them to the user.
    pub fn is_handled(&self) -> bool {
        !matches!(self, FlowError::FlowNotFound(_) | FlowError::StepNotFound { .. })
    }
}
