use std::{collections::HashMap, fmt, future::Future, sync::Arc, time::Duration};

use channel_plugin::message::Keyboard;
use futures::{future::BoxFuture, FutureExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::flow::{error::FlowError, input::ButtonClick, scope::FlowScope};
use crate::state::FlowData;

pub const DEFAULT_ERROR_MESSAGE: &str = "Sorry, something went wrong. Please try again later.";

/// What a step shows the user. Text, image URL and button labels are
/// templates rendered against the working scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Prompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Default::default() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self { image: Some(url.into()), ..Default::default() }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Nothing to send: no text and no image.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty) && self.image.is_none()
    }

    /// The same prompt with its riskiest part removed. The image goes first,
    /// as long as there is text left to carry the message; otherwise the
    /// keyboard goes. `None` when nothing can be dropped.
    pub fn degraded(&self) -> Option<Prompt> {
        if self.image.is_some() {
            let without_image = Prompt { image: None, ..self.clone() };
            if !without_image.is_empty() {
                return Some(without_image);
            }
        }
        if self.keyboard.is_some() {
            return Some(Prompt { keyboard: None, ..self.clone() });
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    NextStep,
    GoToStep(String),
    RetryStep,
    CompleteFlow,
    CancelFlow,
}

/// A step's verdict on the input it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub action: StepAction,
    /// Shown before the action is carried out. For `RetryStep` it replaces
    /// the step's own prompt.
    pub prompt: Option<Prompt>,
}

impl ProcessResult {
    fn action(action: StepAction) -> Self {
        Self { action, prompt: None }
    }

    pub fn next() -> Self {
        Self::action(StepAction::NextStep)
    }

    pub fn go_to(step: impl Into<String>) -> Self {
        Self::action(StepAction::GoToStep(step.into()))
    }

    pub fn retry() -> Self {
        Self::action(StepAction::RetryStep)
    }

    pub fn complete() -> Self {
        Self::action(StepAction::CompleteFlow)
    }

    pub fn cancel() -> Self {
        Self::action(StepAction::CancelFlow)
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

/// What happens to the message holding a button once it has been clicked.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageAction {
    #[default]
    Keep,
    DeleteMessage,
    StripKeyboard,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    #[default]
    Cancel,
    Retry,
    Ignore,
}

/// How a flow reacts when a prompt cannot be rendered.
///
/// `message: None` means the user is not told anything.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ErrorConfig {
    pub strategy: ErrorStrategy,
    pub message: Option<String>,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self { strategy: ErrorStrategy::Cancel, message: Some(DEFAULT_ERROR_MESSAGE.to_string()) }
    }
}

impl ErrorConfig {
    pub fn cancel(message: impl Into<String>) -> Self {
        Self { strategy: ErrorStrategy::Cancel, message: Some(message.into()) }
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self { strategy: ErrorStrategy::Retry, message: Some(message.into()) }
    }

    pub fn ignore(message: impl Into<String>) -> Self {
        Self { strategy: ErrorStrategy::Ignore, message: Some(message.into()) }
    }

    pub fn silent(mut self) -> Self {
        self.message = None;
        self
    }
}

pub type ProcessFn =
    Arc<dyn Fn(&mut FlowScope, &str, Option<&ButtonClick>) -> anyhow::Result<ProcessResult> + Send + Sync>;

/// Handed to the completion handler once a flow finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCompletion {
    pub user_id: String,
    pub chat_id: String,
    pub flow: String,
    pub data: FlowData,
}

pub type CompletionHandler =
    Arc<dyn Fn(FlowCompletion) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub struct Step {
    name: String,
    prompt: Prompt,
    process: ProcessFn,
}

impl Step {
    pub fn builder(name: impl Into<String>) -> StepBuilder {
        StepBuilder { name: name.into(), prompt: None, process: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn process(
        &self,
        scope: &mut FlowScope,
        input: &str,
        click: Option<&ButtonClick>,
    ) -> anyhow::Result<ProcessResult> {
        (self.process)(scope, input, click)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).field("prompt", &self.prompt).finish()
    }
}

pub struct StepBuilder {
    name: String,
    prompt: Option<Prompt>,
    process: Option<ProcessFn>,
}

impl StepBuilder {
    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn process<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut FlowScope, &str, Option<&ButtonClick>) -> anyhow::Result<ProcessResult>
            + Send
            + Sync
            + 'static,
    {
        self.process = Some(Arc::new(f));
        self
    }

    fn build(self) -> Result<Step, FlowError> {
        let prompt = match self.prompt {
            Some(p) if !p.is_empty() => p,
            _ => return Err(FlowError::MissingPrompt(self.name)),
        };
        let process = self.process.ok_or_else(|| FlowError::NoProcessFunction(self.name.clone()))?;
        Ok(Step { name: self.name, prompt, process })
    }
}

/// An immutable, registered dialog.
pub struct Flow {
    name: String,
    order: Vec<String>,
    steps: HashMap<String, Step>,
    on_complete: Option<CompletionHandler>,
    error: Option<ErrorConfig>,
    message_action: MessageAction,
    timeout: Option<Duration>,
}

impl Flow {
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder {
            name: name.into(),
            steps: vec![],
            on_complete: None,
            error: None,
            message_action: MessageAction::Keep,
            timeout: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in the order they were declared.
    pub fn steps(&self) -> &[String] {
        &self.order
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn first_step(&self) -> Option<&Step> {
        self.order.first().and_then(|name| self.steps.get(name))
    }

    /// The step declared right after `after`, if any.
    pub fn next_step(&self, after: &str) -> Option<&Step> {
        let pos = self.order.iter().position(|s| s == after)?;
        self.order.get(pos + 1).and_then(|name| self.steps.get(name))
    }

    pub fn error_config(&self) -> Option<&ErrorConfig> {
        self.error.as_ref()
    }

    pub fn message_action(&self) -> MessageAction {
        self.message_action
    }

    /// Declared only; nothing evicts a flow once this elapses.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn has_completion_handler(&self) -> bool {
        self.on_complete.is_some()
    }

    pub(crate) fn completion_handler(&self) -> Option<&CompletionHandler> {
        self.on_complete.as_ref()
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("steps", &self.order)
            .field("on_complete", &self.on_complete.is_some())
            .field("error", &self.error)
            .field("message_action", &self.message_action)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct FlowBuilder {
    name: String,
    steps: Vec<StepBuilder>,
    on_complete: Option<CompletionHandler>,
    error: Option<ErrorConfig>,
    message_action: MessageAction,
    timeout: Option<Duration>,
}

impl FlowBuilder {
    pub fn step(mut self, step: StepBuilder) -> Self {
        self.steps.push(step);
        self
    }

    pub fn on_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(FlowCompletion) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: CompletionHandler = Arc::new(move |done: FlowCompletion| f(done).boxed());
        self.on_complete = Some(handler);
        self
    }

    pub(crate) fn completion_handler(mut self, handler: Option<CompletionHandler>) -> Self {
        self.on_complete = handler;
        self
    }

    pub fn on_error(mut self, config: ErrorConfig) -> Self {
        self.error = Some(config);
        self
    }

    pub fn message_action(mut self, action: MessageAction) -> Self {
        self.message_action = action;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Flow, FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::EmptyFlow(self.name));
        }
        let mut order = Vec::with_capacity(self.steps.len());
        let mut steps = HashMap::with_capacity(self.steps.len());
        for builder in self.steps {
            let step = builder.build()?;
            if steps.contains_key(&step.name) {
                return Err(FlowError::DuplicateStep { flow: self.name, step: step.name });
            }
            order.push(step.name.clone());
            steps.insert(step.name.clone(), step);
        }
        Ok(Flow {
            name: self.name,
            order,
            steps,
            on_complete: self.on_complete,
            error: self.error,
            message_action: self.message_action,
            timeout: self.timeout,
        })
    }
}
