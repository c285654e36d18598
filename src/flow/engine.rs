use std::sync::Arc;

use channel_plugin::{message::ChannelMessage, plugin::ChannelPlugin};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{
    CallbackResolver, ChannelCleaner, ChannelPromptSender, MessageCleaner, PromptSender, SendError,
};
use crate::flow::{
    cleanup::apply_message_action,
    definition::{ErrorConfig, ErrorStrategy, Flow, FlowCompletion, Prompt, Step, StepAction},
    error::FlowError,
    input::{extract_input, ButtonClick},
    registry::FlowRegistry,
    scope::FlowScope,
    state::{FlowStateStore, UserFlowState},
};
use crate::logger::FlowMetrics;
use crate::state::{FlowData, StateValue};

/// The one session a task is working on. Every store write goes through
/// its session id, so a task that outlives its flow changes nothing.
struct Turn<'a> {
    user_id: &'a str,
    chat_id: &'a str,
    session: Uuid,
    flow: &'a Flow,
}

/// Runs registered flows for any number of users at once.
///
/// Share it behind an `Arc` and hand every inbound event to
/// [`FlowEngine::handle_update`] on its own task.
pub struct FlowEngine {
    registry: FlowRegistry,
    store: Arc<FlowStateStore>,
    sender: Arc<dyn PromptSender>,
    cleaner: Arc<dyn MessageCleaner>,
    resolver: Arc<dyn CallbackResolver>,
    default_error: ErrorConfig,
    metrics: FlowMetrics,
}

impl FlowEngine {
    pub fn new(
        registry: FlowRegistry,
        sender: Arc<dyn PromptSender>,
        cleaner: Arc<dyn MessageCleaner>,
        resolver: Arc<dyn CallbackResolver>,
    ) -> Self {
        Self {
            registry,
            store: Arc::new(FlowStateStore::new()),
            sender,
            cleaner,
            resolver,
            default_error: ErrorConfig::default(),
            metrics: FlowMetrics::default(),
        }
    }

    /// Render, send and tidy up through one channel plugin.
    pub fn for_channel(
        registry: FlowRegistry,
        channel: Arc<dyn ChannelPlugin>,
        callbacks: Arc<dyn CallbackResolver>,
    ) -> Self {
        Self::new(
            registry,
            Arc::new(ChannelPromptSender::new(channel.clone())),
            Arc::new(ChannelCleaner::new(channel)),
            callbacks,
        )
    }

    /// Used by flows that declare no error handling of their own.
    pub fn with_default_error(mut self, config: ErrorConfig) -> Self {
        self.default_error = config;
        self
    }

    /// Share a state store, e.g. with step functions that read or write
    /// flow data directly.
    pub fn with_store(mut self, store: Arc<FlowStateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<FlowStateStore> {
        &self.store
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    pub fn flow_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn is_user_in_flow(&self, user_id: &str) -> bool {
        self.store.is_active(user_id)
    }

    pub fn user_state(&self, user_id: &str) -> Option<UserFlowState> {
        self.store.get(user_id)
    }

    pub fn get_user_data(&self, user_id: &str, key: &str) -> Option<StateValue> {
        self.store.get_data(user_id, key)
    }

    /// `false` when the user is not in a flow.
    pub fn set_user_data(&self, user_id: &str, key: &str, value: impl Into<StateValue>) -> bool {
        self.store.set_data(user_id, key, value.into())
    }

    /// Put `user_id` on the first step of `flow_name`, replacing any flow they
    /// were in. A prompt that cannot be sent is handled by the flow's error
    /// strategy, not returned.
    #[tracing::instrument(skip(self, seed))]
    pub async fn start_flow(
        &self,
        user_id: &str,
        chat_id: &str,
        flow_name: &str,
        seed: FlowData,
    ) -> Result<(), FlowError> {
        let flow = self
            .registry
            .get(flow_name)
            .ok_or_else(|| FlowError::FlowNotFound(flow_name.to_string()))?;
        let first = flow.first_step().ok_or_else(|| FlowError::EmptyFlow(flow_name.to_string()))?;

        let state = self.store.create(user_id, chat_id, flow.name(), first.name(), seed.clone());
        self.metrics.flow_started(flow.name());
        info!(session = %state.session_id, step = first.name(), "flow started");

        let turn = Turn { user_id, chat_id, session: state.session_id, flow: &flow };
        let mut scope = FlowScope::new(user_id, chat_id, flow.name(), first.name(), seed);
        if let Err(err) = self.render(&turn, &scope, first.prompt()).await {
            self.recover(&turn, &mut scope, first, first.prompt(), err).await?;
        }
        Ok(())
    }

    /// Drop the user's flow without completing it. `true` if there was one.
    pub async fn cancel_flow(&self, user_id: &str) -> bool {
        let Some(state) = self.store.get(user_id) else {
            return false;
        };
        let removed = self.store.remove_session(user_id, state.session_id);
        if removed {
            self.resolver.release_user(user_id).await;
            self.metrics.flow_cancelled(&state.flow_name);
            info!(user_id, flow = %state.flow_name, "flow cancelled");
        }
        removed
    }

    /// Feed one inbound event to the user's flow.
    ///
    /// `Ok(false)` when the user is in no flow. An error with
    /// [`FlowError::is_handled`] false means the stored state pointed at a
    /// flow or step that no longer exists; that state has been dropped.
    #[tracing::instrument(skip(self, msg), fields(user_id = %msg.from.id))]
    pub async fn handle_update(&self, msg: &ChannelMessage) -> Result<bool, FlowError> {
        let user_id = msg.from.id.as_str();
        let Some(state) = self.store.get(user_id) else {
            return Ok(false);
        };
        let Some(flow) = self.registry.get(&state.flow_name) else {
            warn!(flow = %state.flow_name, "state refers to an unknown flow, dropping it");
            self.store.remove_session(user_id, state.session_id);
            return Err(FlowError::FlowNotFound(state.flow_name));
        };
        let Some(step) = flow.step(&state.current_step) else {
            warn!(flow = %state.flow_name, step = %state.current_step, "state refers to an unknown step, dropping it");
            self.store.remove_session(user_id, state.session_id);
            return Err(FlowError::StepNotFound { flow: state.flow_name, step: state.current_step });
        };
        self.store.touch(user_id, state.session_id);

        let turn = Turn { user_id, chat_id: &state.chat_id, session: state.session_id, flow: &flow };
        let input = extract_input(msg, self.resolver.as_ref()).await;
        let data = self.store.data(user_id).unwrap_or_default();
        let mut scope = FlowScope::new(user_id, &state.chat_id, flow.name(), step.name(), data);

        let result = step.process(&mut scope, &input.text, input.click.as_ref());
        if let Some(click) = &input.click {
            self.tidy_click(&flow, click).await;
        }
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(step = step.name(), %reason, "step failed");
                return Err(FlowError::StepFailed { step: step.name().to_string(), reason });
            }
        };
        debug!(step = step.name(), action = ?result.action, "step processed");

        if !self.store.merge_data(user_id, turn.session, scope.data().clone()) {
            debug!("flow ended while the step ran, dropping its result");
            return Ok(true);
        }

        if let Some(prompt) = &result.prompt {
            if let Err(err) = self.render(&turn, &scope, prompt).await {
                self.recover(&turn, &mut scope, step, prompt, err).await?;
                return Ok(true);
            }
        }

        match result.action {
            StepAction::NextStep => match flow.next_step(step.name()) {
                Some(next) => self.transition(&turn, &mut scope, next).await?,
                None => self.complete(&turn).await?,
            },
            StepAction::GoToStep(target) => {
                let next = flow.step(&target).ok_or_else(|| FlowError::InvalidTargetStep {
                    flow: flow.name().to_string(),
                    target: target.clone(),
                })?;
                self.transition(&turn, &mut scope, next).await?;
            }
            StepAction::RetryStep => {
                if result.prompt.is_none() {
                    self.transition(&turn, &mut scope, step).await?;
                }
            }
            StepAction::CompleteFlow => self.complete(&turn).await?,
            StepAction::CancelFlow => self.cancel(&turn).await,
        }
        Ok(true)
    }

    async fn tidy_click(&self, flow: &Flow, click: &ButtonClick) {
        if let Err(e) = self.cleaner.acknowledge(&click.callback_id).await {
            warn!(error = %e, "could not acknowledge click");
        }
        if let Err(e) = apply_message_action(self.cleaner.as_ref(), flow.message_action(), click).await {
            warn!(error = %e, action = ?flow.message_action(), "message cleanup failed");
        }
    }

    async fn render(&self, turn: &Turn<'_>, scope: &FlowScope, prompt: &Prompt) -> Result<String, SendError> {
        match self.sender.compose_and_send(scope, prompt).await {
            Ok(id) => {
                self.store.set_last_message(turn.user_id, turn.session, &id);
                Ok(id)
            }
            Err(err) => {
                self.metrics.render_failed(turn.flow.name());
                Err(err)
            }
        }
    }

    /// Show `target`'s prompt, then move the step pointer there.
    async fn transition(&self, turn: &Turn<'_>, scope: &mut FlowScope, target: &Step) -> Result<(), FlowError> {
        scope.set_step(target.name());
        match self.render(turn, scope, target.prompt()).await {
            Ok(_) => {
                self.commit(turn, target.name());
                Ok(())
            }
            Err(err) => self.recover(turn, scope, target, target.prompt(), err).await,
        }
    }

    fn commit(&self, turn: &Turn<'_>, step: &str) {
        if !self.store.advance(turn.user_id, turn.session, step) {
            debug!(step, "flow ended before the step could be entered");
        }
    }

    /// `prompt` belonging to `target` could not be sent.
    async fn recover(
        &self,
        turn: &Turn<'_>,
        scope: &mut FlowScope,
        target: &Step,
        prompt: &Prompt,
        err: SendError,
    ) -> Result<(), FlowError> {
        let config = turn.flow.error_config().unwrap_or(&self.default_error);
        let err = FlowError::RenderFailure(err);
        warn!(
            user_id = turn.user_id,
            flow = turn.flow.name(),
            step = target.name(),
            strategy = ?config.strategy,
            error = %err,
            "recovering from render failure"
        );
        if let Some(message) = &config.message {
            if let Err(e) = self.sender.send_notice(scope, message).await {
                warn!(error = %e, "could not tell the user about the failure");
            }
        }

        match config.strategy {
            ErrorStrategy::Cancel => self.cancel(turn).await,
            ErrorStrategy::Retry => {}
            ErrorStrategy::Ignore => {
                scope.set_step(target.name());
                if let Some(reduced) = prompt.degraded() {
                    if self.render(turn, scope, &reduced).await.is_ok() {
                        self.commit(turn, target.name());
                        return Ok(());
                    }
                }
                match turn.flow.next_step(target.name()) {
                    Some(next) => {
                        scope.set_step(next.name());
                        match self.render(turn, scope, next.prompt()).await {
                            Ok(_) => self.commit(turn, next.name()),
                            Err(e) => {
                                warn!(step = next.name(), error = %e, "skipping ahead failed too, cancelling flow");
                                self.cancel(turn).await;
                            }
                        }
                    }
                    None => return self.complete(turn).await,
                }
            }
        }
        Ok(())
    }

    /// Hand the collected data to the flow's completion handler and end the
    /// session. Only the task that ends the session calls the handler.
    async fn complete(&self, turn: &Turn<'_>) -> Result<(), FlowError> {
        let data = self.store.data(turn.user_id).unwrap_or_default();
        if !self.store.remove_session(turn.user_id, turn.session) {
            debug!("flow already ended, not completing it again");
            return Ok(());
        }
        self.resolver.release_user(turn.user_id).await;
        let Some(handler) = turn.flow.completion_handler() else {
            warn!(flow = turn.flow.name(), "flow completed without a completion handler");
            return Err(FlowError::NoCompletionHandler(turn.flow.name().to_string()));
        };
        self.metrics.flow_completed(turn.flow.name());
        info!(user_id = turn.user_id, flow = turn.flow.name(), "flow completed");

        let done = FlowCompletion {
            user_id: turn.user_id.to_string(),
            chat_id: turn.chat_id.to_string(),
            flow: turn.flow.name().to_string(),
            data,
        };
        handler(done).await.map_err(|e| FlowError::CompletionFailed {
            flow: turn.flow.name().to_string(),
            reason: format!("{e:#}"),
        })
    }

    async fn cancel(&self, turn: &Turn<'_>) {
        if self.store.remove_session(turn.user_id, turn.session) {
            self.resolver.release_user(turn.user_id).await;
            self.metrics.flow_cancelled(turn.flow.name());
            info!(user_id = turn.user_id, flow = turn.flow.name(), "flow cancelled");
        }
    }
}
