use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::state::{FlowData, StateValue};

/// Where a user currently is inside an active flow.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFlowState {
    /// Minted on every flow start; writes tagged with an older session are dropped.
    pub session_id: Uuid,
    pub flow_name: String,
    pub current_step: String,
    pub chat_id: String,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub last_message_id: Option<String>,
}

#[derive(Debug)]
struct DataEntry {
    session_id: Uuid,
    values: FlowData,
}

/// Per-user flow state, split in two maps that are never locked together:
/// `states` holds which flow and step a user is at, `data` holds what the
/// flow collected so far.
///
/// Every method takes and drops its guard before returning, so a step
/// function may call the data methods while the engine is in the middle of
/// handling an update for the same user.
#[derive(Debug, Default)]
pub struct FlowStateStore {
    states: DashMap<String, UserFlowState>,
    data: DashMap<String, DataEntry>,
}

impl FlowStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session for `user_id`, replacing whatever was there.
    pub fn create(&self, user_id: &str, chat_id: &str, flow: &str, step: &str, seed: FlowData) -> UserFlowState {
        let now = Utc::now();
        let state = UserFlowState {
            session_id: Uuid::new_v4(),
            flow_name: flow.to_string(),
            current_step: step.to_string(),
            chat_id: chat_id.to_string(),
            started_at: now,
            last_active: now,
            last_message_id: None,
        };
        self.data.insert(user_id.to_string(), DataEntry { session_id: state.session_id, values: seed });
        self.states.insert(user_id.to_string(), state.clone());
        state
    }

    pub fn get(&self, user_id: &str) -> Option<UserFlowState> {
        self.states.get(user_id).map(|s| s.clone())
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.states.contains_key(user_id)
    }

    pub fn touch(&self, user_id: &str, session: Uuid) -> bool {
        self.update(user_id, session, |s| s.last_active = Utc::now())
    }

    /// Move the step pointer. `false` if the session is gone.
    pub fn advance(&self, user_id: &str, session: Uuid, step: &str) -> bool {
        self.update(user_id, session, |s| {
            s.current_step = step.to_string();
            s.last_active = Utc::now();
        })
    }

    pub fn set_last_message(&self, user_id: &str, session: Uuid, message_id: &str) -> bool {
        self.update(user_id, session, |s| s.last_message_id = Some(message_id.to_string()))
    }

    fn update(&self, user_id: &str, session: Uuid, f: impl FnOnce(&mut UserFlowState)) -> bool {
        match self.states.get_mut(user_id) {
            Some(mut state) if state.session_id == session => {
                f(&mut *state);
                true
            }
            _ => false,
        }
    }

    /// Drop the user's state regardless of session. `true` if there was one.
    pub fn remove(&self, user_id: &str) -> bool {
        let removed = self.states.remove(user_id).is_some();
        self.data.remove(user_id);
        removed
    }

    /// Drop the user's state only if it still belongs to `session`.
    pub fn remove_session(&self, user_id: &str, session: Uuid) -> bool {
        let removed = self.states.remove_if(user_id, |_, s| s.session_id == session).is_some();
        self.data.remove_if(user_id, |_, d| d.session_id == session);
        removed
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get_data(&self, user_id: &str, key: &str) -> Option<StateValue> {
        self.data.get(user_id).and_then(|d| d.values.get(key).cloned())
    }

    /// Store a value for a user in a flow. `false` if the user has no flow.
    pub fn set_data(&self, user_id: &str, key: &str, value: StateValue) -> bool {
        match self.data.get_mut(user_id) {
            Some(mut entry) => {
                entry.values.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn remove_data(&self, user_id: &str, key: &str) -> Option<StateValue> {
        self.data.get_mut(user_id).and_then(|mut d| d.values.remove(key))
    }

    /// Snapshot of the user's whole data bag.
    pub fn data(&self, user_id: &str) -> Option<FlowData> {
        self.data.get(user_id).map(|d| d.values.clone())
    }

    /// Write a step's working copy back; keys in `values` win. Never creates
    /// an entry, so a session that was cancelled meanwhile stays gone.
    pub fn merge_data(&self, user_id: &str, session: Uuid, values: FlowData) -> bool {
        match self.data.get_mut(user_id) {
            Some(mut entry) if entry.session_id == session => {
                entry.values.extend(values);
                true
            }
            _ => false,
        }
    }
}
