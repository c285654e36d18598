use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::state::{data_to_json, FlowData, StateValue};

/// A read of the data bag that did not find what the caller expected.
///
/// Reading a key with the wrong type is a bug in the step that reads it,
/// not a framework fault.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("no value stored under `{0}`")]
    Missing(String),

    #[error("`{key}` holds a {found}, expected a {expected}")]
    WrongType { key: String, expected: &'static str, found: &'static str },

    #[error("`{key}` could not be decoded: {reason}")]
    Decode { key: String, reason: String },
}

/// The working copy of a user's flow data handed to a step's process function.
///
/// Changes made here are written back to the store after the step returns.
#[derive(Debug, Clone)]
pub struct FlowScope {
    user_id: String,
    chat_id: String,
    flow: String,
    step: String,
    data: FlowData,
}

impl FlowScope {
    pub fn new(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        flow: impl Into<String>,
        step: impl Into<String>,
        data: FlowData,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            flow: flow.into(),
            step: step.into(),
            data,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn flow(&self) -> &str {
        &self.flow
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub(crate) fn set_step(&mut self, step: &str) {
        self.step = step.to_string();
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        self.data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn data(&self) -> &FlowData {
        &self.data
    }

    pub fn into_data(self) -> FlowData {
        self.data
    }

    fn require(&self, key: &str) -> Result<&StateValue, DataError> {
        self.data.get(key).ok_or_else(|| DataError::Missing(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, DataError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| wrong_type(key, "string", value))
    }

    pub fn get_number(&self, key: &str) -> Result<f64, DataError> {
        let value = self.require(key)?;
        value.as_number().ok_or_else(|| wrong_type(key, "number", value))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, DataError> {
        let value = self.require(key)?;
        value.as_bool().ok_or_else(|| wrong_type(key, "boolean", value))
    }

    /// Decode a stored value into any deserializable type.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, DataError> {
        let value = self.require(key)?;
        serde_json::from_value(value.to_json()).map_err(|e| DataError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// What prompt templates get to see: `{{state.<key>}}`, `{{user_id}}`,
    /// `{{chat_id}}`, `{{flow}}` and `{{step}}`.
    pub fn template_context(&self) -> Value {
        json!({
            "state": data_to_json(&self.data),
            "user_id": self.user_id,
            "chat_id": self.chat_id,
            "flow": self.flow,
            "step": self.step,
        })
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &StateValue) -> DataError {
    DataError::WrongType { key: key.to_string(), expected, found: found.kind() }
}
