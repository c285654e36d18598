//! Question-and-answer flows declared in a file.
//!
//! ```yaml
//! name: signup
//! timeout_secs: 600
//! message_action: strip_keyboard
//! on_error:
//!   strategy: retry
//!   message: "That did not work, please answer again."
//! questions:
//!   - id: name
//!     prompt: "What is your name?"
//!   - id: age
//!     prompt: "Nice to meet you {{state.name}}! How old are you?"
//!     answer: { type: number, min: 0, max: 120 }
//!     retry_prompt: "Please enter your age as a number."
//!   - id: colour
//!     prompt: "Pick a colour"
//!     answer: { type: choice, options: [red, green, blue] }
//!     state_key: favourite_colour
//! ```
//!
//! Every question becomes a step. A valid answer is stored under the
//! question's `state_key` (its `id` by default) and moves on; an invalid
//! one asks again. Answering the last question completes the flow.

use std::{fs, path::Path, time::Duration};

use channel_plugin::message::{Button, Keyboard};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::flow::{
    definition::{CompletionHandler, ErrorConfig, Flow, MessageAction, ProcessResult, Prompt, Step, StepBuilder},
    error::FlowError,
    input::ButtonClick,
    scope::FlowScope,
};
use crate::state::StateValue;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QaFlowConfig {
    pub name: String,

    /// Informational; nothing expires a flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub message_action: MessageAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorConfig>,

    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Question {
    pub id: String,

    /// Handlebars template; `{{state.<key>}}` shows earlier answers.
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default)]
    pub answer: AnswerType,

    /// Where the answer is stored. Defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,

    /// Regex a text answer must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<String>,

    /// Shown instead of the generated hint when an answer is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerType {
    #[default]
    Text,
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// `YYYY-MM-DD` or RFC 3339.
    Date,
    Choice { options: Vec<String> },
}

impl QaFlowConfig {
    /// Read a `.ygtc` (YAML) or `.jgtc` (JSON) file.
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let contents = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|os| os.to_str())
            .unwrap_or_default()
            .to_lowercase();
        match ext.as_str() {
            "jgtc" => serde_json::from_str(&contents)
                .map_err(|e| FlowError::Parse(format!("{}: JSON parse error: {e}", path.display()))),
            "ygtc" => serde_yaml_bw::from_str(&contents)
                .map_err(|e| FlowError::Parse(format!("{}: YAML parse error: {e}", path.display()))),
            other => Err(FlowError::Parse(format!(
                "unsupported extension `{other}` (expected .jgtc or .ygtc)"
            ))),
        }
    }

    pub fn into_flow(self, on_complete: Option<CompletionHandler>) -> Result<Flow, FlowError> {
        let mut builder = Flow::builder(&self.name)
            .message_action(self.message_action)
            .completion_handler(on_complete);
        if let Some(cfg) = self.on_error {
            builder = builder.on_error(cfg);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        for question in self.questions {
            builder = builder.step(question.into_step()?);
        }
        builder.build()
    }
}

impl Question {
    fn prompt(&self) -> Prompt {
        let mut prompt = Prompt::text(&self.prompt);
        prompt.image = self.image.clone();
        if let AnswerType::Choice { options } = &self.answer {
            // the option itself is the button data; no token lookup needed
            prompt.keyboard = Some(Keyboard::column(options.iter().map(|o| Button::new(o, o)).collect()));
        }
        prompt
    }

    fn into_step(self) -> Result<StepBuilder, FlowError> {
        let pattern = self
            .validate
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| FlowError::Parse(format!("question `{}`: bad regex: {e}", self.id)))?;
        let prompt = self.prompt();
        let retry_keyboard = prompt.keyboard.clone();
        let state_key = self.state_key.clone().unwrap_or_else(|| self.id.clone());
        let answer = self.answer.clone();
        let retry_prompt = self.retry_prompt.clone();
        let question_text = self.prompt.clone();

        let process = move |scope: &mut FlowScope, input: &str, click: Option<&ButtonClick>| -> anyhow::Result<ProcessResult> {
            let raw = click.and_then(|c| c.data.as_str()).unwrap_or(input);
            match parse_answer(raw, &answer, pattern.as_ref()) {
                Ok(value) => {
                    scope.set(state_key.clone(), value);
                    Ok(ProcessResult::next())
                }
                Err(hint) => {
                    let text = retry_prompt.clone().unwrap_or_else(|| format!("{hint}\n{question_text}"));
                    let retry = Prompt { text: Some(text), image: None, keyboard: retry_keyboard.clone() };
                    Ok(ProcessResult::retry().with_prompt(retry))
                }
            }
        };
        Ok(Step::builder(self.id).prompt(prompt).process(process))
    }
}

/// Parse and check one reply. `Err` carries a hint for the user.
pub fn parse_answer(raw: &str, answer: &AnswerType, pattern: Option<&Regex>) -> Result<StateValue, String> {
    let raw = raw.trim();
    match answer {
        AnswerType::Text => {
            if raw.is_empty() {
                return Err("please type an answer".into());
            }
            if let Some(re) = pattern {
                if !re.is_match(raw) {
                    return Err(format!("must match /{}/", re.as_str()));
                }
            }
            Ok(StateValue::String(raw.to_string()))
        }
        AnswerType::Number { min, max } => {
            let n: f64 = raw
                .parse()
                .ok()
                .filter(|n: &f64| n.is_finite())
                .ok_or_else(|| "please enter a number".to_string())?;
            match (min, max) {
                (Some(lo), Some(hi)) if n < *lo || n > *hi => {
                    return Err(format!("must be between {lo} and {hi}"));
                }
                (Some(lo), None) if n < *lo => return Err(format!("must be at least {lo}")),
                (None, Some(hi)) if n > *hi => return Err(format!("must be at most {hi}")),
                _ => {}
            }
            Ok(StateValue::Number(n))
        }
        AnswerType::Date => {
            if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                return Ok(StateValue::String(date.to_string()));
            }
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| StateValue::String(dt.date_naive().to_string()))
                .map_err(|_| "please use YYYY-MM-DD".to_string())
        }
        AnswerType::Choice { options } => options
            .iter()
            .find(|opt| opt.eq_ignore_ascii_case(raw))
            .map(|opt| StateValue::String(opt.clone()))
            .ok_or_else(|| format!("please choose one of: {}", options.join(", "))),
    }
}
