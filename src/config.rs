use std::{env, fs, path::{Path, PathBuf}};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::flow::definition::ErrorConfig;
use crate::logger::LogConfig;

pub const ENV_LOG_LEVEL: &str = "GREENTIC_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "GREENTIC_LOG_DIR";
pub const ENV_OTEL_ENDPOINT: &str = "GREENTIC_OTEL_ENDPOINT";
pub const ENV_FLOWS_DIR: &str = "GREENTIC_FLOWS_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,

    /// Directory of `.ygtc` / `.jgtc` question flows loaded at startup.
    pub flows_dir: PathBuf,

    /// Error handling for flows that do not declare their own.
    pub default_error: ErrorConfig,

    /// How long an unused button token stays resolvable.
    pub callback_ttl_secs: u64,

    /// Declared for operators; no flow is expired when it elapses.
    pub session_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            flows_dir: PathBuf::from("flows"),
            default_error: ErrorConfig::default(),
            callback_ttl_secs: 3600,
            session_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Read the YAML file if given, then let `.env` and the process
    /// environment override it.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("could not read config {}", path.display()))?;
                serde_yaml_bw::from_str(&contents)
                    .with_context(|| format!("could not parse config {}", path.display()))?
            }
            None => AppConfig::default(),
        };
        dotenvy::dotenv().ok();
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            match level.parse() {
                Ok(level) => self.log.log_level = level,
                Err(e) => warn!(error = %e, "ignoring {ENV_LOG_LEVEL}"),
            }
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(endpoint) = lookup(ENV_OTEL_ENDPOINT) {
            self.log.otel_endpoint = Some(endpoint);
        }
        if let Some(dir) = lookup(ENV_FLOWS_DIR) {
            self.flows_dir = PathBuf::from(dir);
        }
    }
}
