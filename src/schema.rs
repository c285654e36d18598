use std::{fs, path::Path};

use anyhow::Error;
use schemars::schema_for;

use crate::{config::AppConfig, flow::qa::QaFlowConfig};

pub const CONFIG_SCHEMA: &str = "config.schema.json";
pub const QA_FLOW_SCHEMA: &str = "qa-flow.schema.json";

/// The entry point invoked by `main.rs` for `Commands::Schema`.
pub fn write_schema(out_dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(out_dir)?;

    let config_schema = schema_for!(AppConfig);
    fs::write(out_dir.join(CONFIG_SCHEMA), serde_json::to_string_pretty(&config_schema)?)?;

    let flow_schema = schema_for!(QaFlowConfig);
    fs::write(out_dir.join(QA_FLOW_SCHEMA), serde_json::to_string_pretty(&flow_schema)?)?;

    Ok(())
}
