use std::path::Path;

use anyhow::{Context, Result};

use leuchtturm_core::ModelSchema;

use crate::load_manager;

pub fn run_inspect(input_path: &Path) -> Result<String> {
    let manager = load_manager(input_path, None)?;

    let mut schemas = Vec::new();
    for id in manager.models() {
        schemas.push(ModelSchema::clone(&*manager.schema_of(&id)?));
    }

    serde_json::to_string_pretty(&serde_json::json!({ "models": schemas }))
        .context("JSON serialization error")
}
