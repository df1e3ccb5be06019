use std::path::Path;

use anyhow::{Context, Result};

use crate::load_manager;

pub fn run_schema(input_path: &Path, vocab: Option<&str>, output_file: Option<&Path>) -> Result<String> {
    let manager = load_manager(input_path, vocab)?;
    let sdl = manager
        .schema()
        .context("Failed to derive the schema")?
        .sdl();

    if let Some(out_path) = output_file {
        std::fs::write(out_path, &sdl)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        return Ok(format!("Written to {}", out_path.display()));
    }

    Ok(sdl.trim_end().to_string())
}
